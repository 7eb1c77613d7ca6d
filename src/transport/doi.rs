//! DOI transport (§4.5.d). Resolves `doi:<DOI>/<filename>` to a concrete
//! download URL by following the DOI to its landing repository, querying
//! that repository's public metadata API, and delegating the actual byte
//! transfer to [`HttpTransport`]. The JSON-metadata-client shape (`ureq`
//! agent + `serde_json::from_reader` into a `serde` struct) is grounded
//! directly on `pypi.rs`/`package_index.rs`/`nuget.rs` and
//! `package_db/build_wheel.rs`.

use std::path::Path;

use elsa::FrozenMap;
use serde::Deserialize;

use crate::prelude::*;
use crate::transport::http::HttpTransport;
use crate::transport::{FetchContext, Transport};

#[derive(Debug, Clone)]
pub struct DoiFileEntry {
    pub filename: String,
    pub download_url: String,
    #[allow(dead_code)]
    pub size: Option<u64>,
    #[allow(dead_code)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repository {
    Figshare,
    Zenodo,
    Dataverse,
}

/// Memoizes the resolved file listing for a DOI for the lifetime of this
/// transport instance (one process), per the in-memory-only caching rule
/// in §9. `FrozenMap` lets `list_files` take `&self` rather than `&mut
/// self`, mirroring the `PackageDB` artifact memo table it's grounded on.
pub struct DoiTransport {
    agent: ureq::Agent,
    retry_count: u32,
    listings: FrozenMap<String, Box<Vec<DoiFileEntry>>>,
}

impl DoiTransport {
    pub fn new(retry_count: u32) -> DoiTransport {
        DoiTransport {
            agent: ureq::AgentBuilder::new().build(),
            retry_count,
            listings: FrozenMap::new(),
        }
    }

    /// Splits `doi:<DOI>/<filename>` into `(doi, filename)`.
    fn parse_doi_url(url: &str) -> Result<(String, String)> {
        let rest = url.strip_prefix("doi:").ok_or_else(|| FetchError::DOIUnsupported {
            doi: url.to_string(),
            message: "not a doi: url".to_string(),
        })?;
        let (doi, filename) = rest.rsplit_once('/').ok_or_else(|| FetchError::DOIUnsupported {
            doi: rest.to_string(),
            message: "expected doi:<DOI>/<filename>".to_string(),
        })?;
        if filename.is_empty() {
            return Err(FetchError::DOIUnsupported {
                doi: doi.to_string(),
                message: "missing filename after doi".to_string(),
            });
        }
        if doi.contains(".c.") {
            return Err(FetchError::DOIUnsupported {
                doi: doi.to_string(),
                message: "DOI refers to a collection, not a single dataset".to_string(),
            });
        }
        Ok((doi.to_string(), filename.to_string()))
    }

    fn resolve_repository(&self, doi: &str) -> Result<(Repository, Url)> {
        let landing_url = format!("https://doi.org/{doi}");
        let response = self
            .agent
            .get(&landing_url)
            .call()
            .map_err(|e| FetchError::DownloadFailure {
                url: landing_url.clone(),
                message: e.to_string(),
            })?;
        let final_url = Url::parse(response.get_url()).map_err(|e| FetchError::DOIUnsupported {
            doi: doi.to_string(),
            message: e.to_string(),
        })?;
        let host = final_url.host_str().unwrap_or("");
        let repository = if host.contains("figshare.com") {
            Repository::Figshare
        } else if host.contains("zenodo.org") {
            Repository::Zenodo
        } else if host.contains("dataverse") {
            Repository::Dataverse
        } else {
            return Err(FetchError::DOIUnsupported {
                doi: doi.to_string(),
                message: format!("unsupported repository host {host:?}"),
            });
        };
        Ok((repository, final_url))
    }

    fn list_files(&self, doi: &str) -> Result<&[DoiFileEntry]> {
        if let Some(cached) = self.listings.get(doi) {
            return Ok(cached);
        }
        let (repository, landing_url) = self.resolve_repository(doi)?;
        let entries = match repository {
            Repository::Figshare => self.list_figshare(&landing_url)?,
            Repository::Zenodo => self.list_zenodo(&landing_url)?,
            Repository::Dataverse => self.list_dataverse(&landing_url)?,
        };
        Ok(self.listings.insert(doi.to_string(), Box::new(entries)))
    }

    fn list_figshare(&self, landing_url: &Url) -> Result<Vec<DoiFileEntry>> {
        let article_id = landing_url
            .path_segments()
            .and_then(|segments| segments.last())
            .and_then(|segment| segment.rsplit_once('.').map(|(_, version)| version).or(Some(segment)))
            .ok_or_else(|| FetchError::DOIUnsupported {
                doi: landing_url.to_string(),
                message: "could not determine figshare article id".to_string(),
            })?;
        let api_url = format!("https://api.figshare.com/v2/articles/{article_id}");
        let body = self
            .agent
            .get(&api_url)
            .call()
            .map_err(|e| FetchError::DownloadFailure {
                url: api_url.clone(),
                message: e.to_string(),
            })?
            .into_reader();
        let article: FigshareArticle =
            serde_json::from_reader(body).map_err(|e| FetchError::DownloadFailure {
                url: api_url,
                message: e.to_string(),
            })?;
        Ok(article
            .files
            .into_iter()
            .map(|f| DoiFileEntry {
                filename: f.name,
                download_url: f.download_url,
                size: Some(f.size),
                hash: f.computed_md5,
            })
            .collect())
    }

    fn list_zenodo(&self, landing_url: &Url) -> Result<Vec<DoiFileEntry>> {
        let record_id = landing_url
            .path_segments()
            .and_then(|segments| segments.last())
            .ok_or_else(|| FetchError::DOIUnsupported {
                doi: landing_url.to_string(),
                message: "could not determine zenodo record id".to_string(),
            })?;
        let api_url = format!("https://zenodo.org/api/records/{record_id}");
        let body = self
            .agent
            .get(&api_url)
            .call()
            .map_err(|e| FetchError::DownloadFailure {
                url: api_url.clone(),
                message: e.to_string(),
            })?
            .into_reader();
        let record: ZenodoRecord =
            serde_json::from_reader(body).map_err(|e| FetchError::DownloadFailure {
                url: api_url,
                message: e.to_string(),
            })?;
        Ok(record
            .files
            .into_iter()
            .map(|f| DoiFileEntry {
                filename: f.key,
                download_url: f.links.self_link,
                size: Some(f.size),
                hash: f.checksum,
            })
            .collect())
    }

    fn list_dataverse(&self, landing_url: &Url) -> Result<Vec<DoiFileEntry>> {
        let persistent_id = landing_url
            .query_pairs()
            .find(|(key, _)| key == "persistentId")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| FetchError::DOIUnsupported {
                doi: landing_url.to_string(),
                message: "dataverse landing url has no persistentId".to_string(),
            })?;
        let base = format!("{}://{}", landing_url.scheme(), landing_url.host_str().unwrap_or(""));
        let api_url = format!(
            "{base}/api/datasets/:persistentId/?persistentId={persistent_id}"
        );
        let body = self
            .agent
            .get(&api_url)
            .call()
            .map_err(|e| FetchError::DownloadFailure {
                url: api_url.clone(),
                message: e.to_string(),
            })?
            .into_reader();
        let dataset: DataverseDataset =
            serde_json::from_reader(body).map_err(|e| FetchError::DownloadFailure {
                url: api_url,
                message: e.to_string(),
            })?;
        Ok(dataset
            .data
            .latest_version
            .files
            .into_iter()
            .map(|f| DoiFileEntry {
                filename: f.data_file.filename,
                download_url: format!("{base}/api/access/datafile/{}", f.data_file.id),
                size: Some(f.data_file.filesize),
                hash: f.data_file.md5,
            })
            .collect())
    }
}

impl Default for DoiTransport {
    fn default() -> Self {
        DoiTransport::new(1)
    }
}

impl Transport for DoiTransport {
    fn download(&self, url: &str, destination: &Path, ctx: &FetchContext) -> Result<()> {
        let (doi, filename) = Self::parse_doi_url(url)?;
        let entries = self.list_files(&doi)?;
        let entry = entries
            .iter()
            .find(|entry| entry.filename == filename)
            .ok_or_else(|| {
                let available: Vec<&str> = entries.iter().map(|e| e.filename.as_str()).collect();
                FetchError::DOIUnsupported {
                    doi: doi.clone(),
                    message: format!("file {filename:?} not found; available: {available:?}"),
                }
            })?;
        HttpTransport::with_agent(self.agent.clone(), self.retry_count)
            .download(&entry.download_url, destination, ctx)
    }

    fn is_available(&self, url: &str, _ctx: &FetchContext) -> Result<bool> {
        let (doi, filename) = Self::parse_doi_url(url)?;
        let entries = self.list_files(&doi)?;
        Ok(entries.iter().any(|entry| entry.filename == filename))
    }
}

#[derive(Debug, Deserialize)]
struct FigshareFile {
    name: String,
    #[serde(rename = "download_url")]
    download_url: String,
    size: u64,
    #[serde(rename = "computed_md5")]
    computed_md5: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FigshareArticle {
    files: Vec<FigshareFile>,
}

#[derive(Debug, Deserialize)]
struct ZenodoFileLinks {
    #[serde(rename = "self")]
    self_link: String,
}

#[derive(Debug, Deserialize)]
struct ZenodoFile {
    key: String,
    size: u64,
    checksum: Option<String>,
    links: ZenodoFileLinks,
}

#[derive(Debug, Deserialize)]
struct ZenodoRecord {
    files: Vec<ZenodoFile>,
}

#[derive(Debug, Deserialize)]
struct DataverseDataFile {
    id: u64,
    filename: String,
    filesize: u64,
    #[serde(rename = "md5")]
    md5: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataverseDatasetFile {
    #[serde(rename = "dataFile")]
    data_file: DataverseDataFile,
}

#[derive(Debug, Deserialize)]
struct DataverseLatestVersion {
    files: Vec<DataverseDatasetFile>,
}

#[derive(Debug, Deserialize)]
struct DataverseDatasetData {
    #[serde(rename = "latestVersion")]
    latest_version: DataverseLatestVersion,
}

#[derive(Debug, Deserialize)]
struct DataverseDataset {
    data: DataverseDatasetData,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_doi_url() {
        let (doi, filename) =
            DoiTransport::parse_doi_url("doi:10.6084/m9.figshare.14763051.v1/tiny-data.txt")
                .unwrap();
        assert_eq!(doi, "10.6084/m9.figshare.14763051.v1");
        assert_eq!(filename, "tiny-data.txt");
    }

    #[test]
    fn rejects_collection_doi() {
        assert!(DoiTransport::parse_doi_url("doi:10.6084/m9.figshare.c.123/file.txt").is_err());
    }

    #[test]
    fn rejects_missing_filename() {
        assert!(DoiTransport::parse_doi_url("doi:10.6084/m9.figshare.14763051.v1/").is_err());
    }
}
