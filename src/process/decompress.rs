//! Decompress processor (§4.6.a). Writes through a temporary sibling file
//! and renames atomically, matching the `NamedTempFile::new_in` + `.persist()`
//! idiom used everywhere else in this crate's cache machinery.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::prelude::*;
use crate::process::{Action, ProcessedPath, Processor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Gzip,
    Bzip2,
    Lzma,
    Auto,
}

impl CompressionMethod {
    fn detect(path: &Path) -> Result<CompressionMethod> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") | Some("tgz") => Ok(CompressionMethod::Gzip),
            Some("bz2") => Ok(CompressionMethod::Bzip2),
            Some("xz") | Some("lzma") => Ok(CompressionMethod::Lzma),
            other => Err(FetchError::ProcessorFailure {
                path: path.to_path_buf(),
                message: format!("cannot auto-detect compression method from extension {other:?}"),
            }),
        }
    }
}

pub struct DecompressProcessor {
    method: CompressionMethod,
    output_name: Option<PathBuf>,
}

impl DecompressProcessor {
    pub fn new(method: CompressionMethod) -> DecompressProcessor {
        DecompressProcessor {
            method,
            output_name: None,
        }
    }

    pub fn with_output_name(mut self, name: PathBuf) -> Self {
        self.output_name = Some(name);
        self
    }

    fn output_path(&self, path: &Path) -> PathBuf {
        match &self.output_name {
            Some(name) => name.clone(),
            None => {
                let mut out = path.as_os_str().to_owned();
                out.push(".decomp");
                PathBuf::from(out)
            }
        }
    }
}

impl Processor for DecompressProcessor {
    fn process(&self, path: &Path, action: Action) -> Result<ProcessedPath> {
        let output = self.output_path(path);
        if action == Action::Fetched && output.exists() {
            return Ok(ProcessedPath::One(output));
        }

        let method = match self.method {
            CompressionMethod::Auto => CompressionMethod::detect(path)?,
            other => other,
        };

        let dir = output.parent().ok_or_else(|| FetchError::ProcessorFailure {
            path: output.clone(),
            message: "output path has no parent directory".to_string(),
        })?;
        let input = File::open(path).map_err(|e| FetchError::ProcessorFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| FetchError::ProcessorFailure {
            path: output.clone(),
            message: e.to_string(),
        })?;

        let copy_result = match method {
            CompressionMethod::Gzip => {
                let mut decoder = flate2::read::MultiGzDecoder::new(input);
                io::copy(&mut decoder, &mut tmp)
            }
            CompressionMethod::Bzip2 => {
                let mut decoder = bzip2::read::BzDecoder::new(input);
                io::copy(&mut decoder, &mut tmp)
            }
            CompressionMethod::Lzma => {
                let mut decoder = xz2::read::XzDecoder::new(input);
                io::copy(&mut decoder, &mut tmp)
            }
            CompressionMethod::Auto => unreachable!("resolved above"),
        };
        copy_result.map_err(|e| FetchError::ProcessorFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        tmp.persist(&output).map_err(|e| FetchError::ProcessorFailure {
            path: output.clone(),
            message: e.to_string(),
        })?;
        Ok(ProcessedPath::One(output))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn decompresses_gzip_and_is_idempotent_on_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.txt.gz");
        {
            let file = File::create(&input).unwrap();
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"hello world").unwrap();
            encoder.finish().unwrap();
        }
        let processor = DecompressProcessor::new(CompressionMethod::Gzip);
        let result = processor.process(&input, Action::Downloaded).unwrap();
        let ProcessedPath::One(output) = result else { panic!("expected one path") };
        assert_eq!(std::fs::read(&output).unwrap(), b"hello world");

        // Remove the source data (simulating a "never redo the work" check)
        // and confirm Fetched mode doesn't try to read it again.
        std::fs::remove_file(&input).unwrap();
        let result = processor.process(&input, Action::Fetched).unwrap();
        let ProcessedPath::One(output2) = result else { panic!("expected one path") };
        assert_eq!(output, output2);
    }

    #[test]
    fn auto_detects_method_from_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.txt.gz");
        {
            let file = File::create(&input).unwrap();
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"auto detected").unwrap();
            encoder.finish().unwrap();
        }
        let processor = DecompressProcessor::new(CompressionMethod::Auto);
        let result = processor.process(&input, Action::Downloaded).unwrap();
        let ProcessedPath::One(output) = result else { panic!("expected one path") };
        assert_eq!(std::fs::read(&output).unwrap(), b"auto detected");
    }
}
