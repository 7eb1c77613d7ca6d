//! Component A — streaming hash computation and `algorithm:hexdigest` specifiers.

use std::io::{Read, Write};
use std::path::Path;

use crate::prelude::*;

const BUF_SIZE: usize = 65_536;

/// The closed set of hash algorithms a [`HashSpec`] may name. Unlike parsing
/// errors encountered while hashing a file, an unsupported algorithm name
/// fails here, at construction, never later when a hash is actually needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
    Md5,
    Sha512,
    Xxh64,
    Xxh128,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> Result<HashAlgorithm> {
        match name {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "md5" => Ok(HashAlgorithm::Md5),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "xxh64" => Ok(HashAlgorithm::Xxh64),
            "xxh128" => Ok(HashAlgorithm::Xxh128),
            other => Err(FetchError::MalformedRegistry {
                source: String::new(),
                line: 0,
                message: format!("unknown hash algorithm {other:?}"),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Xxh64 => "xxh64",
            HashAlgorithm::Xxh128 => "xxh128",
        }
    }
}

/// A parsed `"<algorithm>:<hex>"` (or bare-hex, or `"unknown"`) registry hash.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct HashSpec {
    /// `None` only for the `"unknown"` sentinel: never verify, never error.
    parsed: Option<(HashAlgorithm, String)>,
    raw: String,
}

impl HashSpec {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn parse(spec: &str) -> Result<HashSpec> {
        if spec == Self::UNKNOWN {
            return Ok(HashSpec {
                parsed: None,
                raw: spec.to_string(),
            });
        }
        let (algorithm, hex) = match spec.split_once(':') {
            Some((alg, hex)) => (HashAlgorithm::parse(alg)?, hex),
            None => (HashAlgorithm::Sha256, spec),
        };
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FetchError::MalformedRegistry {
                source: String::new(),
                line: 0,
                message: format!("not a hex digest: {hex:?}"),
            });
        }
        Ok(HashSpec {
            parsed: Some((algorithm, hex.to_ascii_lowercase())),
            raw: spec.to_string(),
        })
    }

    /// Best-effort parse used by the registry's token-disambiguation rule
    /// (§4.4): returns `None` instead of erroring on anything that isn't a
    /// plausible hash specifier, so callers can probe candidate tokens.
    pub fn try_parse(candidate: &str) -> Option<HashSpec> {
        HashSpec::parse(candidate).ok()
    }

    pub fn is_unknown(&self) -> bool {
        self.parsed.is_none()
    }

    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        self.parsed.as_ref().map(|(alg, _)| *alg)
    }

    pub fn digest(&self) -> Option<&str> {
        self.parsed.as_ref().map(|(_, hex)| hex.as_str())
    }
}

impl Display for HashSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for HashSpec {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<HashSpec> {
        HashSpec::parse(s)
    }
}

enum Digester {
    Ring(ring::digest::Context),
    Md5(md5::Md5),
    Xxh64(xxhash_rust::xxh64::Xxh64),
    Xxh128(xxhash_rust::xxh3::Xxh3),
}

impl Digester {
    fn new(algorithm: HashAlgorithm) -> Digester {
        match algorithm {
            HashAlgorithm::Sha256 => {
                Digester::Ring(ring::digest::Context::new(&ring::digest::SHA256))
            }
            HashAlgorithm::Sha1 => Digester::Ring(ring::digest::Context::new(
                &ring::digest::SHA1_FOR_LEGACY_USE_ONLY,
            )),
            HashAlgorithm::Sha512 => {
                Digester::Ring(ring::digest::Context::new(&ring::digest::SHA512))
            }
            HashAlgorithm::Md5 => Digester::Md5(<md5::Md5 as md5::Digest>::new()),
            HashAlgorithm::Xxh64 => Digester::Xxh64(xxhash_rust::xxh64::Xxh64::new(0)),
            HashAlgorithm::Xxh128 => Digester::Xxh128(xxhash_rust::xxh3::Xxh3::new()),
        }
    }

    fn update(&mut self, buf: &[u8]) {
        match self {
            Digester::Ring(ctx) => ctx.update(buf),
            Digester::Md5(ctx) => md5::Digest::update(ctx, buf),
            Digester::Xxh64(state) => state.update(buf),
            Digester::Xxh128(state) => state.update(buf),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Digester::Ring(ctx) => data_encoding::HEXLOWER.encode(ctx.finish().as_ref()),
            Digester::Md5(ctx) => {
                data_encoding::HEXLOWER.encode(&md5::Digest::finalize(ctx))
            }
            Digester::Xxh64(state) => format!("{:016x}", state.digest()),
            Digester::Xxh128(state) => format!("{:032x}", state.digest128()),
        }
    }
}

/// Streams `path` through `algorithm` and returns the lowercase hex digest.
/// Uses a bounded buffer so memory use is constant regardless of file size.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| FetchError::path_error(path, e.to_string()))?;
    let mut digester = Digester::new(algorithm);
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| FetchError::path_error(path, e.to_string()))?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
    }
    Ok(digester.finish_hex())
}

/// `true` if `path`'s digest matches `expected`, or if `expected` is the
/// `"unknown"` sentinel (which always verifies).
pub fn hashes_match(expected: &HashSpec, path: &Path) -> Result<bool> {
    Ok(verify(expected, path)?.0)
}

/// Computes `path`'s digest (if `expected` names an algorithm) and reports
/// whether it matches, in one pass, so callers that need the mismatched
/// digest for an error message don't have to hash the file twice.
pub fn verify(expected: &HashSpec, path: &Path) -> Result<(bool, Option<String>)> {
    if expected.is_unknown() {
        return Ok((true, None));
    }
    let algorithm = expected.algorithm().expect("non-unknown HashSpec has an algorithm");
    let actual = hash_file(path, algorithm)?;
    let matches = Some(actual.as_str()) == expected.digest();
    Ok((matches, Some(actual)))
}

/// Wraps a `Write` destination, hashing bytes as they're written, and
/// verifies the accumulated digest against `expected` on [`HashingWriter::finish`].
/// Used by the fetch state machine to verify the just-downloaded temporary
/// file in the same pass that writes it, without touching disk twice.
pub struct HashingWriter<'a, W: Write> {
    inner: W,
    digester: Option<Digester>,
    expected: &'a HashSpec,
}

impl<'a, W: Write> HashingWriter<'a, W> {
    pub fn new(expected: &'a HashSpec, inner: W) -> HashingWriter<'a, W> {
        let digester = expected.algorithm().map(Digester::new);
        HashingWriter {
            inner,
            digester,
            expected,
        }
    }

    /// Consumes the writer, returning the inner value if the digest matches.
    pub fn finish(self, path: &Path) -> Result<W> {
        match self.digester {
            None => Ok(self.inner),
            Some(digester) => {
                let actual = digester.finish_hex();
                if Some(actual.as_str()) == self.expected.digest() {
                    Ok(self.inner)
                } else {
                    Err(FetchError::HashMismatch {
                        expected: self.expected.to_string(),
                        actual,
                        path: path.to_path_buf(),
                    })
                }
            }
        }
    }
}

impl<'a, W: Write> Write for HashingWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        if let Some(digester) = &mut self.digester {
            digester.update(&buf[..written]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn parses_bare_hex_as_sha256() {
        let spec = HashSpec::parse("deadbeef").unwrap();
        assert_eq!(spec.algorithm(), Some(HashAlgorithm::Sha256));
        assert_eq!(spec.digest(), Some("deadbeef"));
    }

    #[test]
    fn parses_prefixed_spec() {
        let spec = HashSpec::parse("md5:AABBCC").unwrap();
        assert_eq!(spec.algorithm(), Some(HashAlgorithm::Md5));
        assert_eq!(spec.digest(), Some("aabbcc"));
    }

    #[test]
    fn unknown_sentinel_never_verifies() {
        let spec = HashSpec::parse("unknown").unwrap();
        assert!(spec.is_unknown());
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(HashSpec::parse("blake3:deadbeef").is_err());
    }

    #[test]
    fn hash_file_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let digest = hash_file(&path, HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn hashing_writer_rejects_mismatch() {
        let spec = HashSpec::parse(
            "sha256:0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        let mut writer = HashingWriter::new(&spec, Vec::new());
        writer.write_all(b"not the right bytes").unwrap();
        assert!(writer.finish(Path::new("whatever")).is_err());
    }
}
