//! Component D — the in-memory `name -> (hash, url?)` mapping, with a plain
//! text serialization. Backed by an `IndexMap` so iteration order matches
//! insertion order, which is what makes `dump(load(text)) == text` possible.

use std::io::{BufRead, Write};

use indexmap::IndexMap;

use crate::hash::HashSpec;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub hash: HashSpec,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: String, entry: RegistryEntry) {
        self.entries.insert(name, entry);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn list_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Parses the registry's plain-text format (§4.4): one entry per line,
    /// space-separated fields, `#`-comments, blank lines ignored. The hash
    /// token is identified positionally as the *last* whitespace-separated
    /// token that parses as a hash specifier; tokens before it join (with
    /// single spaces) into the name, tokens after it join into the URL.
    pub fn load(source_name: &str, reader: impl BufRead) -> Result<Registry> {
        let mut registry = Registry::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line_no = line_no + 1;
            let line = line.map_err(|e| FetchError::MalformedRegistry {
                source: source_name.to_string(),
                line: line_no,
                message: e.to_string(),
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let hash_index = tokens
                .iter()
                .enumerate()
                .rev()
                .find(|(_, token)| HashSpec::try_parse(token).is_some())
                .map(|(index, _)| index)
                .ok_or_else(|| FetchError::MalformedRegistry {
                    source: source_name.to_string(),
                    line: line_no,
                    message: "no token in this line parses as a hash specifier".to_string(),
                })?;
            if hash_index == 0 {
                return Err(FetchError::MalformedRegistry {
                    source: source_name.to_string(),
                    line: line_no,
                    message: "missing file name before the hash specifier".to_string(),
                });
            }
            let name = tokens[..hash_index].join(" ");
            let hash = HashSpec::parse(tokens[hash_index])?;
            let url = if hash_index + 1 < tokens.len() {
                Some(tokens[hash_index + 1..].join(" "))
            } else {
                None
            };
            if registry.contains(&name) {
                return Err(FetchError::MalformedRegistry {
                    source: source_name.to_string(),
                    line: line_no,
                    message: format!("duplicate name {name:?}"),
                });
            }
            registry.insert(name, RegistryEntry { hash, url });
        }
        Ok(registry)
    }

    /// Writes the registry back out in the same format, one line per entry
    /// in insertion order, with a single trailing newline per line (LF).
    pub fn dump(&self, mut writer: impl Write) -> Result<()> {
        for (name, entry) in &self.entries {
            match &entry.url {
                Some(url) => writeln!(writer, "{name} {hash} {url}", hash = entry.hash)?,
                None => writeln!(writer, "{name} {hash}", hash = entry.hash)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indoc::indoc;

    #[test]
    fn loads_two_and_three_field_lines() {
        let text = indoc! {"
            # a comment
            tiny-data.txt sha256:baee0894dba14b12085eacb204284b97e362f4f3e5a5807693cc90ef415c1b2d

            x.bin sha256:0000000000000000000000000000000000000000000000000000000000000000 ftp://mirror.example.org/x.bin
        "};
        let registry = Registry::load("registry.txt", text.as_bytes()).unwrap();
        assert!(registry.contains("tiny-data.txt"));
        let entry = registry.get("x.bin").unwrap();
        assert_eq!(entry.url.as_deref(), Some("ftp://mirror.example.org/x.bin"));
    }

    #[test]
    fn filename_with_embedded_space_is_disambiguated_by_last_hash_token() {
        let text = "my cool file.dat sha256:0000000000000000000000000000000000000000000000000000000000000000\n";
        let registry = Registry::load("registry.txt", text.as_bytes()).unwrap();
        assert!(registry.contains("my cool file.dat"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let text = "a.txt unknown\na.txt unknown\n";
        assert!(Registry::load("registry.txt", text.as_bytes()).is_err());
    }

    #[test]
    fn rejects_line_with_no_hash_token() {
        let text = "a.txt not-a-hash\n";
        assert!(Registry::load("registry.txt", text.as_bytes()).is_err());
    }

    #[test]
    fn round_trips_through_dump_and_load() {
        let text = "a.txt sha256:0000000000000000000000000000000000000000000000000000000000000000\nb.txt unknown http://example.org/b.txt\n";
        let registry = Registry::load("registry.txt", text.as_bytes()).unwrap();
        let mut out = Vec::new();
        registry.dump(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), text);
    }
}
