//! `.env` file parsing
//!
//! The file is only ever opened for reading. Values land in an in-memory map
//! and are never exported into the process environment.

use crate::error::{ConfigError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parsed contents of a `KEY=VALUE` file
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl EnvFile {
    /// Read and parse an env file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::EnvFileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let env_file = Self::parse(path, &content);

        debug!(
            env_file = %path.display(),
            keys = env_file.values.len(),
            "Loaded environment file"
        );
        Ok(env_file)
    }

    /// Parse env file content; `path` is only used for diagnostics
    pub fn parse(path: &Path, content: &str) -> Self {
        let mut values = BTreeMap::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);

            match line.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    if key.is_empty() {
                        warn!(file = %path.display(), line = index + 1, "Skipping entry without a key");
                        continue;
                    }
                    values.insert(key.to_string(), parse_value(value.trim()).to_string());
                }
                None => {
                    warn!(file = %path.display(), line = index + 1, "Skipping line without '='");
                }
            }
        }

        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value, possibly empty
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Non-empty value or a `MissingKey` error naming the key
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::MissingKey {
                key: key.to_string(),
                source_name: self.path.display().to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Strip one pair of matching surrounding quotes
/// Quoted values are taken verbatim up to the closing quote. Unquoted values
/// end at a `#` preceded by whitespace.
fn parse_value(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                return &rest[..end];
            }
        }
    }

    let end = value
        .char_indices()
        .find(|&(i, c)| c == '#' && value[..i].ends_with(char::is_whitespace))
        .map_or(value.len(), |(i, _)| i);
    value[..end].trim_end()
}
