//! Hostname blocklist loading and matching.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostnamePolicyError {
    #[error("reading hostname policy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing hostname policy {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HostnamePolicyFile {
    blocked: Vec<String>,
    exact_blocked: Vec<String>,
}

/// Blocked names. `blocked` entries also cover every subdomain.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostnamePolicy {
    blocked: HashSet<String>,
    exact_blocked: HashSet<String>,
}

impl HostnamePolicy {
    pub fn load(path: &Path) -> Result<Self, HostnamePolicyError> {
        let content = fs::read_to_string(path).map_err(|source| HostnamePolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: HostnamePolicyFile =
            serde_json::from_str(&content).map_err(|source| HostnamePolicyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file.blocked, file.exact_blocked))
    }

    pub fn new(
        blocked: impl IntoIterator<Item = String>,
        exact_blocked: impl IntoIterator<Item = String>,
    ) -> Self {
        let normalize = |s: String| s.trim_end_matches('.').to_ascii_lowercase();
        Self {
            blocked: blocked.into_iter().map(normalize).collect(),
            exact_blocked: exact_blocked.into_iter().map(normalize).collect(),
        }
    }

    /// True if `name` (already lowercased) matches an entry.
    pub fn is_blocked(&self, name: &str) -> bool {
        if self.exact_blocked.contains(name) {
            return true;
        }
        // Walk every suffix starting at a label boundary.
        let mut candidate = name;
        loop {
            if self.blocked.contains(candidate) {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) => candidate = parent,
                None => return false,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.blocked.len() + self.exact_blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
