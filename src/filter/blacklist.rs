//! Blacklist of domain names.
//!
//! Loaded once from a text file with one name per line and never modified
//! afterwards. Matching is exact on bytes: no suffix matching, no case
//! folding and no text decoding.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};

/// An immutable set of blocked domain names.
#[derive(Debug, Default)]
pub struct Blacklist {
    names: FxHashSet<Vec<u8>>,
}

impl Blacklist {
    /// Read a blacklist file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read(path).map_err(|source| Error::Blacklist {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::from_bytes(&contents))
    }

    /// Build a blacklist from newline separated names. A trailing `\r` is
    /// stripped from each line and blank lines are skipped; everything else
    /// is kept verbatim.
    pub fn from_bytes(contents: &[u8]) -> Self {
        let names = contents
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(<[u8]>::to_vec)
            .collect();

        Self { names }
    }

    pub fn from_lines(contents: &str) -> Self {
        Self::from_bytes(contents.as_bytes())
    }

    /// Check if a name is on the blacklist.
    pub fn is_blocked(&self, name: impl AsRef<[u8]>) -> bool {
        self.names.contains(name.as_ref())
    }

    /// Returns the number of names on the blacklist.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
