//! Lockfile (`vend.lock`) management.
//!
//! The lockfile maps every installed package to the specifier it was declared
//! with, where it was resolved from, and the exact commit it is pinned to.
//! Entries live in a `BTreeMap`, so the serialized file is always sorted by
//! name and repeated runs with no semantic change produce identical bytes.

use crate::error::{Error, Result};
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub const LOCKFILE_VERSION: u32 = 1;

const LOCAL_SENTINEL: &str = "local";

/// Pinned revision. Local-path sources have nothing to pin.
///
/// On disk this is either a full 40-hex commit id or the literal `local`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pin {
    Commit(String),
    Local,
}

impl TryFrom<String> for Pin {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s == LOCAL_SENTINEL {
            Ok(Pin::Local)
        } else if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Pin::Commit(s))
        } else {
            Err(format!(
                "invalid commit '{}' (expected a 40-hex revision or 'local')",
                s
            ))
        }
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> Self {
        match pin {
            Pin::Commit(rev) => rev,
            Pin::Local => LOCAL_SENTINEL.to_string(),
        }
    }
}

impl Pin {
    pub fn commit(&self) -> Option<&str> {
        match self {
            Pin::Commit(rev) => Some(rev),
            Pin::Local => None,
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Commit(rev) => f.write_str(rev),
            Pin::Local => f.write_str(LOCAL_SENTINEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLock {
    pub specifier: String,
    pub resolved: String,
    pub commit: Pin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    pub version: u32,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageLock>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            version: LOCKFILE_VERSION,
            packages: BTreeMap::new(),
        }
    }
}

impl LockFile {
    /// A missing lockfile is an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let lock: LockFile = serde_json::from_str(content)?;
        if lock.version != LOCKFILE_VERSION {
            return Err(Error::UnsupportedLockfileVersion(lock.version));
        }
        Ok(lock)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_json_string()?)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PackageLock> {
        self.packages.get(name)
    }

    /// Upsert. Returns whether the stored entry changed.
    pub fn set(&mut self, name: &str, entry: PackageLock) -> bool {
        if self.packages.get(name) == Some(&entry) {
            return false;
        }
        self.packages.insert(name.to_string(), entry);
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.packages.remove(name).is_some()
    }

    /// Drop every entry whose name fails `keep`. Returns the removed names.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let removed: Vec<String> = self
            .packages
            .keys()
            .filter(|name| !keep(name.as_str()))
            .cloned()
            .collect();
        for name in &removed {
            self.packages.remove(name);
        }
        removed
    }
}
