//! Project layout and manifest (`vend.json`) handling.
//!
//! The manifest is kept as an order-preserving JSON document so that every
//! field vend does not own (name, version, scripts, ...) is written back
//! exactly as it was read. Only three maps are edited:
//!
//! ```json
//! {
//!   "dependencies":    { "widgets": "acme/widgets@v1.2.0" },
//!   "devDependencies": { "testkit": "path:../testkit" },
//!   "collections":     { "widgets": "deps/widgets", "testkit": "deps/testkit" }
//! }
//! ```

use crate::error::{Error, Result};
use crate::specifier::is_valid_name;
use crate::utils::write_atomic;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "vend.json";
pub const LOCK_FILE: &str = "vend.lock";
pub const DEPS_DIR: &str = "deps";

const COLLECTIONS_KEY: &str = "collections";

/// File layout of one project, rooted at the directory holding `vend.json`.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn deps_dir(&self) -> PathBuf {
        self.root.join(DEPS_DIR)
    }

    pub fn working_copy(&self, name: &str) -> PathBuf {
        self.deps_dir().join(name)
    }

    /// Collection path recorded in the manifest, relative to the project root.
    pub fn collection_path(&self, name: &str) -> String {
        format!("{}/{}", DEPS_DIR, name)
    }

    /// Local sources are declared relative to the project root.
    pub fn resolve_local(&self, origin: &str) -> PathBuf {
        let path = Path::new(origin);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Regular,
    Dev,
}

impl DependencyKind {
    pub fn key(self) -> &'static str {
        match self {
            DependencyKind::Regular => "dependencies",
            DependencyKind::Dev => "devDependencies",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DependencyKind::Regular => "dependency",
            DependencyKind::Dev => "dev",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub name: String,
    pub specifier: String,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    doc: Map<String, Value>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            return Err(Error::ManifestNotFound(dir));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidManifest {
            path: path.to_path_buf(),
            reason,
        };

        let value: Value = serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
        let Value::Object(doc) = value else {
            return Err(invalid("top level must be an object".to_string()));
        };

        for key in [
            DependencyKind::Regular.key(),
            DependencyKind::Dev.key(),
            COLLECTIONS_KEY,
        ] {
            match doc.get(key) {
                None => {}
                Some(Value::Object(map)) => {
                    if let Some((name, _)) = map.iter().find(|(_, v)| !v.is_string()) {
                        return Err(invalid(format!("'{}.{}' must be a string", key, name)));
                    }
                    // Names become paths under deps/.
                    if let Some(name) = map.keys().find(|name| !is_valid_name(name)) {
                        return Err(invalid(format!(
                            "'{}' in '{}' is not a valid package name",
                            name, key
                        )));
                    }
                }
                Some(_) => return Err(invalid(format!("'{}' must be an object", key))),
            }
        }

        Ok(Self { doc })
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&self.doc)?;
        out.push('\n');
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_json_string()?)?;
        Ok(())
    }

    fn string_map(&self, key: &str) -> IndexMap<String, String> {
        self.doc
            .get(key)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let entry = self
            .doc
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just made an object"),
        }
    }

    pub fn dependencies(&self, kind: DependencyKind) -> IndexMap<String, String> {
        self.string_map(kind.key())
    }

    /// Every declared dependency: `dependencies` first, then
    /// `devDependencies`, each in manifest order.
    pub fn declared(&self) -> Vec<Declared> {
        [DependencyKind::Regular, DependencyKind::Dev]
            .into_iter()
            .flat_map(|kind| {
                self.dependencies(kind)
                    .into_iter()
                    .map(move |(name, specifier)| Declared {
                        name,
                        specifier,
                        kind,
                    })
            })
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<Declared> {
        self.declared().into_iter().find(|d| d.name == name)
    }

    pub fn declare(&mut self, kind: DependencyKind, name: &str, specifier: &str) -> Result<()> {
        if self.find(name).is_some() {
            return Err(Error::PackageAlreadyExists {
                name: name.to_string(),
            });
        }
        self.object_mut(kind.key())
            .insert(name.to_string(), Value::String(specifier.to_string()));
        Ok(())
    }

    /// Swap the specifier of an existing declaration in place.
    pub fn replace_specifier(&mut self, name: &str, specifier: &str) -> bool {
        let Some(existing) = self.find(name) else {
            return false;
        };
        if existing.specifier == specifier {
            return false;
        }
        self.object_mut(existing.kind.key())
            .insert(name.to_string(), Value::String(specifier.to_string()));
        true
    }

    pub fn undeclare(&mut self, name: &str) -> Option<DependencyKind> {
        let kind = self.find(name)?.kind;
        self.object_mut(kind.key()).shift_remove(name);
        Some(kind)
    }

    pub fn collection(&self, name: &str) -> Option<String> {
        self.string_map(COLLECTIONS_KEY).get(name).cloned()
    }

    pub fn set_collection(&mut self, name: &str, path: &str) -> bool {
        if self.collection(name).as_deref() == Some(path) {
            return false;
        }
        self.object_mut(COLLECTIONS_KEY)
            .insert(name.to_string(), Value::String(path.to_string()));
        true
    }

    pub fn remove_collection(&mut self, name: &str) -> bool {
        if self.collection(name).is_none() {
            return false;
        }
        self.object_mut(COLLECTIONS_KEY).shift_remove(name).is_some()
    }
}
