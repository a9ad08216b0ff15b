/// Asset lookup: handles and the provider seam.
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The kind of resource being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetCategory {
    Background,
    Portrait,
    Music,
}

impl AssetCategory {
    /// Folder-style prefix used by file-backed providers.
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Background => "Backgrounds",
            Self::Portrait => "Characters",
            Self::Music => "Music",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Background => "background",
            Self::Portrait => "portrait",
            Self::Music => "music",
        })
    }
}

/// An opaque, resolved reference to a usable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle {
    pub category: AssetCategory,
    pub key: String,
}

impl AssetHandle {
    pub fn new(category: AssetCategory, key: impl Into<String>) -> Self {
        Self {
            category,
            key: key.into(),
        }
    }
}

/// Resolves asset identifiers to handles. Never fails loudly: a missing
/// asset is `None`, and callers decide how to degrade.
pub trait AssetProvider {
    fn resolve(&self, category: AssetCategory, id: &str) -> Option<AssetHandle>;
}

/// A declared set of available assets, per category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub backgrounds: FxHashSet<String>,
    #[serde(default)]
    pub portraits: FxHashSet<String>,
    #[serde(default)]
    pub music: FxHashSet<String>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: AssetCategory, id: impl Into<String>) {
        self.set_mut(category).insert(id.into());
    }

    pub fn with(mut self, category: AssetCategory, id: impl Into<String>) -> Self {
        self.insert(category, id);
        self
    }

    fn set(&self, category: AssetCategory) -> &FxHashSet<String> {
        match category {
            AssetCategory::Background => &self.backgrounds,
            AssetCategory::Portrait => &self.portraits,
            AssetCategory::Music => &self.music,
        }
    }

    fn set_mut(&mut self, category: AssetCategory) -> &mut FxHashSet<String> {
        match category {
            AssetCategory::Background => &mut self.backgrounds,
            AssetCategory::Portrait => &mut self.portraits,
            AssetCategory::Music => &mut self.music,
        }
    }

    pub fn load_from_ron(path: &Path) -> Result<AssetManifest, AssetError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<AssetManifest, AssetError> {
        Ok(ron::from_str(input)?)
    }
}

impl AssetProvider for AssetManifest {
    fn resolve(&self, category: AssetCategory, id: &str) -> Option<AssetHandle> {
        self.set(category)
            .contains(id)
            .then(|| AssetHandle::new(category, id))
    }
}

/// Resolves against files on disk: `<root>/<category dir>/<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct AssetDirectory {
    root: std::path::PathBuf,
}

impl AssetDirectory {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetProvider for AssetDirectory {
    fn resolve(&self, category: AssetCategory, id: &str) -> Option<AssetHandle> {
        if !is_relative_key(id) {
            return None;
        }
        let base = self.root.join(category.dir()).join(id);
        let dir = base.parent()?;
        let stem = base.file_name()?.to_str()?;
        let entries = std::fs::read_dir(dir).ok()?;
        entries.flatten().find_map(|entry| {
            let path = entry.path();
            let matches = path.is_file()
                && path.file_stem().and_then(|s| s.to_str()) == Some(stem);
            matches.then(|| AssetHandle::new(category, path.to_string_lossy()))
        })
    }
}

// Keys are `/`-separated relative paths that must stay under the root.
fn is_relative_key(id: &str) -> bool {
    !id.contains(['\\', ':', '\0'])
        && id
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}
