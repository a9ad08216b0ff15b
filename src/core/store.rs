/// Node store: looks up a node document by id and parses it.
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::schema::node::DialogueNode;

#[derive(Debug, Error)]
pub enum NodeStoreError {
    #[error("node not found: {0}")]
    NotFound(String),
    #[error("invalid node id '{0}'")]
    InvalidId(String),
    #[error("IO error reading node '{id}': {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("RON parse error in node '{id}': {source}")]
    Ron {
        id: String,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("JSON parse error in node '{id}': {source}")]
    Json {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed node '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

/// The two failure classes a caller needs to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadFailure {
    NotFound,
    ParseError,
}

impl NodeStoreError {
    pub fn kind(&self) -> LoadFailure {
        match self {
            Self::NotFound(_) | Self::InvalidId(_) => LoadFailure::NotFound,
            Self::Io { .. } | Self::Ron { .. } | Self::Json { .. } | Self::Invalid { .. } => {
                LoadFailure::ParseError
            }
        }
    }
}

/// Document syntax of a stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeFormat {
    Ron,
    Json,
}

impl NodeFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ron => "ron",
            Self::Json => "json",
        }
    }

    pub fn from_path(path: &Path) -> Option<NodeFormat> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("ron") => Some(Self::Ron),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Source of dialogue nodes. Lookups are pure: the same stored data
/// always parses to the same node.
pub trait NodeStore {
    fn load_node(&self, id: &str) -> Result<DialogueNode, NodeStoreError>;
}

/// Parse one node document and check the shape serde cannot.
pub fn parse_node(id: &str, input: &str, format: NodeFormat) -> Result<DialogueNode, NodeStoreError> {
    let node: DialogueNode = match format {
        NodeFormat::Ron => ron::from_str(input).map_err(|source| NodeStoreError::Ron {
            id: id.to_string(),
            source,
        })?,
        NodeFormat::Json => serde_json::from_str(input).map_err(|source| NodeStoreError::Json {
            id: id.to_string(),
            source,
        })?,
    };
    validate(id, &node)?;
    if node.id != id {
        warn!("node '{}' declares id '{}'", id, node.id);
    }
    Ok(node)
}

fn validate(id: &str, node: &DialogueNode) -> Result<(), NodeStoreError> {
    let invalid = |reason: String| NodeStoreError::Invalid {
        id: id.to_string(),
        reason,
    };
    if node.id.trim().is_empty() {
        return Err(invalid("empty id".to_string()));
    }
    for (i, option) in node.options.iter().enumerate() {
        if option.target.trim().is_empty() {
            return Err(invalid(format!("option {} has no target", i)));
        }
    }
    Ok(())
}

/// Ids double as file names, so they may not escape the store root.
fn check_id(id: &str) -> Result<(), NodeStoreError> {
    let bad = id.trim().is_empty()
        || id.contains(['/', '\\'])
        || id == "."
        || id == ".."
        || id.contains('\0');
    if bad {
        Err(NodeStoreError::InvalidId(id.to_string()))
    } else {
        Ok(())
    }
}

/// Loads `<root>/<id>.ron`, falling back to `<root>/<id>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryNodeStore {
    root: PathBuf,
}

impl DirectoryNodeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids of every node document in the store, sorted.
    pub fn node_ids(&self) -> Result<Vec<String>, std::io::Error> {
        let mut ids: Vec<String> = std::fs::read_dir(&self.root)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && NodeFormat::from_path(path).is_some())
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl NodeStore for DirectoryNodeStore {
    fn load_node(&self, id: &str) -> Result<DialogueNode, NodeStoreError> {
        check_id(id)?;
        for format in [NodeFormat::Ron, NodeFormat::Json] {
            let path = self.root.join(format!("{}.{}", id, format.extension()));
            match std::fs::read_to_string(&path) {
                Ok(contents) => return parse_node(id, &contents, format),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(NodeStoreError::Io {
                        id: id.to_string(),
                        source,
                    })
                }
            }
        }
        Err(NodeStoreError::NotFound(id.to_string()))
    }
}

/// Node documents held in memory, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    documents: FxHashMap<String, (NodeFormat, String)>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&mut self, id: impl Into<String>, format: NodeFormat, document: impl Into<String>) {
        self.documents.insert(id.into(), (format, document.into()));
    }

    /// Store an already-built node under its own id.
    pub fn insert_node(&mut self, node: &DialogueNode) -> Result<(), ron::Error> {
        let document = ron::to_string(node)?;
        self.insert_document(node.id.clone(), NodeFormat::Ron, document);
        Ok(())
    }

    pub fn with_node(mut self, node: &DialogueNode) -> Result<Self, ron::Error> {
        self.insert_node(node)?;
        Ok(self)
    }

    /// Build a store from a JSON object mapping ids to node documents.
    pub fn from_json_map(input: &str) -> Result<Self, serde_json::Error> {
        let raw: FxHashMap<String, serde_json::Value> = serde_json::from_str(input)?;
        let mut store = Self::new();
        for (id, value) in raw {
            store.insert_document(id, NodeFormat::Json, value.to_string());
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl NodeStore for MemoryNodeStore {
    fn load_node(&self, id: &str) -> Result<DialogueNode, NodeStoreError> {
        check_id(id)?;
        let (format, document) = self
            .documents
            .get(id)
            .ok_or_else(|| NodeStoreError::NotFound(id.to_string()))?;
        parse_node(id, document, *format)
    }
}
