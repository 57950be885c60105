use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use flowgroup_core::{LayoutConfig, NodeId, Viewport};
use flowgroup_graph::NodeTable;
use flowgroup_storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const DOCUMENT_VERSION: u32 = 1;
const LAYOUT_STORE_SUFFIX: &str = "layout.db";

/// The unit of save: the flat node table plus everything needed to reopen
/// the editor where it was left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramDocument {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub config: LayoutConfig,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub nodes: NodeTable,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiagramDocument {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: DOCUMENT_VERSION,
            config: LayoutConfig::default(),
            viewport: Viewport::default(),
            nodes: NodeTable::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn group_ids(&self) -> HashSet<NodeId> {
        self.nodes.groups().map(|group| group.id.clone()).collect()
    }
}

pub struct Project {
    pub document: DiagramDocument,
    pub path: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            document: DiagramDocument::new(name),
            path,
        }
    }

    /// Read a document and check it before handing it to the editor.
    pub fn load(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading diagram {}", path.display()))?;
        let document: DiagramDocument = serde_json::from_str(&content)
            .with_context(|| format!("parsing diagram {}", path.display()))?;

        if document.version > DOCUMENT_VERSION {
            bail!(
                "Unsupported diagram version: {} (max supported: {DOCUMENT_VERSION})",
                document.version
            );
        }
        document
            .nodes
            .validate()
            .with_context(|| format!("invalid node table in {}", path.display()))?;

        debug!(path = %path.display(), nodes = document.nodes.len(), "Loaded diagram");
        Ok(Self { document, path })
    }

    pub fn save(&mut self) -> Result<()> {
        self.document.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(&self.document)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, content)
            .with_context(|| format!("writing diagram {}", self.path.display()))?;
        info!(path = %self.path.display(), nodes = self.document.nodes.len(), "Saved diagram");
        Ok(())
    }

    /// Load the document at `path` when it exists, else start a new one
    /// named after the file.
    pub fn open_or_create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("Diagram")
            .to_string();
        Ok(Self::new(name, path))
    }

    /// Sidecar database holding minimized groups' child layouts,
    /// e.g. `network.json` -> `network.layout.db`.
    pub fn layout_store_path(&self) -> PathBuf {
        layout_store_path_for(&self.path)
    }

    pub fn open_layout_store(&self) -> Result<Storage> {
        let path = self.layout_store_path();
        Storage::open(&path).with_context(|| format!("opening layout store {}", path.display()))
    }

    /// Drop cached layouts for groups the document no longer contains.
    pub fn reconcile_layout_store(&self, storage: &Storage) -> Result<usize> {
        let removed = storage.prune_layouts(&self.document.group_ids())?;
        Ok(removed)
    }
}

pub fn layout_store_path_for(document: &Path) -> PathBuf {
    let stem = document
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("diagram");
    document.with_file_name(format!("{stem}.{LAYOUT_STORE_SUFFIX}"))
}
