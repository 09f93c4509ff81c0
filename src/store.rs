//! Local portable-item store
//!
//! Portable items live as JSON documents named `<key>.<type>-meta.json`
//! under `<base>/<context>/<type>/`. The engine core never touches the
//! filesystem itself; retrieve hands resolved items to this store and the
//! key-change reconciler asks it to drop artifacts filed under a stale key.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::core::context::BusinessContext;
use crate::core::item::MetadataItem;

/// Suffix of every item document
const META_SUFFIX: &str = "-meta.json";

/// Directory-backed store of portable items
#[derive(Debug, Clone)]
pub struct ItemStore {
    base: PathBuf,
}

impl ItemStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn type_dir(&self, context: &BusinessContext, type_name: &str) -> PathBuf {
        self.base.join(context.as_str()).join(type_name)
    }

    fn item_path(&self, context: &BusinessContext, type_name: &str, key: &str) -> PathBuf {
        self.type_dir(context, type_name)
            .join(format!("{key}.{type_name}{META_SUFFIX}"))
    }

    /// Write one item under its key; parent directories are created
    pub fn save_item(
        &self,
        context: &BusinessContext,
        type_name: &str,
        key: &str,
        item: &MetadataItem,
    ) -> Result<PathBuf, StoreError> {
        let path = self.item_path(context, type_name, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = serde_json::to_string_pretty(item).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        text.push('\n');
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Load every item of a type, keyed by the file's declared key
    pub fn load_items(
        &self,
        context: &BusinessContext,
        type_name: &str,
    ) -> Result<Vec<(String, MetadataItem)>, StoreError> {
        let dir = self.type_dir(context, type_name);
        let mut items = Vec::new();
        if !dir.exists() {
            return Ok(items);
        }
        let suffix = format!(".{type_name}{META_SUFFIX}");
        for entry in WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = file_name.strip_suffix(&suffix) else {
                continue;
            };
            let content = fs::read_to_string(path)?;
            let item: MetadataItem =
                serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            items.push((key.to_string(), item));
        }
        items.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(items)
    }

    /// Remove the artifact filed under `key`. Returns whether a file was
    /// actually deleted; a missing file is not an error, so removal is
    /// idempotent.
    pub fn remove_item(
        &self,
        context: &BusinessContext,
        type_name: &str,
        key: &str,
    ) -> Result<bool, StoreError> {
        let path = self.item_path(context, type_name, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Errors from the local item store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode item '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}
