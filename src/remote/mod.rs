//! Reference CRUD adapter backed by a directory
//!
//! `FsAdapter` treats a directory tree as a remote environment: one JSON
//! document per remote item under `<root>/<context>/<type>/<id>.json`.
//! It enforces the two platform behaviors the engine cares about —
//! environment-assigned identifiers and key uniqueness — and powers the
//! integration tests and offline demos. A real platform adapter implements
//! the same [`CrudAdapter`] trait over HTTP.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use ulid::Ulid;

use crate::core::adapter::{CrudAdapter, RemoteError, RemoteErrorKind};
use crate::core::context::BusinessContext;
use crate::core::descriptor::TypeDescriptor;
use crate::core::item::MetadataItem;

/// Directory-backed stand-in for a remote environment
pub struct FsAdapter {
    descriptor: TypeDescriptor,
    root: PathBuf,
}

impl FsAdapter {
    pub fn new(descriptor: TypeDescriptor, root: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            root: root.into(),
        }
    }

    fn type_dir(&self, context: &BusinessContext) -> PathBuf {
        self.root.join(context.as_str()).join(&self.descriptor.name)
    }

    fn item_path(&self, context: &BusinessContext, id: &str) -> PathBuf {
        self.type_dir(context).join(format!("{id}.json"))
    }

    fn io_error(e: std::io::Error) -> RemoteError {
        RemoteError::new(RemoteErrorKind::AbortedResponse, e.to_string())
    }

    fn read_all(&self, context: &BusinessContext) -> Result<Vec<MetadataItem>, RemoteError> {
        let dir = self.type_dir(context);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        let mut entries: Vec<_> = fs::read_dir(&dir)
            .map_err(Self::io_error)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect();
        entries.sort();
        for path in entries {
            let content = fs::read_to_string(&path).map_err(Self::io_error)?;
            let item: MetadataItem = serde_json::from_str(&content).map_err(|e| {
                RemoteError::new(
                    RemoteErrorKind::AbortedResponse,
                    format!("malformed document {}: {e}", path.display()),
                )
            })?;
            items.push(item);
        }
        Ok(items)
    }

    fn write_item(
        &self,
        context: &BusinessContext,
        id: &str,
        item: &MetadataItem,
    ) -> Result<(), RemoteError> {
        let path = self.item_path(context, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Self::io_error)?;
        }
        let text = serde_json::to_string_pretty(item)
            .map_err(|e| RemoteError::operation(e.to_string()))?;
        fs::write(&path, text).map_err(Self::io_error)
    }

    /// Identifiers are strings or numbers depending on the type
    fn id_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn key_of(&self, item: &MetadataItem) -> Result<String, RemoteError> {
        item.field_str(&self.descriptor.key_field)
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::operation(format!(
                    "payload is missing '{}'",
                    self.descriptor.key_field
                ))
            })
    }
}

#[async_trait]
impl CrudAdapter for FsAdapter {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    async fn fetch_all(
        &self,
        context: &BusinessContext,
    ) -> Result<Vec<MetadataItem>, RemoteError> {
        self.read_all(context)
    }

    async fn create_remote(
        &self,
        context: &BusinessContext,
        item: &MetadataItem,
    ) -> Result<MetadataItem, RemoteError> {
        let key = self.key_of(item)?;
        let existing = self.read_all(context)?;
        if existing
            .iter()
            .any(|it| it.field_str(&self.descriptor.key_field) == Some(key.as_str()))
        {
            return Err(RemoteError::operation(format!(
                "{} '{key}' already exists",
                self.descriptor.name
            )));
        }

        // The environment, not the caller, assigns identifier and timestamps
        let id = Ulid::new().to_string();
        let now = Utc::now().to_rfc3339();
        let mut created = item.clone();
        created.set_field(self.descriptor.id_field.clone(), Value::String(id.clone()));
        created.set_field("createdDate", Value::String(now.clone()));
        created.set_field("modifiedDate", Value::String(now));
        self.write_item(context, &id, &created)?;
        Ok(created)
    }

    async fn update_remote(
        &self,
        context: &BusinessContext,
        item: &MetadataItem,
    ) -> Result<MetadataItem, RemoteError> {
        let id = item
            .field(&self.descriptor.id_field)
            .and_then(Self::id_string)
            .ok_or_else(|| {
                RemoteError::operation(format!(
                    "update payload is missing '{}'",
                    self.descriptor.id_field
                ))
            })?;
        let path = self.item_path(context, &id);
        if !path.exists() {
            return Err(RemoteError::operation(format!(
                "no {} with {} = {id}",
                self.descriptor.name, self.descriptor.id_field
            )));
        }
        let mut updated = item.clone();
        updated.set_field(
            "modifiedDate",
            Value::String(Utc::now().to_rfc3339()),
        );
        self.write_item(context, &id, &updated)?;
        Ok(updated)
    }
}
