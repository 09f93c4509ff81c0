//! Key-change reconciliation
//!
//! Renaming an item's portable key is an opt-in deploy mode: the update is
//! matched under the old key while the payload already carries the new one.
//! After the batch, the reconciler removes local artifacts filed under the
//! old key and records the rename so that later outbound resolution in the
//! same run points at the new key.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::core::context::BusinessContext;
use crate::core::descriptor::TypeDescriptor;
use crate::core::executor::BatchReport;
use crate::store::ItemStore;

/// Run-scoped record of applied key renames
#[derive(Debug, Default, Clone)]
pub struct KeyRenameMap {
    map: HashMap<(String, String), String>,
}

impl KeyRenameMap {
    /// Record that `old` became `new` for one entity type
    pub fn record(
        &mut self,
        type_name: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) {
        self.map
            .insert((type_name.into(), old.into()), new.into());
    }

    /// The new key for an old one, if a rename was recorded
    pub fn lookup(&self, type_name: &str, old: &str) -> Option<&str> {
        self.map
            .get(&(type_name.to_string(), old.to_string()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Iterate recorded renames as (type, old, new)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.map
            .iter()
            .map(|((type_name, old), new)| (type_name.as_str(), old.as_str(), new.as_str()))
    }
}

/// One applied rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRename {
    pub type_name: String,
    pub old_key: String,
    pub new_key: String,
    /// Whether a stale artifact was actually deleted (false on re-runs)
    pub removed_artifact: bool,
}

/// Detect and clean up key renames after a batch.
///
/// Every successful operation whose payload key differs from the key it was
/// attributed to is a rename: the artifact filed under the old key is
/// removed from the store and the mapping is recorded in `renames`.
/// Applying the same report twice yields the same final state — artifact
/// removal tolerates already-missing files and re-recording a mapping is a
/// no-op.
pub fn reconcile_key_changes(
    descriptor: &TypeDescriptor,
    context: &BusinessContext,
    report: &BatchReport,
    store: &ItemStore,
    renames: &mut KeyRenameMap,
) -> Vec<AppliedRename> {
    let mut applied = Vec::new();
    for op in report.successes() {
        let Some(new_key) = op.item.field_str(&descriptor.key_field) else {
            continue;
        };
        if new_key == op.key {
            continue;
        }
        let removed_artifact = match store.remove_item(context, &descriptor.name, &op.key) {
            Ok(removed) => removed,
            Err(error) => {
                warn!(
                    r#type = descriptor.name,
                    old_key = op.key,
                    %error,
                    "failed to remove stale artifact after key change"
                );
                false
            }
        };
        info!(
            r#type = descriptor.name,
            old_key = op.key,
            new_key,
            removed_artifact,
            "key changed; item must be re-persisted under the new key"
        );
        renames.record(descriptor.name.as_str(), op.key.as_str(), new_key);
        applied.push(AppliedRename {
            type_name: descriptor.name.clone(),
            old_key: op.key.clone(),
            new_key: new_key.to_string(),
            removed_artifact,
        });
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::{CompletedOp, OpKind, OpOutcome};
    use crate::core::item::MetadataItem;
    use serde_json::json;
    use tempfile::tempdir;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor {
            name: "dataExtension".to_string(),
            key_field: "customerKey".to_string(),
            id_field: "objectId".to_string(),
            name_field: "name".to_string(),
            folder_id_field: None,
            creatable: true,
            updatable: true,
            creatable_fields: Vec::new(),
            updatable_fields: Vec::new(),
            retrievable_fields: Vec::new(),
            templatable_fields: Vec::new(),
            references: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    fn ctx() -> BusinessContext {
        BusinessContext::new("prod").unwrap()
    }

    fn completed(file_key: &str, payload_key: &str, succeeded: bool) -> CompletedOp {
        let item = MetadataItem::from_value(json!({"customerKey": payload_key})).unwrap();
        CompletedOp {
            key: file_key.to_string(),
            kind: OpKind::Update,
            item: item.clone(),
            outcome: if succeeded {
                OpOutcome::Success { response: item }
            } else {
                OpOutcome::Failure {
                    error: crate::core::adapter::RemoteError::operation("rejected"),
                }
            },
            retried: false,
        }
    }

    #[test]
    fn test_rename_map_lookup() {
        let mut renames = KeyRenameMap::default();
        assert!(renames.is_empty());
        renames.record("dataExtension", "DE1", "DE1_v2");
        assert_eq!(renames.lookup("dataExtension", "DE1"), Some("DE1_v2"));
        assert_eq!(renames.lookup("automation", "DE1"), None);
        assert_eq!(renames.len(), 1);
    }

    #[test]
    fn test_rename_detected_and_artifact_removed() {
        let dir = tempdir().unwrap();
        let store = ItemStore::new(dir.path());
        let item = MetadataItem::from_value(json!({"customerKey": "DE1"})).unwrap();
        store.save_item(&ctx(), "dataExtension", "DE1", &item).unwrap();

        let report = BatchReport {
            ops: vec![completed("DE1", "DE1_v2", true)],
        };
        let mut renames = KeyRenameMap::default();
        let applied = reconcile_key_changes(&descriptor(), &ctx(), &report, &store, &mut renames);

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].old_key, "DE1");
        assert_eq!(applied[0].new_key, "DE1_v2");
        assert!(applied[0].removed_artifact);
        assert_eq!(renames.lookup("dataExtension", "DE1"), Some("DE1_v2"));
        assert!(store.load_items(&ctx(), "dataExtension").unwrap().is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ItemStore::new(dir.path());
        let item = MetadataItem::from_value(json!({"customerKey": "DE1"})).unwrap();
        store.save_item(&ctx(), "dataExtension", "DE1", &item).unwrap();

        let report = BatchReport {
            ops: vec![completed("DE1", "DE1_v2", true)],
        };
        let mut renames = KeyRenameMap::default();
        let first = reconcile_key_changes(&descriptor(), &ctx(), &report, &store, &mut renames);
        let second = reconcile_key_changes(&descriptor(), &ctx(), &report, &store, &mut renames);

        assert!(first[0].removed_artifact);
        // Second application finds nothing to delete and changes nothing
        assert!(!second[0].removed_artifact);
        assert_eq!(renames.len(), 1);
        assert_eq!(renames.lookup("dataExtension", "DE1"), Some("DE1_v2"));
    }

    #[test]
    fn test_failed_update_is_not_reconciled() {
        let dir = tempdir().unwrap();
        let store = ItemStore::new(dir.path());
        let item = MetadataItem::from_value(json!({"customerKey": "DE1"})).unwrap();
        store.save_item(&ctx(), "dataExtension", "DE1", &item).unwrap();

        let report = BatchReport {
            ops: vec![completed("DE1", "DE1_v2", false)],
        };
        let mut renames = KeyRenameMap::default();
        let applied = reconcile_key_changes(&descriptor(), &ctx(), &report, &store, &mut renames);

        assert!(applied.is_empty());
        assert!(renames.is_empty());
        // The old artifact survives a failed rename
        assert_eq!(store.load_items(&ctx(), "dataExtension").unwrap().len(), 1);
    }

    #[test]
    fn test_unrenamed_items_untouched() {
        let dir = tempdir().unwrap();
        let store = ItemStore::new(dir.path());
        let report = BatchReport {
            ops: vec![completed("DE1", "DE1", true)],
        };
        let mut renames = KeyRenameMap::default();
        let applied = reconcile_key_changes(&descriptor(), &ctx(), &report, &store, &mut renames);
        assert!(applied.is_empty());
        assert!(renames.is_empty());
    }
}
