//! Bidirectional reference resolution
//!
//! Outbound (retrieve): environment-specific identifiers are swapped for
//! portable keys, so files promote across environments untouched. Inbound
//! (deploy): portable keys are swapped back for the target environment's
//! identifiers. Both directions go through the cache index and share its
//! exact-match-or-fail semantics.
//!
//! The two directions disagree on failure policy on purpose: a pointer that
//! cannot be resolved on retrieve may simply not have been retrievable
//! (filtered, inaccessible folder) and only warns; a pointer that cannot be
//! resolved on deploy means the item cannot legally exist remotely, so the
//! item fails.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::core::cache::{CacheIndex, LookupError};
use crate::core::descriptor::{
    DescriptorError, TypeDescriptor, TypeRegistry, FOLDER_PATH_FIELD, FOLDER_TYPE,
    ROOT_FOLDER_PATH,
};
use crate::core::fieldpath::FieldPath;
use crate::core::item::MetadataItem;
use crate::core::reconcile::KeyRenameMap;

/// Item-scoped resolution failures
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Deploy-side failure: the referenced item does not exist (or is not
    /// unique) in the target context, so this item cannot be deployed
    #[error("unresolved dependency {dep_type}/{dep_key}")]
    Dependency {
        dep_type: String,
        dep_key: String,
        #[source]
        source: LookupError,
    },

    /// Several cached items matched one raw identifier — a data integrity
    /// problem that must surface rather than be resolved by picking one
    #[error("ambiguous reference via '{field}'")]
    Ambiguous {
        field: String,
        #[source]
        source: LookupError,
    },

    /// Structural problem with the descriptors involved; run-fatal
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

fn field_path(type_name: &str, field: &str) -> Result<FieldPath, ResolveError> {
    FieldPath::parse(field).map_err(|e| {
        ResolveError::Descriptor(DescriptorError::InvalidReference {
            type_name: type_name.to_string(),
            detail: e.to_string(),
        })
    })
}

fn bad_leaf(type_name: &str, path: &FieldPath) -> ResolveError {
    ResolveError::Descriptor(DescriptorError::InvalidReference {
        type_name: type_name.to_string(),
        detail: format!("raw field path '{path}' does not end in a field name"),
    })
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert raw identifier fields to portable `r__` reference fields
/// (retrieve direction).
///
/// `NotFound` leaves the raw identifier in place with a warning — the
/// referenced item may legitimately not be retrievable. `Ambiguous` fails
/// the item. Resolved keys are corrected through `renames` so pointers to a
/// key renamed earlier in the run land on the new key.
pub fn resolve_outbound(
    item: &mut MetadataItem,
    descriptor: &TypeDescriptor,
    registry: &TypeRegistry,
    cache: &CacheIndex,
    renames: &KeyRenameMap,
) -> Result<(), ResolveError> {
    for reference in &descriptor.references {
        let target = registry.get(&reference.target_type)?;
        let from_field = reference.target_match.as_deref().unwrap_or(&target.id_field);
        let to_field = reference.target_value.as_deref().unwrap_or(&target.key_field);
        let from = field_path(&target.name, from_field)?;
        let to = field_path(&target.name, to_field)?;
        let rename_applies = to_field == target.key_field;

        let mut failure = None;
        let visited = item.for_each_parent(&reference.raw_field, |obj, leaf| {
            if failure.is_some() {
                return;
            }
            let Some(raw) = obj.get(leaf) else { return };
            if raw.is_null() {
                return;
            }
            match cache.search_for_field(&reference.target_type, raw, &from, &to, None) {
                Ok(mut resolved) => {
                    if rename_applies {
                        if let Value::String(key) = &resolved {
                            if let Some(renamed) =
                                renames.lookup(&reference.target_type, key)
                            {
                                resolved = Value::String(renamed.to_string());
                            }
                        }
                    }
                    obj.remove(leaf);
                    obj.insert(reference.portable_field.clone(), resolved);
                }
                Err(source @ LookupError::NotFound { .. }) => {
                    warn!(
                        r#type = descriptor.name,
                        target_type = reference.target_type,
                        field = reference.raw_field.as_str(),
                        %source,
                        "reference target not in cache, keeping raw identifier"
                    );
                }
                Err(source @ LookupError::Ambiguous { .. }) => {
                    failure = Some(ResolveError::Ambiguous {
                        field: reference.raw_field.as_str().to_string(),
                        source,
                    });
                }
            }
        });
        if visited.is_none() {
            return Err(bad_leaf(&descriptor.name, &reference.raw_field));
        }
        if let Some(err) = failure {
            return Err(err);
        }
    }

    resolve_folder_outbound(item, descriptor, registry, cache)
}

fn resolve_folder_outbound(
    item: &mut MetadataItem,
    descriptor: &TypeDescriptor,
    registry: &TypeRegistry,
    cache: &CacheIndex,
) -> Result<(), ResolveError> {
    let Some(folder_field) = descriptor.folder_id_field.clone() else {
        return Ok(());
    };
    let Some(raw) = item.field(&folder_field).cloned() else {
        return Ok(());
    };
    if raw.is_null() {
        return Ok(());
    }
    let Ok(folder) = registry.get(FOLDER_TYPE) else {
        warn!(
            r#type = descriptor.name,
            "no folder type registered, keeping raw folder identifier"
        );
        return Ok(());
    };
    let from = field_path(FOLDER_TYPE, &folder.id_field)?;
    let to = field_path(FOLDER_TYPE, FOLDER_PATH_FIELD)?;
    let portable_field = descriptor.folder_ref_field();
    match cache.search_for_field(FOLDER_TYPE, &raw, &from, &to, None) {
        Ok(resolved) => {
            item.remove_field(&folder_field);
            item.set_field(portable_field, resolved);
        }
        Err(LookupError::NotFound { .. }) => {
            // Folder loss must not block the item; fall back to the root
            warn!(
                r#type = descriptor.name,
                folder_id = %raw,
                "folder not in cache, falling back to root path"
            );
            item.remove_field(&folder_field);
            item.set_field(portable_field, Value::String(ROOT_FOLDER_PATH.to_string()));
        }
        Err(source @ LookupError::Ambiguous { .. }) => {
            return Err(ResolveError::Ambiguous {
                field: folder_field,
                source,
            });
        }
    }
    Ok(())
}

/// Convert portable `r__` reference fields back to raw identifiers for the
/// target environment (deploy direction).
///
/// Any failure is fatal for the item: it is excluded from the batch and the
/// unresolved dependency is named in the error.
pub fn resolve_inbound(
    item: &mut MetadataItem,
    descriptor: &TypeDescriptor,
    registry: &TypeRegistry,
    cache: &CacheIndex,
) -> Result<(), ResolveError> {
    for reference in &descriptor.references {
        let target = registry.get(&reference.target_type)?;
        let from_field = reference.target_value.as_deref().unwrap_or(&target.key_field);
        let to_field = reference.target_match.as_deref().unwrap_or(&target.id_field);
        let from = field_path(&target.name, from_field)?;
        let to = field_path(&target.name, to_field)?;

        let mut failure = None;
        let visited = item.for_each_parent(&reference.raw_field, |obj, leaf| {
            if failure.is_some() {
                return;
            }
            let Some(portable) = obj.get(&reference.portable_field).cloned() else {
                return;
            };
            if portable.is_null() {
                obj.remove(&reference.portable_field);
                return;
            }
            match cache.search_for_field(&reference.target_type, &portable, &from, &to, None) {
                Ok(resolved) => {
                    obj.remove(&reference.portable_field);
                    obj.insert(leaf.to_string(), resolved);
                }
                Err(source) => {
                    failure = Some(ResolveError::Dependency {
                        dep_type: reference.target_type.clone(),
                        dep_key: value_key(&portable),
                        source,
                    });
                }
            }
        });
        if visited.is_none() {
            return Err(bad_leaf(&descriptor.name, &reference.raw_field));
        }
        if let Some(err) = failure {
            return Err(err);
        }
    }

    resolve_folder_inbound(item, descriptor, registry, cache)
}

fn resolve_folder_inbound(
    item: &mut MetadataItem,
    descriptor: &TypeDescriptor,
    registry: &TypeRegistry,
    cache: &CacheIndex,
) -> Result<(), ResolveError> {
    let Some(folder_field) = descriptor.folder_id_field.clone() else {
        return Ok(());
    };
    let portable_field = descriptor.folder_ref_field();
    let Some(portable) = item.field(&portable_field).cloned() else {
        return Ok(());
    };
    if portable.is_null() {
        item.remove_field(&portable_field);
        return Ok(());
    }
    let Ok(folder) = registry.get(FOLDER_TYPE) else {
        warn!(
            r#type = descriptor.name,
            "no folder type registered, dropping portable folder path"
        );
        item.remove_field(&portable_field);
        return Ok(());
    };
    let from = field_path(FOLDER_TYPE, FOLDER_PATH_FIELD)?;
    let to = field_path(FOLDER_TYPE, &folder.id_field)?;
    match cache.search_for_field(FOLDER_TYPE, &portable, &from, &to, None) {
        Ok(resolved) => {
            item.remove_field(&portable_field);
            item.set_field(folder_field, resolved);
        }
        Err(LookupError::NotFound { .. }) => {
            // Deploy without a folder rather than blocking the item; the
            // platform files it under its default location
            warn!(
                r#type = descriptor.name,
                path = %portable,
                "folder path not in target context, deploying without folder"
            );
            item.remove_field(&portable_field);
        }
        Err(source @ LookupError::Ambiguous { .. }) => {
            return Err(ResolveError::Ambiguous {
                field: portable_field,
                source,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::BusinessContext;
    use crate::core::descriptor::ReferenceSpec;
    use serde_json::json;

    fn item(value: serde_json::Value) -> MetadataItem {
        MetadataItem::from_value(value).unwrap()
    }

    fn de_descriptor() -> TypeDescriptor {
        TypeDescriptor {
            name: "dataExtension".to_string(),
            key_field: "customerKey".to_string(),
            id_field: "objectId".to_string(),
            name_field: "name".to_string(),
            folder_id_field: Some("categoryId".to_string()),
            creatable: true,
            updatable: true,
            creatable_fields: Vec::new(),
            updatable_fields: Vec::new(),
            retrievable_fields: Vec::new(),
            templatable_fields: Vec::new(),
            references: Vec::new(),
            depends_on: vec![FOLDER_TYPE.to_string()],
        }
    }

    fn folder_descriptor() -> TypeDescriptor {
        TypeDescriptor {
            name: FOLDER_TYPE.to_string(),
            key_field: "customerKey".to_string(),
            id_field: "id".to_string(),
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

    fn automation_descriptor() -> TypeDescriptor {
        TypeDescriptor {
            name: "automation".to_string(),
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
            references: vec![ReferenceSpec::new(
                "steps[].targetId",
                "dataExtension",
                "r__dataExtension_key",
            )],
            depends_on: vec!["dataExtension".to_string()],
        }
    }

    fn setup() -> (TypeRegistry, CacheIndex) {
        let mut registry = TypeRegistry::new();
        registry.register(folder_descriptor()).unwrap();
        registry.register(de_descriptor()).unwrap();
        registry.register(automation_descriptor()).unwrap();

        let mut cache = CacheIndex::new(BusinessContext::new("dev").unwrap());
        cache.set_index(
            &folder_descriptor(),
            vec![item(
                json!({"customerKey": "f-data", "id": 12, "name": "Data", "path": "/Data Extensions"}),
            )],
        );
        cache.set_index(
            &de_descriptor(),
            vec![
                item(json!({"customerKey": "DE1", "objectId": "obj-1", "name": "Orders"})),
                item(json!({"customerKey": "DE2", "objectId": "obj-2", "name": "Customers"})),
            ],
        );
        (registry, cache)
    }

    #[test]
    fn test_outbound_swaps_raw_for_portable() {
        let (registry, cache) = setup();
        let renames = KeyRenameMap::default();
        let mut automation = item(json!({
            "customerKey": "A1",
            "steps": [{"targetId": "obj-1"}, {"targetId": "obj-2"}]
        }));
        resolve_outbound(
            &mut automation,
            &automation_descriptor(),
            &registry,
            &cache,
            &renames,
        )
        .unwrap();

        let keys = automation.values_at(&FieldPath::parse("steps[].r__dataExtension_key").unwrap());
        assert_eq!(keys, vec![&json!("DE1"), &json!("DE2")]);
        assert!(automation
            .values_at(&FieldPath::parse("steps[].targetId").unwrap())
            .is_empty());
    }

    #[test]
    fn test_outbound_not_found_warns_and_keeps_raw() {
        let (registry, cache) = setup();
        let renames = KeyRenameMap::default();
        let mut automation = item(json!({
            "customerKey": "A1",
            "steps": [{"targetId": "obj-unknown"}]
        }));
        resolve_outbound(
            &mut automation,
            &automation_descriptor(),
            &registry,
            &cache,
            &renames,
        )
        .unwrap();

        // Unresolved: raw identifier kept, no portable field written
        assert_eq!(
            automation.values_at(&FieldPath::parse("steps[].targetId").unwrap()),
            vec![&json!("obj-unknown")]
        );
        assert!(automation
            .values_at(&FieldPath::parse("steps[].r__dataExtension_key").unwrap())
            .is_empty());
    }

    #[test]
    fn test_outbound_ambiguous_fails_item() {
        let (registry, mut cache) = setup();
        cache.set_index(
            &de_descriptor(),
            vec![
                item(json!({"customerKey": "DE1", "objectId": "obj-1"})),
                item(json!({"customerKey": "DE1b", "objectId": "obj-1"})),
            ],
        );
        let renames = KeyRenameMap::default();
        let mut automation = item(json!({"customerKey": "A1", "steps": [{"targetId": "obj-1"}]}));
        let err = resolve_outbound(
            &mut automation,
            &automation_descriptor(),
            &registry,
            &cache,
            &renames,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { .. }));
    }

    #[test]
    fn test_outbound_applies_rename_map() {
        let (registry, cache) = setup();
        let mut renames = KeyRenameMap::default();
        renames.record("dataExtension", "DE1", "DE1_v2");
        let mut automation = item(json!({"customerKey": "A1", "steps": [{"targetId": "obj-1"}]}));
        resolve_outbound(
            &mut automation,
            &automation_descriptor(),
            &registry,
            &cache,
            &renames,
        )
        .unwrap();
        assert_eq!(
            automation.values_at(&FieldPath::parse("steps[].r__dataExtension_key").unwrap()),
            vec![&json!("DE1_v2")]
        );
    }

    #[test]
    fn test_inbound_swaps_portable_for_raw() {
        let (registry, cache) = setup();
        let mut automation = item(json!({
            "customerKey": "A1",
            "steps": [{"r__dataExtension_key": "DE1"}]
        }));
        resolve_inbound(&mut automation, &automation_descriptor(), &registry, &cache).unwrap();
        assert_eq!(
            automation.values_at(&FieldPath::parse("steps[].targetId").unwrap()),
            vec![&json!("obj-1")]
        );
        assert!(automation
            .values_at(&FieldPath::parse("steps[].r__dataExtension_key").unwrap())
            .is_empty());
    }

    #[test]
    fn test_inbound_missing_dependency_is_fatal_and_named() {
        let (registry, cache) = setup();
        let mut automation = item(json!({
            "customerKey": "A1",
            "steps": [{"r__dataExtension_key": "DE9"}]
        }));
        let err = resolve_inbound(&mut automation, &automation_descriptor(), &registry, &cache)
            .unwrap_err();
        match err {
            ResolveError::Dependency {
                dep_type, dep_key, ..
            } => {
                assert_eq!(dep_type, "dataExtension");
                assert_eq!(dep_key, "DE9");
            }
            other => panic!("expected dependency error, got {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_reproduces_raw_identifier() {
        let (registry, cache) = setup();
        let renames = KeyRenameMap::default();
        let original = item(json!({"customerKey": "A1", "steps": [{"targetId": "obj-2"}]}));
        let mut converted = original.clone();
        resolve_outbound(
            &mut converted,
            &automation_descriptor(),
            &registry,
            &cache,
            &renames,
        )
        .unwrap();
        resolve_inbound(&mut converted, &automation_descriptor(), &registry, &cache).unwrap();
        assert_eq!(converted, original);
    }

    #[test]
    fn test_folder_outbound_resolves_path() {
        let (registry, cache) = setup();
        let renames = KeyRenameMap::default();
        let mut de = item(json!({"customerKey": "DE1", "categoryId": 12}));
        resolve_outbound(&mut de, &de_descriptor(), &registry, &cache, &renames).unwrap();
        assert_eq!(de.field("r__folder_path"), Some(&json!("/Data Extensions")));
        assert!(de.field("categoryId").is_none());
    }

    #[test]
    fn test_folder_outbound_missing_falls_back_to_root() {
        let (registry, cache) = setup();
        let renames = KeyRenameMap::default();
        let mut de = item(json!({"customerKey": "DE1", "categoryId": 999}));
        resolve_outbound(&mut de, &de_descriptor(), &registry, &cache, &renames).unwrap();
        assert_eq!(de.field("r__folder_path"), Some(&json!(ROOT_FOLDER_PATH)));
    }

    #[test]
    fn test_folder_inbound_missing_path_omits_folder() {
        let (registry, cache) = setup();
        let mut de = item(json!({"customerKey": "DE1", "r__folder_path": "/Nope"}));
        resolve_inbound(&mut de, &de_descriptor(), &registry, &cache).unwrap();
        assert!(de.field("r__folder_path").is_none());
        assert!(de.field("categoryId").is_none());
    }

    #[test]
    fn test_folder_round_trip() {
        let (registry, cache) = setup();
        let renames = KeyRenameMap::default();
        let original = item(json!({"customerKey": "DE1", "categoryId": 12}));
        let mut converted = original.clone();
        resolve_outbound(&mut converted, &de_descriptor(), &registry, &cache, &renames).unwrap();
        resolve_inbound(&mut converted, &de_descriptor(), &registry, &cache).unwrap();
        assert_eq!(converted, original);
    }
}
