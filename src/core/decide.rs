//! Upsert decision engine
//!
//! Given one local item and the cache of the target context, decide whether
//! deploying it means create, update, or nothing. Key identity always wins;
//! name matching is an opt-in fallback for adopting pre-existing
//! environments and never silently merges across folders.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::core::cache::CacheIndex;
use crate::core::descriptor::TypeDescriptor;
use crate::core::fieldpath::FieldPath;
use crate::core::item::MetadataItem;

/// Run-mode flags consumed by [`decide`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DecideOptions {
    /// Fall back to matching remote items by name when the key is absent
    pub match_by_name: bool,
    /// Accept a name match in a different folder (with a warning) instead
    /// of failing
    pub ignore_folder: bool,
}

/// Outcome of the decision procedure
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Create,
    Update { matched: MetadataItem },
    Skip { reason: String },
}

/// Item-scoped decision failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecideError {
    #[error("local {type_name} item carries no value for key field '{key_field}'")]
    MissingKey {
        type_name: String,
        key_field: String,
    },

    #[error("{count} {type_name} items are named '{name}'; refusing to guess")]
    NameCollision {
        type_name: String,
        name: String,
        count: usize,
    },

    #[error(
        "{type_name} '{name}' matched by name but lives in a different folder \
         (local {local_folder}, remote {remote_folder}); pass --ignore-folder to proceed"
    )]
    FolderMismatch {
        type_name: String,
        name: String,
        local_folder: String,
        remote_folder: String,
    },
}

fn folder_of<'a>(item: &'a MetadataItem, descriptor: &TypeDescriptor) -> Option<&'a Value> {
    descriptor
        .folder_id_field
        .as_deref()
        .and_then(|field| item.field(field))
        .filter(|v| !v.is_null())
}

fn display_folder(folder: Option<&Value>) -> String {
    folder.map_or_else(|| "<none>".to_string(), Value::to_string)
}

/// Decide create/update/skip for one item against a populated cache.
///
/// Deterministic for a fixed cache and item: a key hit always yields the
/// same update regardless of `match_by_name`.
pub fn decide(
    item: &MetadataItem,
    descriptor: &TypeDescriptor,
    cache: &CacheIndex,
    options: DecideOptions,
) -> Result<Decision, DecideError> {
    let key = item
        .field_str(&descriptor.key_field)
        .ok_or_else(|| DecideError::MissingKey {
            type_name: descriptor.name.clone(),
            key_field: descriptor.key_field.clone(),
        })?;

    // 1. Strict key identity
    if let Some(matched) = cache.get_by_key(&descriptor.name, key) {
        return Ok(guard_update(descriptor, matched.clone()));
    }

    // 2. Soft name identity, opt-in
    if options.match_by_name {
        if let Some(name) = item.field(&descriptor.name_field).filter(|v| !v.is_null()) {
            let name_path = FieldPath::parse(&descriptor.name_field).expect("validated field name");
            let candidates = cache.find_by_field(&descriptor.name, &name_path, name, None);
            match candidates.as_slice() {
                [] => {}
                [candidate] => {
                    let local_folder = folder_of(item, descriptor);
                    let remote_folder = folder_of(&candidate.item, descriptor);
                    if local_folder != remote_folder {
                        if !options.ignore_folder {
                            return Err(DecideError::FolderMismatch {
                                type_name: descriptor.name.clone(),
                                name: name.as_str().unwrap_or_default().to_string(),
                                local_folder: display_folder(local_folder),
                                remote_folder: display_folder(remote_folder),
                            });
                        }
                        warn!(
                            r#type = descriptor.name,
                            key,
                            "name match in a different folder accepted (--ignore-folder)"
                        );
                    }
                    return Ok(guard_update(descriptor, candidate.item.clone()));
                }
                many => {
                    return Err(DecideError::NameCollision {
                        type_name: descriptor.name.clone(),
                        name: name.as_str().unwrap_or_default().to_string(),
                        count: many.len(),
                    });
                }
            }
        }
    }

    // 3. Nothing matched
    Ok(guard_create(descriptor))
}

fn guard_update(descriptor: &TypeDescriptor, matched: MetadataItem) -> Decision {
    if descriptor.updatable {
        Decision::Update { matched }
    } else {
        Decision::Skip {
            reason: format!("{} does not support update", descriptor.name),
        }
    }
}

fn guard_create(descriptor: &TypeDescriptor) -> Decision {
    if descriptor.creatable {
        Decision::Create
    } else {
        Decision::Skip {
            reason: format!("{} does not support create", descriptor.name),
        }
    }
}
