//! Entity type descriptors and the type registry
//!
//! A [`TypeDescriptor`] is the schema surface of one entity type: which
//! fields carry the portable key, the environment-local id, the display
//! name and the folder pointer; which fields survive create/update/retrieve;
//! which fields are references to other types; and which types must be
//! cached before this one.
//!
//! Descriptor problems are the only run-fatal error class — everything else
//! in the engine is item-scoped.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::core::fieldpath::FieldPath;
use crate::core::item::REF_PREFIX;

/// The entity type that holds folder items
pub const FOLDER_TYPE: &str = "folder";

/// Field on folder items carrying the slash-delimited path
pub const FOLDER_PATH_FIELD: &str = "path";

/// Fallback folder path used when a folder id cannot be resolved
pub const ROOT_FOLDER_PATH: &str = "/";

/// A declared pointer from one entity type to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Path to the raw identifier field in the wire representation
    pub raw_field: FieldPath,
    /// Entity type the raw identifier points at
    pub target_type: String,
    /// Field name written next to the raw field in the portable
    /// representation; must carry the `r__` prefix
    pub portable_field: String,
    /// Field on the target matched by the raw value (defaults to the
    /// target's id field)
    #[serde(default)]
    pub target_match: Option<String>,
    /// Field on the target written into the portable field (defaults to
    /// the target's key field)
    #[serde(default)]
    pub target_value: Option<String>,
}

impl ReferenceSpec {
    pub fn new(raw_field: &str, target_type: &str, portable_field: &str) -> Self {
        Self {
            raw_field: FieldPath::parse(raw_field).expect("static reference path"),
            target_type: target_type.to_string(),
            portable_field: portable_field.to_string(),
            target_match: None,
            target_value: None,
        }
    }
}

/// Schema descriptor for one entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    /// Stable, human-assigned, cross-environment-portable key field
    pub key_field: String,
    /// Environment-specific identifier field (numeric or GUID)
    pub id_field: String,
    /// Display name field (uniqueness on some platforms is name+folder)
    pub name_field: String,
    /// Folder pointer field, if the type is foldered
    #[serde(default)]
    pub folder_id_field: Option<String>,
    /// Whether the platform supports creating this type
    pub creatable: bool,
    /// Whether the platform supports updating this type
    pub updatable: bool,
    /// Fields accepted on create (empty = all)
    #[serde(default)]
    pub creatable_fields: Vec<String>,
    /// Fields accepted on update (empty = all)
    #[serde(default)]
    pub updatable_fields: Vec<String>,
    /// Fields returned on retrieve (documentation surface)
    #[serde(default)]
    pub retrievable_fields: Vec<String>,
    /// Fields subject to variable substitution by templating tools
    #[serde(default)]
    pub templatable_fields: Vec<String>,
    /// Declared pointers to other entity types
    #[serde(default)]
    pub references: Vec<ReferenceSpec>,
    /// Types that must be cached before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TypeDescriptor {
    /// Portable field name for the folder pointer
    pub fn folder_ref_field(&self) -> String {
        format!("{REF_PREFIX}{FOLDER_TYPE}_{FOLDER_PATH_FIELD}")
    }

    /// Structural validation; violations are run-fatal
    pub fn validate(&self) -> Result<(), DescriptorError> {
        for (what, value) in [
            ("name", &self.name),
            ("key_field", &self.key_field),
            ("id_field", &self.id_field),
            ("name_field", &self.name_field),
        ] {
            if value.is_empty() {
                return Err(DescriptorError::MissingField {
                    type_name: self.name.clone(),
                    field: what.to_string(),
                });
            }
        }
        for reference in &self.references {
            if reference.raw_field.parent_and_leaf().is_none() {
                return Err(DescriptorError::InvalidReference {
                    type_name: self.name.clone(),
                    detail: format!(
                        "raw field path '{}' does not end in a field name",
                        reference.raw_field
                    ),
                });
            }
            if !reference.portable_field.starts_with(REF_PREFIX) {
                return Err(DescriptorError::InvalidReference {
                    type_name: self.name.clone(),
                    detail: format!(
                        "portable field '{}' is missing the '{REF_PREFIX}' prefix",
                        reference.portable_field
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Registry of known entity types
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
    by_name: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, validating it and its dependency names
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), DescriptorError> {
        descriptor.validate()?;
        if self.by_name.contains_key(&descriptor.name) {
            return Err(DescriptorError::Duplicate {
                type_name: descriptor.name,
            });
        }
        self.by_name
            .insert(descriptor.name.clone(), self.types.len());
        self.types.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&TypeDescriptor, DescriptorError> {
        self.by_name
            .get(name)
            .map(|&i| &self.types[i])
            .ok_or_else(|| DescriptorError::UnknownType {
                type_name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All registered type names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|d| d.name.as_str())
    }

    /// Check that a caller-supplied ordering respects `depends_on`: every
    /// dependency that is itself part of the list must appear earlier.
    /// Dependencies absent from the list are allowed (their references will
    /// simply not resolve) and are logged by the pipeline.
    pub fn validate_order(&self, ordered: &[&str]) -> Result<(), DescriptorError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let requested: HashSet<&str> = ordered.iter().copied().collect();
        for &name in ordered {
            let descriptor = self.get(name)?;
            for dep in &descriptor.depends_on {
                if requested.contains(dep.as_str()) && !seen.contains(dep.as_str()) {
                    return Err(DescriptorError::OutOfOrder {
                        type_name: name.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
            seen.insert(name);
        }
        Ok(())
    }

    /// Compute a dependency-respecting ordering of the requested types
    /// (leaves first). Dependencies of requested types are pulled in even
    /// when not explicitly requested.
    pub fn dependency_order(&self, requested: &[&str]) -> Result<Vec<String>, DescriptorError> {
        let mut ordered = Vec::new();
        let mut done: HashSet<String> = HashSet::new();
        let mut in_progress: HashSet<String> = HashSet::new();
        for &name in requested {
            self.visit(name, &mut done, &mut in_progress, &mut ordered)?;
        }
        Ok(ordered)
    }

    fn visit(
        &self,
        name: &str,
        done: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        ordered: &mut Vec<String>,
    ) -> Result<(), DescriptorError> {
        if done.contains(name) {
            return Ok(());
        }
        if !in_progress.insert(name.to_string()) {
            return Err(DescriptorError::DependencyCycle {
                type_name: name.to_string(),
            });
        }
        let descriptor = self.get(name)?;
        for dep in &descriptor.depends_on {
            // Self-references are legal (an automation may point at another
            // automation); they do not impose an ordering on themselves.
            if dep != name {
                self.visit(dep, done, in_progress, ordered)?;
            }
        }
        in_progress.remove(name);
        done.insert(name.to_string());
        ordered.push(name.to_string());
        Ok(())
    }
}

/// Structural misconfiguration — the only run-fatal error class
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("type descriptor '{type_name}' is missing required field '{field}'")]
    MissingField { type_name: String, field: String },

    #[error("type descriptor '{type_name}' has an invalid reference: {detail}")]
    InvalidReference { type_name: String, detail: String },

    #[error("type '{type_name}' is registered twice")]
    Duplicate { type_name: String },

    #[error("unknown entity type '{type_name}'")]
    UnknownType { type_name: String },

    #[error("type '{type_name}' was supplied before its dependency '{dependency}'")]
    OutOfOrder {
        type_name: String,
        dependency: String,
    },

    #[error("dependency cycle involving type '{type_name}'")]
    DependencyCycle { type_name: String },
}
