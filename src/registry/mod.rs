//! Built-in entity type descriptors
//!
//! One module per entity type, each exposing its schema descriptor. The
//! dependency graph declared here is what lets the pipeline order cache
//! population: folders first, then data extensions, then everything that
//! points at them.

pub mod automation;
pub mod data_extension;
pub mod email;
pub mod email_send;
pub mod folder;
pub mod query;

use crate::core::descriptor::{DescriptorError, TypeRegistry};

/// Registry of all built-in types
pub fn builtin() -> Result<TypeRegistry, DescriptorError> {
    let mut registry = TypeRegistry::new();
    registry.register(folder::descriptor())?;
    registry.register(data_extension::descriptor())?;
    registry.register(email::descriptor())?;
    registry.register(query::descriptor())?;
    registry.register(email_send::descriptor())?;
    registry.register(automation::descriptor())?;
    Ok(registry)
}
