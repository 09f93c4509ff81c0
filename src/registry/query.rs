//! Query activity type descriptor
//!
//! A query writes into a target data extension; the target pointer is the
//! reference every deploy depends on.

use crate::core::descriptor::{ReferenceSpec, TypeDescriptor, FOLDER_TYPE};

pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor {
        name: "query".to_string(),
        key_field: "customerKey".to_string(),
        id_field: "queryDefinitionId".to_string(),
        name_field: "name".to_string(),
        folder_id_field: Some("categoryId".to_string()),
        creatable: true,
        updatable: true,
        creatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "description".to_string(),
            "queryText".to_string(),
            "targetId".to_string(),
            "targetUpdateType".to_string(),
            "categoryId".to_string(),
        ],
        updatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "description".to_string(),
            "queryText".to_string(),
            "targetId".to_string(),
            "targetUpdateType".to_string(),
            "categoryId".to_string(),
        ],
        retrievable_fields: vec![
            "customerKey".to_string(),
            "queryDefinitionId".to_string(),
            "name".to_string(),
            "description".to_string(),
            "queryText".to_string(),
            "targetId".to_string(),
            "targetUpdateType".to_string(),
            "categoryId".to_string(),
        ],
        templatable_fields: vec!["name".to_string(), "queryText".to_string()],
        references: vec![ReferenceSpec::new(
            "targetId",
            "dataExtension",
            "r__dataExtension_key",
        )],
        depends_on: vec!["dataExtension".to_string(), FOLDER_TYPE.to_string()],
    }
}
