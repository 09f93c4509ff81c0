//! Automation type descriptor
//!
//! Automations are the most reference-heavy type: every step activity may
//! point at a query or a target data extension, which is why the reference
//! paths fan out over two array levels.

use crate::core::descriptor::{ReferenceSpec, TypeDescriptor, FOLDER_TYPE};

pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor {
        name: "automation".to_string(),
        key_field: "customerKey".to_string(),
        id_field: "objectId".to_string(),
        name_field: "name".to_string(),
        folder_id_field: Some("categoryId".to_string()),
        creatable: true,
        updatable: true,
        creatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "description".to_string(),
            "steps".to_string(),
            "schedule".to_string(),
            "categoryId".to_string(),
        ],
        updatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "description".to_string(),
            "steps".to_string(),
            "schedule".to_string(),
            "categoryId".to_string(),
        ],
        retrievable_fields: vec![
            "customerKey".to_string(),
            "objectId".to_string(),
            "name".to_string(),
            "description".to_string(),
            "steps".to_string(),
            "schedule".to_string(),
            "status".to_string(),
            "categoryId".to_string(),
        ],
        templatable_fields: vec!["name".to_string(), "description".to_string()],
        references: vec![
            ReferenceSpec::new("steps[].activities[].queryId", "query", "r__query_key"),
            ReferenceSpec::new(
                "steps[].activities[].targetId",
                "dataExtension",
                "r__dataExtension_key",
            ),
        ],
        depends_on: vec![
            "query".to_string(),
            "dataExtension".to_string(),
            FOLDER_TYPE.to_string(),
        ],
    }
}
