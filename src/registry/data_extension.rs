//! Data extension type descriptor

use crate::core::descriptor::{TypeDescriptor, FOLDER_TYPE};

pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor {
        name: "dataExtension".to_string(),
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
            "fields".to_string(),
            "isSendable".to_string(),
            "categoryId".to_string(),
        ],
        updatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "description".to_string(),
            "fields".to_string(),
            "categoryId".to_string(),
        ],
        retrievable_fields: vec![
            "customerKey".to_string(),
            "objectId".to_string(),
            "name".to_string(),
            "description".to_string(),
            "fields".to_string(),
            "isSendable".to_string(),
            "categoryId".to_string(),
            "rowCount".to_string(),
        ],
        templatable_fields: vec!["name".to_string(), "description".to_string()],
        references: Vec::new(),
        depends_on: vec![FOLDER_TYPE.to_string()],
    }
}
