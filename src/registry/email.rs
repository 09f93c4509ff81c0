//! Email asset type descriptor
//!
//! Legacy email assets can be retrieved and referenced but not authored
//! through this tool, so every deploy decision for them degrades to a skip.

use crate::core::descriptor::{TypeDescriptor, FOLDER_TYPE};

pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor {
        name: "email".to_string(),
        key_field: "customerKey".to_string(),
        id_field: "id".to_string(),
        name_field: "name".to_string(),
        folder_id_field: Some("categoryId".to_string()),
        creatable: false,
        updatable: false,
        creatable_fields: Vec::new(),
        updatable_fields: Vec::new(),
        retrievable_fields: vec![
            "customerKey".to_string(),
            "id".to_string(),
            "name".to_string(),
            "subject".to_string(),
            "categoryId".to_string(),
        ],
        templatable_fields: Vec::new(),
        references: Vec::new(),
        depends_on: vec![FOLDER_TYPE.to_string()],
    }
}
