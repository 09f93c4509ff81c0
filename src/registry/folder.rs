//! Folder type descriptor
//!
//! Folders are the one type other types point at by path rather than by
//! key: the retrieve adapter precomputes the slash-delimited `path` field,
//! and folder references resolve id ↔ path.

use crate::core::descriptor::{TypeDescriptor, FOLDER_TYPE};

pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor {
        name: FOLDER_TYPE.to_string(),
        key_field: "customerKey".to_string(),
        id_field: "id".to_string(),
        name_field: "name".to_string(),
        folder_id_field: None,
        creatable: true,
        updatable: true,
        creatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "parentId".to_string(),
            "path".to_string(),
            "contentType".to_string(),
        ],
        updatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "path".to_string(),
        ],
        retrievable_fields: vec![
            "customerKey".to_string(),
            "id".to_string(),
            "name".to_string(),
            "parentId".to_string(),
            "path".to_string(),
            "contentType".to_string(),
        ],
        templatable_fields: vec!["name".to_string()],
        references: Vec::new(),
        depends_on: Vec::new(),
    }
}
