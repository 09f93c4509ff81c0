//! Send definition type descriptor
//!
//! A send definition ties an email asset to a sendable data extension
//! audience, so it carries two cross-type references.

use crate::core::descriptor::{ReferenceSpec, TypeDescriptor, FOLDER_TYPE};

pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor {
        name: "emailSend".to_string(),
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
            "emailId".to_string(),
            "sendableDataExtensionId".to_string(),
            "senderProfile".to_string(),
            "categoryId".to_string(),
        ],
        updatable_fields: vec![
            "customerKey".to_string(),
            "name".to_string(),
            "description".to_string(),
            "emailId".to_string(),
            "sendableDataExtensionId".to_string(),
            "senderProfile".to_string(),
            "categoryId".to_string(),
        ],
        retrievable_fields: vec![
            "customerKey".to_string(),
            "objectId".to_string(),
            "name".to_string(),
            "description".to_string(),
            "emailId".to_string(),
            "sendableDataExtensionId".to_string(),
            "senderProfile".to_string(),
            "categoryId".to_string(),
        ],
        templatable_fields: vec!["name".to_string(), "description".to_string()],
        references: vec![
            ReferenceSpec::new("emailId", "email", "r__email_key"),
            ReferenceSpec::new(
                "sendableDataExtensionId",
                "dataExtension",
                "r__dataExtension_key",
            ),
        ],
        depends_on: vec![
            "email".to_string(),
            "dataExtension".to_string(),
            FOLDER_TYPE.to_string(),
        ],
    }
}
