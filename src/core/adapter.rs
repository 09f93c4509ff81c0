//! Remote CRUD adapter interface
//!
//! One adapter per entity type knows how to talk to the remote platform for
//! that type. The engine only ever calls an adapter through the batch
//! executor, with items that already passed inbound reference resolution
//! and the upsert decision.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::core::context::BusinessContext;
use crate::core::descriptor::TypeDescriptor;
use crate::core::item::MetadataItem;

/// Per-entity-type remote operations
#[async_trait]
pub trait CrudAdapter: Send + Sync {
    /// Schema descriptor for the type this adapter serves
    fn descriptor(&self) -> &TypeDescriptor;

    /// Fetch all items of this type in the wire representation
    async fn fetch_all(&self, context: &BusinessContext)
        -> Result<Vec<MetadataItem>, RemoteError>;

    /// Create an item remotely; the response is the wire item including the
    /// platform-assigned id
    async fn create_remote(
        &self,
        context: &BusinessContext,
        item: &MetadataItem,
    ) -> Result<MetadataItem, RemoteError>;

    /// Update an existing item; the payload carries the environment id
    async fn update_remote(
        &self,
        context: &BusinessContext,
        item: &MetadataItem,
    ) -> Result<MetadataItem, RemoteError>;
}

/// How a remote failure should be treated by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Connection dropped mid-flight
    ConnectionReset,
    /// Response aborted or unparseable
    AbortedResponse,
    /// The collaborator-level timeout fired
    Timeout,
    /// The platform rejected the operation (validation, permissions, ...)
    Operation,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::ConnectionReset => "connection reset",
            RemoteErrorKind::AbortedResponse => "aborted response",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Operation => "operation failed",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error reported by a CRUD adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A platform-side rejection; never retried
    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Operation, message)
    }

    /// Whether the executor may retry this failure once
    pub fn is_transient(&self) -> bool {
        !matches!(self.kind, RemoteErrorKind::Operation)
    }
}
