//! Business context identity
//!
//! A business context names one remote environment/tenant/sub-unit. Cache
//! contents, retrieved files, and deploy targets are always scoped to one
//! context; nothing crosses contexts implicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier for a remote environment/tenant/sub-unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessContext(String);

impl BusinessContext {
    pub fn new(id: impl Into<String>) -> Result<Self, ContextParseError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ContextParseError::Empty);
        }
        if id.contains('/') || id.contains(char::is_whitespace) {
            return Err(ContextParseError::InvalidCharacter(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusinessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BusinessContext {
    type Err = ContextParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Errors that can occur when parsing a business context id
#[derive(Debug, Error)]
pub enum ContextParseError {
    #[error("empty business context id")]
    Empty,

    #[error("business context id '{0}' contains '/' or whitespace")]
    InvalidCharacter(String),
}
