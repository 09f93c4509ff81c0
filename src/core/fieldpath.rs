//! Parsed field paths for dynamic item access
//!
//! Paths use dot notation for nested objects and a trailing `[]` on a
//! segment to mean "for each element of this array", e.g.
//! `steps[].activities[].targetId`. Parsing happens once; resolution is a
//! pure walk over a value tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Descend into an object field
    Field(String),
    /// Iterate every element of an array
    Each,
}

/// A parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
    raw: String,
}

impl FieldPath {
    /// Parse a path string
    pub fn parse(s: &str) -> Result<Self, PathParseError> {
        s.parse()
    }

    /// The original path string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Split into the prefix leading to the containing object(s) and the
    /// final field name.
    ///
    /// Returns None if the path ends in `[]` (no leaf field to address).
    pub fn parent_and_leaf(&self) -> Option<(&[Segment], &str)> {
        match self.segments.split_last() {
            Some((Segment::Field(leaf), prefix)) => Some((prefix, leaf)),
            _ => None,
        }
    }

    /// Collect references to every value reachable at this path.
    ///
    /// A plain path yields zero or one value; each `[]` segment fans out
    /// over array elements. Values missing a path segment are simply not
    /// yielded.
    pub fn collect<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut out = Vec::new();
        collect_into(root, &self.segments, &mut out);
        out
    }

    /// The single value at this path, if exactly one exists.
    pub fn single<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let found = self.collect(root);
        match found.as_slice() {
            [one] => Some(one),
            _ => None,
        }
    }
}

fn collect_into<'a>(value: &'a Value, segments: &[Segment], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match head {
        Segment::Field(name) => {
            if let Some(child) = value.as_object().and_then(|o| o.get(name.as_str())) {
                collect_into(child, rest, out);
            }
        }
        Segment::Each => {
            if let Some(elements) = value.as_array() {
                for element in elements {
                    collect_into(element, rest, out);
                }
            }
        }
    }
}

impl FromStr for FieldPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathParseError::Empty);
        }
        let mut segments = Vec::new();
        for part in s.split('.') {
            let (name, each) = match part.strip_suffix("[]") {
                Some(name) => (name, true),
                None => (part, false),
            };
            if name.is_empty() || name.contains('[') || name.contains(']') {
                return Err(PathParseError::InvalidSegment {
                    path: s.to_string(),
                    segment: part.to_string(),
                });
            }
            segments.push(Segment::Field(name.to_string()));
            if each {
                segments.push(Segment::Each);
            }
        }
        Ok(Self {
            segments,
            raw: s.to_string(),
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Serialize for FieldPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing field paths
#[derive(Debug, Error)]
pub enum PathParseError {
    #[error("empty field path")]
    Empty,

    #[error("invalid segment '{segment}' in field path '{path}'")]
    InvalidSegment { path: String, segment: String },
}
