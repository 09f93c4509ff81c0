//! Metadata item model
//!
//! A [`MetadataItem`] is a schemaless field map: whatever the remote
//! platform returned for one entity, or whatever a local file declares.
//! Which fields mean what (key, id, name, folder) is decided by the
//! [`TypeDescriptor`](crate::core::descriptor::TypeDescriptor), not here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::fieldpath::{FieldPath, Segment};

/// Prefix marking a portable reference field, e.g. `r__dataExtension_key`
pub const REF_PREFIX: &str = "r__";

/// One metadata entity as a mapping from field name to value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataItem(Map<String, Value>);

impl MetadataItem {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON object
    pub fn from_object(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build from a JSON value; non-objects yield None
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Get a top-level field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Get a top-level field as a string slice
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Set a top-level field
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Remove a top-level field
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// All values reachable at a path (fans out over `[]` segments)
    pub fn values_at<'a>(&'a self, path: &FieldPath) -> Vec<&'a Value> {
        path_collect(&self.0, path)
    }

    /// The single value at a path, if exactly one exists
    pub fn value_at<'a>(&'a self, path: &FieldPath) -> Option<&'a Value> {
        let found = self.values_at(path);
        match found.as_slice() {
            [one] => Some(one),
            _ => None,
        }
    }

    /// Visit every object that contains the final field of `path`, i.e.
    /// every parent object the path's prefix reaches. The leaf field may or
    /// may not be present on a visited object.
    ///
    /// This is the mutation primitive for reference resolution: a transform
    /// reads one field of the visited object and swaps it for another.
    pub fn for_each_parent<F>(&mut self, path: &FieldPath, mut visit: F) -> Option<()>
    where
        F: FnMut(&mut Map<String, Value>, &str),
    {
        let (prefix, leaf) = path.parent_and_leaf()?;
        visit_parents(&mut self.0, prefix, leaf, &mut visit);
        Some(())
    }
}

fn path_collect<'a>(fields: &'a Map<String, Value>, path: &FieldPath) -> Vec<&'a Value> {
    let Some((Segment::Field(first), rest)) = path.segments().split_first() else {
        return Vec::new();
    };
    let Some(child) = fields.get(first.as_str()) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    collect_rest(child, rest, &mut out);
    out
}

fn collect_rest<'a>(value: &'a Value, segments: &[Segment], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match head {
        Segment::Field(name) => {
            if let Some(child) = value.as_object().and_then(|o| o.get(name.as_str())) {
                collect_rest(child, rest, out);
            }
        }
        Segment::Each => {
            if let Some(elements) = value.as_array() {
                for element in elements {
                    collect_rest(element, rest, out);
                }
            }
        }
    }
}

fn visit_parents<F>(fields: &mut Map<String, Value>, prefix: &[Segment], leaf: &str, visit: &mut F)
where
    F: FnMut(&mut Map<String, Value>, &str),
{
    let Some((head, rest)) = prefix.split_first() else {
        visit(fields, leaf);
        return;
    };
    match head {
        Segment::Field(name) => {
            if let Some(child) = fields.get_mut(name.as_str()) {
                visit_value_parents(child, rest, leaf, visit);
            }
        }
        // A path cannot start with `[]` (the root is an object)
        Segment::Each => {}
    }
}

fn visit_value_parents<F>(value: &mut Value, prefix: &[Segment], leaf: &str, visit: &mut F)
where
    F: FnMut(&mut Map<String, Value>, &str),
{
    let Some((head, rest)) = prefix.split_first() else {
        if let Value::Object(obj) = value {
            visit(obj, leaf);
        }
        return;
    };
    match head {
        Segment::Field(name) => {
            if let Some(child) = value.as_object_mut().and_then(|o| o.get_mut(name.as_str())) {
                visit_value_parents(child, rest, leaf, visit);
            }
        }
        Segment::Each => {
            if let Some(elements) = value.as_array_mut() {
                for element in elements {
                    visit_value_parents(element, rest, leaf, visit);
                }
            }
        }
    }
}

/// Canonical encoding of a scalar value for exact-match indexing.
///
/// Strings, numbers, and booleans encode as their JSON text, so the string
/// `"1"` (`"\"1\""`) never collides with the number `1` (`"1"`). Objects,
/// arrays and null are not indexable and yield None.
pub fn canonical_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            serde_json::to_string(value).ok()
        }
        _ => None,
    }
}
