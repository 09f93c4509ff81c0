//! In-memory metadata cache with field-path lookup
//!
//! One [`CacheIndex`] holds every cached item of every entity type for a
//! single business context. It is populated once per type per run, read by
//! reference resolution and upsert decisions, and torn down with the run —
//! it is never persisted.
//!
//! Lookups are exact-match-or-fail: a search either finds exactly one item
//! or reports *why* it could not (zero candidates vs. several), so every
//! caller sees the same auditable failure mode instead of ad hoc linear
//! scans that silently pick the first hit.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::context::BusinessContext;
use crate::core::descriptor::TypeDescriptor;
use crate::core::fieldpath::FieldPath;
use crate::core::item::{canonical_scalar, MetadataItem};

/// A cached item together with the context it came from
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub item: MetadataItem,
    /// Context that contributed this entry; equals the index's own context
    /// for locally retrieved items
    pub origin: BusinessContext,
}

/// Secondary index: canonical scalar encoding → keys of matching items
type SecondaryIndex = HashMap<String, Vec<String>>;

#[derive(Debug, Default)]
struct TypeCache {
    by_key: HashMap<String, CachedEntry>,
    /// Insertion order of keys, for deterministic iteration
    order: Vec<String>,
    /// On-demand secondary indexes, one per field path searched so far
    secondary: RefCell<HashMap<String, SecondaryIndex>>,
}

impl TypeCache {
    fn invalidate_secondary(&mut self) {
        self.secondary.borrow_mut().clear();
    }

    /// Keys of items whose value at `path` equals `value`, in insertion
    /// order. Builds and memoizes the secondary index on first use.
    fn matching_keys(&self, path: &FieldPath, value: &Value) -> Vec<String> {
        let Some(wanted) = canonical_scalar(value) else {
            return Vec::new();
        };
        let mut indexes = self.secondary.borrow_mut();
        let index = indexes.entry(path.as_str().to_string()).or_insert_with(|| {
            let mut built: SecondaryIndex = HashMap::new();
            for key in &self.order {
                let entry = &self.by_key[key];
                for found in entry.item.values_at(path) {
                    if let Some(canon) = canonical_scalar(found) {
                        let keys = built.entry(canon).or_default();
                        if !keys.contains(key) {
                            keys.push(key.clone());
                        }
                    }
                }
            }
            built
        });
        index.get(&wanted).cloned().unwrap_or_default()
    }
}

/// Counts reported by [`CacheIndex::merge_metadata`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    /// Keys already present locally; local items win and the incoming item
    /// is discarded
    pub collisions: usize,
}

/// Per-business-context store of all cached entity items
#[derive(Debug)]
pub struct CacheIndex {
    context: BusinessContext,
    types: HashMap<String, TypeCache>,
}

impl CacheIndex {
    pub fn new(context: BusinessContext) -> Self {
        Self {
            context,
            types: HashMap::new(),
        }
    }

    pub fn context(&self) -> &BusinessContext {
        &self.context
    }

    /// Whether a type has been populated this run (even with zero items)
    pub fn is_cached(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Number of cached items for a type
    pub fn count(&self, type_name: &str) -> usize {
        self.types.get(type_name).map_or(0, |t| t.by_key.len())
    }

    /// Drop all cached items and derived indexes
    pub fn clear(&mut self) {
        self.types.clear();
    }

    /// Replace the full set of cached items for a type. Items without a key
    /// value are skipped with a warning; derived secondary indexes for the
    /// type are invalidated. Returns the number of items cached.
    pub fn set_index(&mut self, descriptor: &TypeDescriptor, items: Vec<MetadataItem>) -> usize {
        let mut cache = TypeCache::default();
        for item in items {
            let Some(key) = item.field_str(&descriptor.key_field).map(str::to_string) else {
                tracing::warn!(
                    r#type = descriptor.name,
                    key_field = descriptor.key_field,
                    "dropping cached item without a key value"
                );
                continue;
            };
            let entry = CachedEntry {
                item,
                origin: self.context.clone(),
            };
            if cache.by_key.insert(key.clone(), entry).is_none() {
                cache.order.push(key);
            }
        }
        let count = cache.by_key.len();
        debug!(r#type = descriptor.name, count, context = %self.context, "cache index populated");
        self.types.insert(descriptor.name.clone(), cache);
        count
    }

    /// Cached items of a type in insertion order, with their keys
    pub fn items(&self, type_name: &str) -> impl Iterator<Item = (&str, &MetadataItem)> {
        self.types.get(type_name).into_iter().flat_map(|cache| {
            cache
                .order
                .iter()
                .map(|key| (key.as_str(), &cache.by_key[key].item))
        })
    }

    /// O(1) lookup by portable key; never errors
    pub fn get_by_key(&self, type_name: &str, key: &str) -> Option<&MetadataItem> {
        self.types
            .get(type_name)
            .and_then(|t| t.by_key.get(key))
            .map(|entry| &entry.item)
    }

    /// Entries whose value at `from_field` equals `value` (exact,
    /// case-sensitive, no type coercion), optionally restricted to entries
    /// contributed by one origin context.
    pub fn find_by_field(
        &self,
        type_name: &str,
        from_field: &FieldPath,
        value: &Value,
        origin: Option<&BusinessContext>,
    ) -> Vec<&CachedEntry> {
        let Some(cache) = self.types.get(type_name) else {
            return Vec::new();
        };
        cache
            .matching_keys(from_field, value)
            .iter()
            .filter_map(|key| cache.by_key.get(key))
            .filter(|entry| origin.is_none_or(|o| entry.origin == *o))
            .collect()
    }

    /// Find the single item of `type_name` whose `from_field` equals
    /// `match_value` and return its value at `to_field`.
    ///
    /// Zero matches fail with [`LookupError::NotFound`]; two or more fail
    /// with [`LookupError::Ambiguous`] — the caller must never be handed an
    /// arbitrary pick. Items missing either path are excluded from the
    /// candidate set rather than erroring.
    pub fn search_for_field(
        &self,
        type_name: &str,
        match_value: &Value,
        from_field: &FieldPath,
        to_field: &FieldPath,
        origin: Option<&BusinessContext>,
    ) -> Result<Value, LookupError> {
        let matches = self.find_by_field(type_name, from_field, match_value, origin);
        match matches.as_slice() {
            [] => Err(LookupError::NotFound {
                type_name: type_name.to_string(),
                field: from_field.as_str().to_string(),
                value: match_value.to_string(),
            }),
            [entry] => entry
                .item
                .value_at(to_field)
                .cloned()
                .ok_or_else(|| LookupError::NotFound {
                    type_name: type_name.to_string(),
                    field: to_field.as_str().to_string(),
                    value: match_value.to_string(),
                }),
            many => Err(LookupError::Ambiguous {
                type_name: type_name.to_string(),
                field: from_field.as_str().to_string(),
                value: match_value.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Add items retrieved from a *different* business context (e.g. a
    /// parent unit holding shared entities). Each entry is tagged with its
    /// origin so later lookups can disambiguate; on key collision the local
    /// item wins and the incoming one is discarded.
    pub fn merge_metadata(
        &mut self,
        descriptor: &TypeDescriptor,
        items: Vec<MetadataItem>,
        origin: BusinessContext,
    ) -> MergeStats {
        let cache = self.types.entry(descriptor.name.clone()).or_default();
        let mut stats = MergeStats::default();
        for item in items {
            let Some(key) = item.field_str(&descriptor.key_field).map(str::to_string) else {
                tracing::warn!(
                    r#type = descriptor.name,
                    origin = %origin,
                    "dropping merged item without a key value"
                );
                continue;
            };
            if cache.by_key.contains_key(&key) {
                debug!(
                    r#type = descriptor.name,
                    key,
                    origin = %origin,
                    "key collision on merge, keeping local item"
                );
                stats.collisions += 1;
                continue;
            }
            cache.by_key.insert(
                key.clone(),
                CachedEntry {
                    item,
                    origin: origin.clone(),
                },
            );
            cache.order.push(key);
            stats.added += 1;
        }
        cache.invalidate_secondary();
        tracing::info!(
            r#type = descriptor.name,
            origin = %origin,
            added = stats.added,
            collisions = stats.collisions,
            "merged metadata from parent context"
        );
        stats
    }
}

/// Cache lookup failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// Zero candidates — may be legitimate (filtered out, not retrievable)
    /// or a missing dependency; the caller decides
    #[error("no {type_name} found where {field} = {value}")]
    NotFound {
        type_name: String,
        field: String,
        value: String,
    },

    /// Two or more candidates — a data integrity problem that must surface
    #[error("{count} {type_name} items share {field} = {value}")]
    Ambiguous {
        type_name: String,
        field: String,
        value: String,
        count: usize,
    },
}
