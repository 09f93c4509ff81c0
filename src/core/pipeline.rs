//! Retrieve/deploy orchestration
//!
//! A [`SyncRun`] owns the per-run state for one business context: the cache
//! index, the run options, and the key-rename map. The orchestrator (CLI or
//! embedding code) drives it one entity type at a time, in dependency
//! order; caching a type before its dependents is enforced here and
//! violations are run-fatal.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::core::adapter::{CrudAdapter, RemoteError};
use crate::core::cache::CacheIndex;
use crate::core::context::BusinessContext;
use crate::core::decide::{decide, DecideOptions, Decision};
use crate::core::descriptor::{DescriptorError, TypeDescriptor, TypeRegistry};
use crate::core::executor::{execute_batch, ExecutorOptions, OpKind, PlannedOp, DEFAULT_CONCURRENCY};
use crate::core::item::MetadataItem;
use crate::core::reconcile::{reconcile_key_changes, KeyRenameMap};
use crate::core::refs::{resolve_inbound, resolve_outbound, ResolveError};
use crate::store::{ItemStore, StoreError};

/// An opt-in key rename for one deploy run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rekey {
    pub type_name: String,
    pub old_key: String,
    pub new_key: String,
}

/// Run-mode flags supplied by the orchestrator
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub match_by_name: bool,
    pub ignore_folder: bool,
    pub retry_transient: bool,
    pub concurrency: usize,
    pub rekey: Option<Rekey>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            match_by_name: false,
            ignore_folder: false,
            retry_transient: true,
            concurrency: DEFAULT_CONCURRENCY,
            rekey: None,
        }
    }
}

impl RunOptions {
    fn decide_options(&self) -> DecideOptions {
        DecideOptions {
            match_by_name: self.match_by_name,
            ignore_folder: self.ignore_folder,
        }
    }

    fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            concurrency: self.concurrency,
            retry_transient: self.retry_transient,
        }
    }
}

/// Why an item did not make it into (or through) the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Skipped,
    Failed,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Skipped => write!(f, "skipped"),
            Disposition::Failed => write!(f, "failed"),
        }
    }
}

/// One diagnostic line, attributed to an item key
#[derive(Debug, Clone)]
pub struct ItemDiagnostic {
    pub key: String,
    pub disposition: Disposition,
    pub reason: String,
}

/// Result of retrieving one type
#[derive(Debug, Default)]
pub struct RetrieveSummary {
    pub type_name: String,
    pub cached: usize,
    pub saved: usize,
    pub failed: usize,
    pub diagnostics: Vec<ItemDiagnostic>,
    pub duration_ms: u64,
}

/// Result of deploying one type
#[derive(Debug, Default)]
pub struct TypeSummary {
    pub type_name: String,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub renamed: usize,
    pub diagnostics: Vec<ItemDiagnostic>,
    pub duration_ms: u64,
}

/// A dry-run deploy plan for one type
#[derive(Debug, Default)]
pub struct TypePlan {
    pub type_name: String,
    pub entries: Vec<PlanEntry>,
    pub diagnostics: Vec<ItemDiagnostic>,
}

/// One planned action, before execution
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub key: String,
    pub kind: OpKind,
}

/// Run-fatal orchestration errors; everything item-scoped stays inside the
/// summaries
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("failed to fetch {type_name}: {source}")]
    Fetch {
        type_name: String,
        source: RemoteError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-run engine state for one business context
pub struct SyncRun<'a> {
    registry: &'a TypeRegistry,
    context: BusinessContext,
    options: RunOptions,
    cache: CacheIndex,
    renames: KeyRenameMap,
}

impl<'a> SyncRun<'a> {
    pub fn new(registry: &'a TypeRegistry, context: BusinessContext, options: RunOptions) -> Self {
        Self {
            registry,
            cache: CacheIndex::new(context.clone()),
            context,
            options,
            renames: KeyRenameMap::default(),
        }
    }

    pub fn context(&self) -> &BusinessContext {
        &self.context
    }

    pub fn cache(&self) -> &CacheIndex {
        &self.cache
    }

    /// Key renames applied so far this run
    pub fn renames(&self) -> &KeyRenameMap {
        &self.renames
    }

    /// Fetch all remote items of one type and populate the cache index.
    ///
    /// Must be called in dependency order; a dependent type whose (known)
    /// dependency has not been cached yet is a run-fatal ordering error.
    pub async fn cache_type(&mut self, adapter: &dyn CrudAdapter) -> Result<usize, PipelineError> {
        let descriptor = adapter.descriptor();
        descriptor.validate()?;
        for dep in &descriptor.depends_on {
            if dep == &descriptor.name {
                continue;
            }
            if !self.registry.contains(dep) {
                warn!(
                    r#type = descriptor.name,
                    dependency = dep,
                    "dependency type not registered; its references will not resolve"
                );
                continue;
            }
            if !self.cache.is_cached(dep) {
                return Err(DescriptorError::OutOfOrder {
                    type_name: descriptor.name.clone(),
                    dependency: dep.clone(),
                }
                .into());
            }
        }
        let items = adapter
            .fetch_all(&self.context)
            .await
            .map_err(|source| PipelineError::Fetch {
                type_name: descriptor.name.clone(),
                source,
            })?;
        let count = self.cache.set_index(descriptor, items);
        info!(r#type = descriptor.name, count, context = %self.context, "cached remote items");
        Ok(count)
    }

    /// Merge shared items from a *parent* business context into this run's
    /// index, e.g. entities inherited by every child unit. Local items win
    /// on key collision; merged entries stay tagged with their origin.
    pub async fn merge_from_context(
        &mut self,
        adapter: &dyn CrudAdapter,
        parent: BusinessContext,
    ) -> Result<crate::core::cache::MergeStats, PipelineError> {
        let descriptor = adapter.descriptor();
        let items = adapter
            .fetch_all(&parent)
            .await
            .map_err(|source| PipelineError::Fetch {
                type_name: descriptor.name.clone(),
                source,
            })?;
        Ok(self.cache.merge_metadata(descriptor, items, parent))
    }

    /// Retrieve one type: cache it, resolve references outbound, and hand
    /// the portable items to the store.
    pub async fn retrieve_type(
        &mut self,
        adapter: &dyn CrudAdapter,
        store: &ItemStore,
    ) -> Result<RetrieveSummary, PipelineError> {
        let started = Instant::now();
        let cached = self.cache_type(adapter).await?;
        let descriptor = adapter.descriptor();

        let mut summary = RetrieveSummary {
            type_name: descriptor.name.clone(),
            cached,
            ..Default::default()
        };
        let snapshot: Vec<(String, MetadataItem)> = self
            .cache
            .items(&descriptor.name)
            .map(|(key, item)| (key.to_string(), item.clone()))
            .collect();
        for (key, mut item) in snapshot {
            match resolve_outbound(&mut item, descriptor, self.registry, &self.cache, &self.renames)
            {
                Ok(()) => {
                    store.save_item(&self.context, &descriptor.name, &key, &item)?;
                    summary.saved += 1;
                }
                Err(ResolveError::Descriptor(e)) => return Err(e.into()),
                Err(error) => {
                    summary.failed += 1;
                    summary.diagnostics.push(ItemDiagnostic {
                        key,
                        disposition: Disposition::Failed,
                        reason: error.to_string(),
                    });
                }
            }
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Dry-run deploy of one type: everything up to, but not including, the
    /// remote calls.
    pub async fn plan_type(
        &mut self,
        adapter: &dyn CrudAdapter,
        store: &ItemStore,
    ) -> Result<TypePlan, PipelineError> {
        self.cache_type(adapter).await?;
        let (ops, diagnostics, _) = self.build_plan(adapter.descriptor(), store)?;
        Ok(TypePlan {
            type_name: adapter.descriptor().name.clone(),
            entries: ops
                .iter()
                .map(|op| PlanEntry {
                    key: op.key.clone(),
                    kind: op.kind,
                })
                .collect(),
            diagnostics,
        })
    }

    /// Deploy one type: cache the target context, resolve inbound, decide,
    /// execute with bounded concurrency, and reconcile key changes.
    pub async fn deploy_type(
        &mut self,
        adapter: &dyn CrudAdapter,
        store: &ItemStore,
    ) -> Result<TypeSummary, PipelineError> {
        let started = Instant::now();
        self.cache_type(adapter).await?;
        let descriptor = adapter.descriptor().clone();
        let (ops, diagnostics, portable) = self.build_plan(&descriptor, store)?;

        let mut summary = TypeSummary {
            type_name: descriptor.name.clone(),
            skipped: diagnostics
                .iter()
                .filter(|d| d.disposition == Disposition::Skipped)
                .count(),
            diagnostics,
            ..Default::default()
        };

        let report = execute_batch(
            adapter,
            &self.context,
            ops,
            self.options.executor_options(),
        )
        .await;
        summary.created = report.created();
        summary.updated = report.updated();
        summary.failed = report.failed();
        for op in report.failures() {
            if let crate::core::executor::OpOutcome::Failure { error } = &op.outcome {
                summary.diagnostics.push(ItemDiagnostic {
                    key: op.key.clone(),
                    disposition: Disposition::Failed,
                    reason: error.to_string(),
                });
            }
        }

        // Fold batch results back into the index, strictly after the batch:
        // types deployed later in the run must be able to resolve
        // references to items this batch just created.
        let mut refreshed: Vec<MetadataItem> = self
            .cache
            .items(&descriptor.name)
            .map(|(_, item)| item.clone())
            .collect();
        for op in report.successes() {
            if let crate::core::executor::OpOutcome::Success { response } = &op.outcome {
                let key = response.field_str(&descriptor.key_field).map(str::to_string);
                refreshed.retain(|item| {
                    item.field_str(&descriptor.key_field).map(str::to_string) != key
                });
                refreshed.push(response.clone());
            }
        }
        self.cache.set_index(&descriptor, refreshed);

        // Post-processing: clean up renamed keys and re-persist under the
        // new key so the local tree matches the remote state.
        let applied =
            reconcile_key_changes(&descriptor, &self.context, &report, store, &mut self.renames);
        summary.renamed = applied.len();
        for rename in &applied {
            if let Some(item) = portable.get(&rename.old_key) {
                let mut renamed = item.clone();
                renamed.set_field(
                    descriptor.key_field.clone(),
                    serde_json::Value::String(rename.new_key.clone()),
                );
                store.save_item(&self.context, &descriptor.name, &rename.new_key, &renamed)?;
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Shared deploy-side preparation: load local items, resolve inbound,
    /// decide, filter payload fields, apply the opt-in rekey.
    ///
    /// All resolution and decisions run against the cache snapshot taken by
    /// [`Self::cache_type`]; the cache is not touched again until the batch
    /// is over, so self-referencing types resolve deterministically.
    #[allow(clippy::type_complexity)]
    fn build_plan(
        &self,
        descriptor: &TypeDescriptor,
        store: &ItemStore,
    ) -> Result<(Vec<PlannedOp>, Vec<ItemDiagnostic>, HashMap<String, MetadataItem>), PipelineError>
    {
        let local_items = store.load_items(&self.context, &descriptor.name)?;
        let mut ops = Vec::new();
        let mut diagnostics = Vec::new();
        let mut portable = HashMap::new();

        for (file_key, item) in local_items {
            portable.insert(file_key.clone(), item.clone());

            let mut wire = item;
            match resolve_inbound(&mut wire, descriptor, self.registry, &self.cache) {
                Ok(()) => {}
                Err(ResolveError::Descriptor(e)) => return Err(e.into()),
                Err(error) => {
                    info!(
                        r#type = descriptor.name,
                        key = file_key,
                        %error,
                        "excluding item from batch"
                    );
                    diagnostics.push(ItemDiagnostic {
                        key: file_key,
                        disposition: Disposition::Skipped,
                        reason: error.to_string(),
                    });
                    continue;
                }
            }

            let decision = match decide(&wire, descriptor, &self.cache, self.options.decide_options())
            {
                Ok(decision) => decision,
                Err(error) => {
                    diagnostics.push(ItemDiagnostic {
                        key: file_key,
                        disposition: Disposition::Skipped,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            match decision {
                Decision::Create => {
                    retain_payload_fields(&mut wire, descriptor, &descriptor.creatable_fields, false);
                    self.apply_rekey(descriptor, &file_key, &mut wire);
                    ops.push(PlannedOp {
                        key: file_key,
                        kind: OpKind::Create,
                        item: wire,
                    });
                }
                Decision::Update { matched } => {
                    if let Some(id) = matched.field(&descriptor.id_field) {
                        wire.set_field(descriptor.id_field.clone(), id.clone());
                    }
                    retain_payload_fields(&mut wire, descriptor, &descriptor.updatable_fields, true);
                    self.apply_rekey(descriptor, &file_key, &mut wire);
                    ops.push(PlannedOp {
                        key: file_key,
                        kind: OpKind::Update,
                        item: wire,
                    });
                }
                Decision::Skip { reason } => {
                    diagnostics.push(ItemDiagnostic {
                        key: file_key,
                        disposition: Disposition::Skipped,
                        reason,
                    });
                }
            }
        }
        Ok((ops, diagnostics, portable))
    }

    fn apply_rekey(&self, descriptor: &TypeDescriptor, file_key: &str, wire: &mut MetadataItem) {
        let Some(rekey) = &self.options.rekey else {
            return;
        };
        if rekey.type_name != descriptor.name || rekey.old_key != file_key {
            return;
        }
        info!(
            r#type = descriptor.name,
            old_key = rekey.old_key,
            new_key = rekey.new_key,
            "changing portable key as part of this deploy"
        );
        wire.set_field(
            descriptor.key_field.clone(),
            serde_json::Value::String(rekey.new_key.clone()),
        );
    }
}

/// Trim a payload to the fields the platform accepts for this operation.
/// An empty field list means the type accepts everything. The key field
/// (and the id field, on update) always survive.
fn retain_payload_fields(
    item: &mut MetadataItem,
    descriptor: &TypeDescriptor,
    allowed: &[String],
    keep_id: bool,
) {
    if allowed.is_empty() {
        return;
    }
    let keep: Vec<&str> = allowed.iter().map(String::as_str).collect();
    let names: Vec<String> = item.fields().keys().cloned().collect();
    for name in names {
        if name == descriptor.key_field || (keep_id && name == descriptor.id_field) {
            continue;
        }
        if !keep.contains(&name.as_str()) {
            item.remove_field(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor {
            name: "dataExtension".to_string(),
            key_field: "customerKey".to_string(),
            id_field: "objectId".to_string(),
            name_field: "name".to_string(),
            folder_id_field: None,
            creatable: true,
            updatable: true,
            creatable_fields: vec!["customerKey".to_string(), "name".to_string()],
            updatable_fields: vec!["name".to_string()],
            retrievable_fields: Vec::new(),
            templatable_fields: Vec::new(),
            references: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn test_retain_payload_fields_create() {
        let mut item = MetadataItem::from_value(json!({
            "customerKey": "DE1",
            "name": "Orders",
            "objectId": "obj-1",
            "rowCount": 10
        }))
        .unwrap();
        retain_payload_fields(&mut item, &descriptor(), &descriptor().creatable_fields, false);
        assert_eq!(item.field_str("customerKey"), Some("DE1"));
        assert_eq!(item.field_str("name"), Some("Orders"));
        assert!(item.field("objectId").is_none());
        assert!(item.field("rowCount").is_none());
    }

    #[test]
    fn test_retain_payload_fields_update_keeps_id_and_key() {
        let mut item = MetadataItem::from_value(json!({
            "customerKey": "DE1",
            "name": "Orders",
            "objectId": "obj-1",
            "rowCount": 10
        }))
        .unwrap();
        retain_payload_fields(&mut item, &descriptor(), &descriptor().updatable_fields, true);
        assert_eq!(item.field_str("customerKey"), Some("DE1"));
        assert_eq!(item.field_str("objectId"), Some("obj-1"));
        assert!(item.field("rowCount").is_none());
    }

    #[test]
    fn test_retain_payload_fields_empty_list_keeps_all() {
        let mut item = MetadataItem::from_value(json!({"customerKey": "DE1", "extra": 1})).unwrap();
        retain_payload_fields(&mut item, &descriptor(), &[], false);
        assert!(item.field("extra").is_some());
    }
}
