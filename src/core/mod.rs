//! Core module - the synchronization engine

pub mod adapter;
pub mod cache;
pub mod config;
pub mod context;
pub mod decide;
pub mod descriptor;
pub mod executor;
pub mod fieldpath;
pub mod item;
pub mod pipeline;
pub mod reconcile;
pub mod refs;

pub use adapter::{CrudAdapter, RemoteError, RemoteErrorKind};
pub use cache::{CacheIndex, CachedEntry, LookupError, MergeStats};
pub use config::Config;
pub use context::{BusinessContext, ContextParseError};
pub use decide::{decide, DecideError, DecideOptions, Decision};
pub use descriptor::{
    DescriptorError, ReferenceSpec, TypeDescriptor, TypeRegistry, FOLDER_PATH_FIELD, FOLDER_TYPE,
    ROOT_FOLDER_PATH,
};
pub use executor::{
    execute_batch, BatchReport, CompletedOp, ExecutorOptions, OpKind, OpOutcome, PlannedOp,
    DEFAULT_CONCURRENCY,
};
pub use fieldpath::{FieldPath, PathParseError, Segment};
pub use item::{canonical_scalar, MetadataItem, REF_PREFIX};
pub use pipeline::{
    Disposition, ItemDiagnostic, PipelineError, PlanEntry, Rekey, RetrieveSummary, RunOptions,
    SyncRun, TypePlan, TypeSummary,
};
pub use reconcile::{reconcile_key_changes, AppliedRename, KeyRenameMap};
pub use refs::{resolve_inbound, resolve_outbound, ResolveError};
