//! Bounded-concurrency batch executor
//!
//! Dispatches decided create/update operations against one adapter with a
//! fixed number of operations in flight. Every operation produces its own
//! outcome; one item failing never cancels, blocks, or hides another.
//! A narrow class of transient network errors is retried exactly once.

use futures::stream::{self, StreamExt};
use std::fmt;

use tracing::{debug, warn};

use crate::core::adapter::{CrudAdapter, RemoteError};
use crate::core::context::BusinessContext;
use crate::core::item::MetadataItem;

/// Default number of operations in flight at once
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Executor tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Maximum operations in flight at once
    pub concurrency: usize,
    /// Whether transient failures get their single retry
    pub retry_transient: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry_transient: true,
        }
    }
}

/// Which remote call an operation is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Update,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Create => write!(f, "create"),
            OpKind::Update => write!(f, "update"),
        }
    }
}

/// One decided operation, ready to execute
#[derive(Debug, Clone)]
pub struct PlannedOp {
    /// Portable key the outcome is attributed to (the local file's key,
    /// which under an opt-in rename differs from the payload's key)
    pub key: String,
    pub kind: OpKind,
    pub item: MetadataItem,
}

/// Tagged per-item result
#[derive(Debug, Clone)]
pub enum OpOutcome {
    Success { response: MetadataItem },
    Failure { error: RemoteError },
}

/// One executed operation with its outcome
#[derive(Debug, Clone)]
pub struct CompletedOp {
    pub key: String,
    pub kind: OpKind,
    pub item: MetadataItem,
    pub outcome: OpOutcome,
    /// Whether the transient retry was consumed
    pub retried: bool,
}

impl CompletedOp {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, OpOutcome::Success { .. })
    }
}

/// Everything the rest of the engine may know about a finished batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub ops: Vec<CompletedOp>,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &CompletedOp> {
        self.ops.iter().filter(|op| op.succeeded())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CompletedOp> {
        self.ops.iter().filter(|op| !op.succeeded())
    }

    pub fn created(&self) -> usize {
        self.successes().filter(|op| op.kind == OpKind::Create).count()
    }

    pub fn updated(&self) -> usize {
        self.successes().filter(|op| op.kind == OpKind::Update).count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }
}

/// Execute a batch of planned operations with bounded concurrency.
///
/// Operations start as slots free up; results are collected for every
/// planned item. The report lists completions in finish order, which is not
/// the submission order.
pub async fn execute_batch(
    adapter: &dyn CrudAdapter,
    context: &BusinessContext,
    ops: Vec<PlannedOp>,
    options: ExecutorOptions,
) -> BatchReport {
    let concurrency = options.concurrency.max(1);
    debug!(
        r#type = adapter.descriptor().name,
        ops = ops.len(),
        concurrency,
        "executing batch"
    );
    let completed: Vec<CompletedOp> = stream::iter(ops)
        .map(|op| run_one(adapter, context, op, options.retry_transient))
        .buffer_unordered(concurrency)
        .collect()
        .await;
    BatchReport { ops: completed }
}

async fn run_one(
    adapter: &dyn CrudAdapter,
    context: &BusinessContext,
    op: PlannedOp,
    retry_transient: bool,
) -> CompletedOp {
    let first = dispatch(adapter, context, &op).await;
    let (outcome, retried) = match first {
        Ok(response) => (OpOutcome::Success { response }, false),
        Err(error) if retry_transient && error.is_transient() => {
            warn!(
                r#type = adapter.descriptor().name,
                key = op.key,
                %error,
                "transient remote error, retrying once"
            );
            match dispatch(adapter, context, &op).await {
                Ok(response) => (OpOutcome::Success { response }, true),
                Err(error) => (OpOutcome::Failure { error }, true),
            }
        }
        Err(error) => (OpOutcome::Failure { error }, false),
    };
    CompletedOp {
        key: op.key,
        kind: op.kind,
        item: op.item,
        outcome,
        retried,
    }
}

async fn dispatch(
    adapter: &dyn CrudAdapter,
    context: &BusinessContext,
    op: &PlannedOp,
) -> Result<MetadataItem, RemoteError> {
    match op.kind {
        OpKind::Create => adapter.create_remote(context, &op.item).await,
        OpKind::Update => adapter.update_remote(context, &op.item).await,
    }
}
