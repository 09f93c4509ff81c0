//! CLI command implementations

pub mod deploy;
pub mod plan;
pub mod retrieve;
pub mod types;

use std::path::PathBuf;

use console::style;
use miette::{miette, IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::core::config::Config;
use crate::core::context::BusinessContext;
use crate::core::descriptor::TypeRegistry;
use crate::core::pipeline::ItemDiagnostic;
use crate::store::ItemStore;

/// Project root the config layers are anchored at
pub(crate) fn project_dir(global: &GlobalOpts) -> PathBuf {
    global
        .project
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Business context from the flag, falling back to the configured default
pub(crate) fn resolve_context(
    explicit: Option<String>,
    config: &Config,
) -> Result<BusinessContext> {
    let id = explicit
        .or_else(|| config.default_context.clone())
        .ok_or_else(|| {
            miette!("no business context given; pass --context or set default_context")
        })?;
    id.parse().into_diagnostic()
}

/// Requested types (or all registered ones) in dependency order
pub(crate) fn ordered_types(registry: &TypeRegistry, requested: &[String]) -> Result<Vec<String>> {
    let requested: Vec<&str> = if requested.is_empty() {
        registry.names().collect()
    } else {
        requested.iter().map(String::as_str).collect()
    };
    registry.dependency_order(&requested).into_diagnostic()
}

/// Local item store for this run
pub(crate) fn store_for(dir: Option<PathBuf>, config: &Config) -> ItemStore {
    let base = dir
        .or_else(|| config.retrieve_dir.clone())
        .unwrap_or_else(|| PathBuf::from("retrieved"));
    ItemStore::new(base)
}

/// One line per skipped/failed item, so the operator can fix source data
/// and re-run
pub(crate) fn print_diagnostics(diagnostics: &[ItemDiagnostic]) {
    for diagnostic in diagnostics {
        eprintln!(
            "  {} {} {}: {}",
            style("✗").red(),
            diagnostic.disposition,
            style(&diagnostic.key).bold(),
            diagnostic.reason
        );
    }
}
