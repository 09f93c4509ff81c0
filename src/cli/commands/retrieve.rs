//! `metasync retrieve` command - pull remote metadata into portable files

use console::style;
use miette::{IntoDiagnostic, Result};

use super::{ordered_types, print_diagnostics, project_dir, resolve_context, store_for};
use crate::cli::args::{GlobalOpts, RetrieveArgs};
use crate::core::config::Config;
use crate::core::pipeline::SyncRun;
use crate::registry;
use crate::remote::FsAdapter;

pub async fn run(args: RetrieveArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load(&project_dir(global));
    let context = resolve_context(args.context, &config)?;
    let registry = registry::builtin().into_diagnostic()?;
    let order = ordered_types(&registry, &args.types)?;
    let store = store_for(args.out, &config);

    let mut sync = SyncRun::new(&registry, context.clone(), config.run_options());
    let mut saved = 0;
    let mut failed = 0;

    for type_name in &order {
        let descriptor = registry.get(type_name).into_diagnostic()?.clone();
        let adapter = FsAdapter::new(descriptor, &args.remote);
        let summary = sync.retrieve_type(&adapter, &store).await.into_diagnostic()?;

        if !global.quiet {
            println!(
                "{} {:<16} cached {:>3}  saved {:>3}  failed {:>3}  ({}ms)",
                if summary.failed == 0 {
                    style("✓").green()
                } else {
                    style("!").yellow()
                },
                summary.type_name,
                summary.cached,
                summary.saved,
                summary.failed,
                summary.duration_ms
            );
        }
        print_diagnostics(&summary.diagnostics);
        saved += summary.saved;
        failed += summary.failed;
    }

    if !global.quiet {
        println!(
            "\nRetrieved {} items from {} into {}{}",
            style(saved).bold(),
            style(&context).bold(),
            store.base().display(),
            if failed > 0 {
                format!(" ({failed} failed)")
            } else {
                String::new()
            }
        );
    }
    Ok(())
}
