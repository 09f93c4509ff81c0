//! `metasync deploy` command - push local files to a remote environment

use console::style;
use miette::{miette, IntoDiagnostic, Result};

use super::{ordered_types, print_diagnostics, project_dir, resolve_context, store_for};
use crate::cli::args::{DeployArgs, GlobalOpts};
use crate::core::config::Config;
use crate::core::pipeline::{Rekey, RunOptions, SyncRun};
use crate::registry;
use crate::remote::FsAdapter;

/// Parse `TYPE:OLD=NEW` into a rekey request
fn parse_rekey(raw: &str) -> Result<Rekey> {
    let (type_name, rest) = raw
        .split_once(':')
        .ok_or_else(|| miette!("--rekey expects TYPE:OLD=NEW, got '{raw}'"))?;
    let (old_key, new_key) = rest
        .split_once('=')
        .ok_or_else(|| miette!("--rekey expects TYPE:OLD=NEW, got '{raw}'"))?;
    if type_name.is_empty() || old_key.is_empty() || new_key.is_empty() {
        return Err(miette!("--rekey expects TYPE:OLD=NEW, got '{raw}'"));
    }
    Ok(Rekey {
        type_name: type_name.to_string(),
        old_key: old_key.to_string(),
        new_key: new_key.to_string(),
    })
}

fn options_for(args: &DeployArgs, config: &Config) -> Result<RunOptions> {
    let mut options = config.run_options();
    if args.match_by_name {
        options.match_by_name = true;
    }
    if args.ignore_folder {
        options.ignore_folder = true;
    }
    if args.no_retry {
        options.retry_transient = false;
    }
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency;
    }
    if let Some(raw) = &args.rekey {
        options.rekey = Some(parse_rekey(raw)?);
    }
    Ok(options)
}

pub async fn run(args: DeployArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load(&project_dir(global));
    let context = resolve_context(args.context.clone(), &config)?;
    let registry = registry::builtin().into_diagnostic()?;
    let order = ordered_types(&registry, &args.types)?;
    let store = store_for(args.from.clone(), &config);
    let options = options_for(&args, &config)?;

    let mut sync = SyncRun::new(&registry, context.clone(), options);
    let mut created = 0;
    let mut updated = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for type_name in &order {
        let descriptor = registry.get(type_name).into_diagnostic()?.clone();
        let adapter = FsAdapter::new(descriptor, &args.remote);
        let summary = sync.deploy_type(&adapter, &store).await.into_diagnostic()?;

        if !global.quiet {
            println!(
                "{} {:<16} created {:>3}  updated {:>3}  skipped {:>3}  failed {:>3}  ({}ms)",
                if summary.failed == 0 {
                    style("✓").green()
                } else {
                    style("!").yellow()
                },
                summary.type_name,
                summary.created,
                summary.updated,
                summary.skipped,
                summary.failed,
                summary.duration_ms
            );
        }
        print_diagnostics(&summary.diagnostics);
        created += summary.created;
        updated += summary.updated;
        skipped += summary.skipped;
        failed += summary.failed;
    }

    if !sync.renames().is_empty() && !global.quiet {
        println!("\nKey changes applied:");
        for (type_name, old, new) in sync.renames().iter() {
            println!("  {} {type_name} {old} {} {new}", style("↻").cyan(), style("→").dim());
        }
    }

    if !global.quiet {
        println!(
            "\nDeploy to {}: {} created, {} updated, {} skipped, {} failed",
            style(&context).bold(),
            created,
            updated,
            skipped,
            failed
        );
    }
    if failed > 0 {
        return Err(miette!("{failed} item(s) failed to deploy"));
    }
    Ok(())
}
