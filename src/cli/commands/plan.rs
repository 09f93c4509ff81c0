//! `metasync plan` command - dry-run deploy

use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use super::{ordered_types, print_diagnostics, project_dir, resolve_context, store_for};
use crate::cli::args::{GlobalOpts, PlanArgs};
use crate::core::config::Config;
use crate::core::pipeline::SyncRun;
use crate::registry;
use crate::remote::FsAdapter;

pub async fn run(args: PlanArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load(&project_dir(global));
    let context = resolve_context(args.context, &config)?;
    let registry = registry::builtin().into_diagnostic()?;
    let order = ordered_types(&registry, &args.types)?;
    let store = store_for(args.from, &config);

    let mut options = config.run_options();
    options.match_by_name |= args.match_by_name;
    options.ignore_folder |= args.ignore_folder;

    let mut sync = SyncRun::new(&registry, context.clone(), options);
    let mut builder = Builder::default();
    builder.push_record(["Type", "Key", "Action"]);
    let mut rows = 0;

    for type_name in &order {
        let descriptor = registry.get(type_name).into_diagnostic()?.clone();
        let adapter = FsAdapter::new(descriptor, &args.remote);
        let plan = sync.plan_type(&adapter, &store).await.into_diagnostic()?;

        for entry in &plan.entries {
            builder.push_record(vec![
                plan.type_name.clone(),
                entry.key.clone(),
                entry.kind.to_string(),
            ]);
            rows += 1;
        }
        print_diagnostics(&plan.diagnostics);
    }

    if rows == 0 {
        println!("Nothing to deploy to {}", style(&context).bold());
    } else {
        println!("{}", builder.build().with(Style::markdown()));
        println!("\n{} operation(s) planned against {}", rows, style(&context).bold());
    }
    Ok(())
}
