use clap::Parser;
use miette::{IntoDiagnostic, Result};
use metasync::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    // This is standard practice for CLI tools that output to stdout.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global.clone();

    let default_filter = if global.verbose {
        "metasync=debug"
    } else if global.quiet {
        "metasync=error"
    } else {
        "metasync=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with_writer(std::io::stderr)
        .init();

    // Everything remote runs on one control thread; concurrency is
    // cooperative multiplexing inside the batch executor
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    match cli.command {
        Commands::Retrieve(args) => {
            runtime.block_on(metasync::cli::commands::retrieve::run(args, &global))
        }
        Commands::Deploy(args) => {
            runtime.block_on(metasync::cli::commands::deploy::run(args, &global))
        }
        Commands::Plan(args) => runtime.block_on(metasync::cli::commands::plan::run(args, &global)),
        Commands::Types => metasync::cli::commands::types::run(),
    }
}
