//! CLI argument definitions using clap derive

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "metasync")]
#[command(author, version, about = "Metadata synchronization toolkit")]
#[command(
    long_about = "Synchronize platform metadata between plain-text files and remote environments, \
                  with cross-environment reference resolution."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: current directory)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Retrieve remote metadata into portable local files
    Retrieve(RetrieveArgs),

    /// Deploy local files to a remote environment
    Deploy(DeployArgs),

    /// Show what a deploy would do, without touching the remote
    Plan(PlanArgs),

    /// List registered entity types and their dependency order
    Types,
}

#[derive(Args, Debug)]
pub struct RetrieveArgs {
    /// Remote environment directory (sandbox root)
    #[arg(long, env = "METASYNC_REMOTE")]
    pub remote: PathBuf,

    /// Business context to retrieve from
    #[arg(long, short = 'c')]
    pub context: Option<String>,

    /// Entity types to retrieve (default: all registered types)
    #[arg(long, short = 't', value_delimiter = ',')]
    pub types: Vec<String>,

    /// Directory to write retrieved items into
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Remote environment directory (sandbox root)
    #[arg(long, env = "METASYNC_REMOTE")]
    pub remote: PathBuf,

    /// Business context to deploy into
    #[arg(long, short = 'c')]
    pub context: Option<String>,

    /// Entity types to deploy (default: all registered types)
    #[arg(long, short = 't', value_delimiter = ',')]
    pub types: Vec<String>,

    /// Directory holding the local items to deploy
    #[arg(long, short = 'f')]
    pub from: Option<PathBuf>,

    /// Match remote items by name when the key is unknown
    #[arg(long)]
    pub match_by_name: bool,

    /// Accept a name match in a different folder
    #[arg(long)]
    pub ignore_folder: bool,

    /// Do not retry transient remote errors
    #[arg(long)]
    pub no_retry: bool,

    /// Maximum operations in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Rename a portable key during this deploy: TYPE:OLD=NEW
    #[arg(long, value_name = "TYPE:OLD=NEW")]
    pub rekey: Option<String>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Remote environment directory (sandbox root)
    #[arg(long, env = "METASYNC_REMOTE")]
    pub remote: PathBuf,

    /// Business context to plan against
    #[arg(long, short = 'c')]
    pub context: Option<String>,

    /// Entity types to plan (default: all registered types)
    #[arg(long, short = 't', value_delimiter = ',')]
    pub types: Vec<String>,

    /// Directory holding the local items
    #[arg(long, short = 'f')]
    pub from: Option<PathBuf>,

    /// Match remote items by name when the key is unknown
    #[arg(long)]
    pub match_by_name: bool,

    /// Accept a name match in a different folder
    #[arg(long)]
    pub ignore_folder: bool,
}
