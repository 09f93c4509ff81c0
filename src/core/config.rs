//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::executor::DEFAULT_CONCURRENCY;
use crate::core::pipeline::RunOptions;

/// metasync configuration with layered hierarchy
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Business context used when none is given on the command line
    pub default_context: Option<String>,

    /// Batch executor concurrency ceiling
    pub concurrency: Option<usize>,

    /// Enable name-based fallback matching on deploy
    pub match_by_name: Option<bool>,

    /// Accept name matches across folders
    pub ignore_folder: Option<bool>,

    /// Retry transient remote errors once
    pub retry: Option<bool>,

    /// Base directory for retrieved items
    pub retrieve_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project_dir: &Path) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/metasync/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.metasync/config.yaml)
        let project_path = project_dir.join(".metasync/config.yaml");
        if let Some(project) = Self::read(&project_path) {
            config.merge(project);
        }

        // 4. Environment variables
        if let Ok(context) = std::env::var("METASYNC_CONTEXT") {
            config.default_context = Some(context);
        }
        if let Some(concurrency) = std::env::var("METASYNC_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.concurrency = Some(concurrency);
        }

        config
    }

    fn read(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        serde_yml::from_str(&contents).ok()
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "metasync")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.default_context.is_some() {
            self.default_context = other.default_context;
        }
        if other.concurrency.is_some() {
            self.concurrency = other.concurrency;
        }
        if other.match_by_name.is_some() {
            self.match_by_name = other.match_by_name;
        }
        if other.ignore_folder.is_some() {
            self.ignore_folder = other.ignore_folder;
        }
        if other.retry.is_some() {
            self.retry = other.retry;
        }
        if other.retrieve_dir.is_some() {
            self.retrieve_dir = other.retrieve_dir;
        }
    }

    /// Turn the configured defaults into run options; command-line flags
    /// are layered on top by the CLI
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            match_by_name: self.match_by_name.unwrap_or(false),
            ignore_folder: self.ignore_folder.unwrap_or(false),
            retry_transient: self.retry.unwrap_or(true),
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            rekey: None,
        }
    }
}
