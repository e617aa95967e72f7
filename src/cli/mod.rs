//! Command-line interface for sqlweave.
//!
//! # Commands
//!
//! - `check` - compile a template and report its builders and parameters
//! - `render` - compile and execute a template against a configured profile
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - debug logging
//! - `--quiet` / `-q` - errors only
//! - `--config` / `-c` - configuration file (default `./sqlweave.toml`)
//!
//! # Examples
//!
//! ```bash
//! sqlweave check queries/user_groups.sql
//! sqlweave check queries/user_groups.sql --format json
//! sqlweave render queries/user_groups.sql --param userId=42 --user alice
//! sqlweave -c ci.toml render report.sql --profile preview
//! ```
//!
//! Logs go to stderr; command output goes to stdout, so JSON output can be
//! piped.

mod check;
mod render;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use check::{CheckCommand, OutputFormat};
pub use render::{RenderCommand, parse_param};

use crate::config::EngineConfig;

/// Runtime settings derived from the global flags.
///
/// Kept separate from [`Cli`] so tests and embedders can run a command with
/// an explicit log level and configuration path.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// `EnvFilter` directive; `None` keeps `RUST_LOG` (or `warn`)
    pub log_level: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Install the global `tracing` subscriber.
    ///
    /// Does nothing if a subscriber is already installed, which happens when
    /// several commands run in one test process.
    pub fn init_logging(&self) {
        let filter = match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

#[derive(Parser)]
#[command(
    name = "sqlweave",
    about = "Compile and run SQL builder templates",
    version,
    long_about = "sqlweave compiles templates made of named query builders, binds every caller-supplied value as a positional parameter, and runs the builders in dependency order."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (defaults to ./sqlweave.toml)
    #[arg(short, long, global = true, env = "SQLWEAVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template and list its builders and parameters
    Check(CheckCommand),

    /// Execute a template and print the result as JSON
    Render(RenderCommand),
}

impl Cli {
    /// Run the parsed command.
    ///
    /// # Errors
    ///
    /// Returns whatever the command returns; the binary turns it into a
    /// user-facing message.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
        }
    }

    /// Run the command with explicit runtime settings.
    ///
    /// # Errors
    ///
    /// Returns configuration loading errors and command failures.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();
        let engine_config = EngineConfig::load_with_optional(config.config_path).await?;

        match self.command {
            Commands::Check(cmd) => cmd.execute(&engine_config).await,
            Commands::Render(cmd) => cmd.execute(&engine_config).await,
        }
    }
}
