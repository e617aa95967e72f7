//! Engine configuration.
//!
//! Configuration lives in `sqlweave.toml` in the working directory. The
//! location can be overridden with `--config <path>` or the
//! `SQLWEAVE_CONFIG` environment variable; an explicitly named file must
//! exist, while a missing default file simply means "use the defaults".
//!
//! ```toml
//! default_profile = "local"
//! execute_top_level = false
//! max_reference_depth = 100
//!
//! [profiles.local]
//! kind = "fixture"
//! path = "fixtures/local.json"
//!
//! [profiles.preview]
//! kind = "dry-run"
//! ```
//!
//! Relative fixture paths are resolved against the directory of the
//! configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::constants::{
    CONFIG_ENV_VAR, CONFIG_FILE_NAME, DEFAULT_PROFILE, MAX_NESTING_DEPTH, REFERENCE_SEARCH_MAX_DEPTH,
};
use crate::core::SqlweaveError;
use crate::datasource::{DataSource, DryRunDataSource, FixtureDataSource};
use crate::templating::{CompileOptions, EngineOptions};

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

const fn default_max_reference_depth() -> usize {
    REFERENCE_SEARCH_MAX_DEPTH
}

/// Which adapter a profile uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    /// Echo queries back instead of running them
    DryRun,
    /// Answer from a JSON fixture file
    Fixture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub kind: ProfileKind,
    /// Fixture file, required for `kind = "fixture"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Submit top-level text as a query when a template has no main builder
    #[serde(default)]
    pub execute_top_level: bool,

    /// Longest access chain the parameter resolver walks before giving up
    #[serde(default = "default_max_reference_depth")]
    pub max_reference_depth: usize,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProfileConfig>,

    /// Directory of the file this configuration was read from
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_profile: default_profile(),
            execute_top_level: false,
            max_reference_depth: default_max_reference_depth(),
            profiles: BTreeMap::new(),
            base_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from `path`, or from `SQLWEAVE_CONFIG`, or from `sqlweave.toml`
    /// in the working directory, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing, or if the file
    /// cannot be read, parsed or validated.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let explicit = path.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        match explicit {
            Some(path) => Self::load_from(&path).await,
            None => {
                let path = PathBuf::from(CONFIG_FILE_NAME);
                if fs::try_exists(&path).await.unwrap_or(false) {
                    Self::load_from(&path).await
                } else {
                    tracing::debug!("No {CONFIG_FILE_NAME} found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate(path)?;

        tracing::debug!(path = %path.display(), profiles = config.profiles.len(), "Loaded config");
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: String| SqlweaveError::ConfigError {
            file: path.display().to_string(),
            reason,
        };
        if self.max_reference_depth == 0 {
            return Err(invalid("max_reference_depth must be at least 1".to_string()).into());
        }
        for (name, profile) in &self.profiles {
            if profile.kind == ProfileKind::Fixture && profile.path.is_none() {
                return Err(invalid(format!("profile '{name}' has kind \"fixture\" but no path")).into());
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            max_reference_depth: self.max_reference_depth,
            max_nesting_depth: MAX_NESTING_DEPTH,
        }
    }

    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            execute_top_level: self.execute_top_level,
            default_profile: self.default_profile.clone(),
        }
    }

    /// Build the data source for `profile`.
    ///
    /// A profile that is not configured falls back to a dry run when it is the
    /// default profile, so a bare checkout works without any configuration.
    ///
    /// # Errors
    ///
    /// [`SqlweaveError::ProfileNotFound`] for any other unknown profile, or the
    /// error from loading a fixture file.
    pub async fn data_source(&self, profile: &str) -> Result<Arc<dyn DataSource>> {
        let Some(config) = self.profiles.get(profile) else {
            if profile == self.default_profile {
                tracing::debug!(profile, "Profile not configured, using dry run");
                return Ok(Arc::new(DryRunDataSource));
            }
            return Err(SqlweaveError::ProfileNotFound {
                name: profile.to_string(),
            }
            .into());
        };

        match config.kind {
            ProfileKind::DryRun => Ok(Arc::new(DryRunDataSource)),
            ProfileKind::Fixture => {
                let path = config.path.as_deref().ok_or_else(|| SqlweaveError::ConfigError {
                    file: CONFIG_FILE_NAME.to_string(),
                    reason: format!("profile '{profile}' has kind \"fixture\" but no path"),
                })?;
                let path = match &self.base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.to_path_buf(),
                };
                Ok(Arc::new(FixtureDataSource::load(&path).await?))
            }
        }
    }
}
