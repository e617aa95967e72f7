//! Error handling for sqlweave
//!
//! Library layers return their own `thiserror` types ([`CompileError`],
//! [`ExecutionError`], [`DataSourceError`]). The application layer works with
//! [`anyhow::Result`] and adds context with `.context(...)`. At the top of
//! the binary, [`user_friendly_error`] turns whatever came back into an
//! [`ErrorContext`]: the error plus optional details and a suggestion, printed
//! in colour.
//!
//! # Examples
//!
//! ```rust,no_run
//! use sqlweave_cli::core::{ErrorContext, SqlweaveError};
//!
//! ErrorContext::new(SqlweaveError::ProfileNotFound { name: "warehouse".into() })
//!     .with_suggestion("Add a [profiles.warehouse] table to sqlweave.toml")
//!     .display();
//! ```
//!
//! [`DataSourceError`]: crate::datasource::DataSourceError

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::datasource::DataSourceError;
use crate::templating::{CompileError, ExecutionError};

/// Application-level failures.
#[derive(Error, Debug, Clone)]
pub enum SqlweaveError {
    #[error("Template compilation failed: {message}")]
    CompileFailed {
        message: String,
    },

    #[error("Template execution failed: {message}")]
    ExecutionFailed {
        message: String,
    },

    #[error("Data source rejected the query: {message}")]
    DataSourceFailed {
        message: String,
    },

    #[error("Template not found: {path}")]
    TemplateNotFound {
        path: String,
    },

    #[error("Invalid parameter '{input}': {reason}")]
    InvalidParameter {
        input: String,
        reason: String,
    },

    #[error("Profile '{name}' is not configured")]
    ProfileNotFound {
        name: String,
    },

    #[error("Invalid configuration in {file}: {reason}")]
    ConfigError {
        file: String,
        reason: String,
    },

    #[error("IO error: {message}")]
    Io {
        message: String,
    },

    #[error("{message}")]
    Other {
        message: String,
    },
}

impl From<std::io::Error> for SqlweaveError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

/// An error with optional details and a suggestion for the user.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: SqlweaveError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: SqlweaveError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is
/// known.
///
/// The whole `anyhow` chain is searched, so library errors wrapped with
/// `.context(...)` are still recognised.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let outer = error.to_string();
    let details = |inner: String| (inner != outer).then_some(outer.clone());

    for cause in error.chain() {
        if let Some(err) = cause.downcast_ref::<SqlweaveError>() {
            return suggest_for(err.clone(), details(err.to_string()));
        }

        if let Some(err) = cause.downcast_ref::<CompileError>() {
            return with_optional_details(
                ErrorContext::new(SqlweaveError::CompileFailed {
                    message: err.format_with_context(),
                })
                .with_suggestion("Fix the template at the reported line:column (both 0-based)"),
                details(err.to_string()),
            );
        }

        if let Some(err) = cause.downcast_ref::<ExecutionError>() {
            return execution_context(err, details(err.to_string()));
        }

        if let Some(err) = cause.downcast_ref::<DataSourceError>() {
            return with_optional_details(
                ErrorContext::new(SqlweaveError::DataSourceFailed {
                    message: err.message.clone(),
                }),
                details(err.to_string()),
            );
        }

        if let Some(err) = cause.downcast_ref::<toml::de::Error>() {
            return ErrorContext::new(SqlweaveError::ConfigError {
                file: crate::constants::CONFIG_FILE_NAME.to_string(),
                reason: err.to_string(),
            })
            .with_suggestion("Check the TOML syntax: quotes, brackets and key names")
            .with_details(outer);
        }

        if let Some(err) = cause.downcast_ref::<std::io::Error>() {
            let context = ErrorContext::new(SqlweaveError::Io {
                message: err.to_string(),
            })
            .with_details(outer.clone());
            return match err.kind() {
                std::io::ErrorKind::NotFound => {
                    context.with_suggestion("Check that the file exists and the path is correct")
                }
                std::io::ErrorKind::PermissionDenied => {
                    context.with_suggestion("Check the file permissions")
                }
                _ => context,
            };
        }
    }

    let mut message = outer;
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {cause}", i + 1));
        }
    }
    ErrorContext::new(SqlweaveError::Other {
        message,
    })
}

fn with_optional_details(context: ErrorContext, details: Option<String>) -> ErrorContext {
    match details {
        Some(details) => context.with_details(details),
        None => context,
    }
}

fn suggest_for(error: SqlweaveError, details: Option<String>) -> ErrorContext {
    let suggestion = match &error {
        SqlweaveError::ProfileNotFound {
            name,
        } => Some(format!("Add a [profiles.{name}] table to {}", crate::constants::CONFIG_FILE_NAME)),
        SqlweaveError::InvalidParameter {
            ..
        } => Some("Parameters are passed as --param name=value".to_string()),
        SqlweaveError::TemplateNotFound {
            ..
        } => Some("Check the template path".to_string()),
        _ => None,
    };
    let context = with_optional_details(ErrorContext::new(error), details);
    match suggestion {
        Some(suggestion) => context.with_suggestion(suggestion),
        None => context,
    }
}

fn execution_context(error: &ExecutionError, details: Option<String>) -> ErrorContext {
    let context = match error {
        ExecutionError::DataSource(err) => ErrorContext::new(SqlweaveError::DataSourceFailed {
            message: err.message.clone(),
        }),
        ExecutionError::UndeclaredBuilder {
            ..
        } => ErrorContext::new(SqlweaveError::ExecutionFailed {
            message: error.to_string(),
        })
        .with_suggestion("Declare the builder with {% req <name> %} ... {% endreq %}"),
        ExecutionError::CircularReference {
            ..
        } => ErrorContext::new(SqlweaveError::ExecutionFailed {
            message: error.to_string(),
        })
        .with_suggestion("Builders must not read each other's value() in a loop"),
        ExecutionError::AlreadyMaterialized {
            ..
        } => ErrorContext::new(SqlweaveError::ExecutionFailed {
            message: error.to_string(),
        })
        .with_suggestion("Call limit() and offset() before the first value() call"),
        ExecutionError::TemplateNotFound {
            name,
        } => ErrorContext::new(SqlweaveError::TemplateNotFound {
            path: name.clone(),
        }),
        ExecutionError::Render {
            ..
        } => ErrorContext::new(SqlweaveError::ExecutionFailed {
            message: error.format_with_context(),
        }),
    };
    with_optional_details(context, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::Location;
    use anyhow::Context;

    #[test]
    fn test_compile_error_keeps_location() {
        let error = anyhow::Error::new(CompileError::new(
            "Only one main builder is allowed.",
            Location {
                line: 2,
                column: 7,
            },
        ));
        let context = user_friendly_error(error);
        assert_eq!(
            context.error.to_string(),
            "Template compilation failed: Only one main builder is allowed. (at 2:7)"
        );
        assert!(context.suggestion.is_some());
        assert!(context.details.is_none());
    }

    #[test]
    fn test_wrapped_data_source_error_is_found() {
        let result: Result<(), ExecutionError> =
            Err(ExecutionError::from(DataSourceError::new("relation \"users\" does not exist")));
        let error = result.context("Failed to render report.sql").unwrap_err();
        let context = user_friendly_error(error);
        assert_eq!(
            context.error.to_string(),
            "Data source rejected the query: relation \"users\" does not exist"
        );
        assert_eq!(context.details.as_deref(), Some("Failed to render report.sql"));
    }

    #[test]
    fn test_profile_suggestion() {
        let context = user_friendly_error(anyhow::Error::new(SqlweaveError::ProfileNotFound {
            name: "warehouse".to_string(),
        }));
        assert_eq!(context.suggestion.as_deref(), Some("Add a [profiles.warehouse] table to sqlweave.toml"));
    }

    #[test]
    fn test_unknown_error_lists_causes() {
        let error = anyhow::anyhow!("root cause").context("outer");
        let context = user_friendly_error(error);
        assert_eq!(context.error.to_string(), "outer\n\nCaused by:\n  1: root cause");
    }

    #[test]
    fn test_display_includes_details_and_suggestion() {
        let context = ErrorContext::new(SqlweaveError::Other {
            message: "boom".to_string(),
        })
        .with_details("while testing")
        .with_suggestion("try again");
        assert_eq!(context.to_string(), "boom\nDetails: while testing\nSuggestion: try again");
    }
}
