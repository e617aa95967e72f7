//! Error types for template compilation and execution.
//!
//! Compile errors carry the exact message produced by the parser or by a
//! visitor, plus the location of the offending token when one is known.
//! Messages are stable: tooling matches on them verbatim, so the location is
//! kept out of `Display` and rendered separately by [`CompileError::format_with_context`].

use thiserror::Error;

use super::ast::Location;
use crate::datasource::DataSourceError;

/// A structural error found while compiling a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    /// Human readable description of the problem
    pub message: String,
    /// 0-based position of the offending token, if known
    pub location: Option<Location>,
}

impl CompileError {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn without_location(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Render the error with its location for terminal output.
    pub fn format_with_context(&self) -> String {
        match self.location {
            Some(location) => format!("{} (at {})", self.message, location),
            None => self.message.clone(),
        }
    }
}

/// A failure while executing a compiled template.
///
/// Data source failures are forwarded untouched so callers see the adapter's
/// own rejection reason.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error("Builder \"{name}\" is not declared{}", format_suggestions(.suggestions))]
    UndeclaredBuilder {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("Circular builder reference detected: {chain}")]
    CircularReference {
        chain: String,
    },

    #[error("Cannot call \"{method}\" on builder \"{name}\" after it has been materialized")]
    AlreadyMaterialized {
        name: String,
        method: String,
    },

    #[error("{message}")]
    Render {
        message: String,
        location: Location,
    },

    #[error("Template \"{name}\" not found")]
    TemplateNotFound {
        name: String,
    },
}

impl ExecutionError {
    pub(crate) fn render(message: impl Into<String>, location: Location) -> Self {
        Self::Render {
            message: message.into(),
            location,
        }
    }

    /// Render the error with any location or hint for terminal output.
    pub fn format_with_context(&self) -> String {
        match self {
            Self::Render {
                message,
                location,
            } => format!("{message} (at {location})"),
            other => other.to_string(),
        }
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(", did you mean: {}?", suggestions.join(", "))
    }
}
