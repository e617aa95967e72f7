//! Data source adapters.
//!
//! The execution engine hands every materialized builder to a [`DataSource`]
//! as a single [`QueryRequest`]: the final query text together with the full
//! parameter table. Adapters bind `$n` tokens positionally and must refuse a
//! request whose tokens and bound values do not line up.
//!
//! The engine records where it placed every token, so a `$5` that is part of
//! a string literal or of an inlined builder result is never taken for one.
//!
//! Two adapters ship with the crate:
//!
//! - [`DryRunDataSource`] echoes the query back as a row, useful for
//!   inspecting what a template would send.
//! - [`FixtureDataSource`] answers from a JSON file mapping query text to
//!   rows, used by tests and local development.

mod dry_run;
mod fixture;

pub use dry_run::DryRunDataSource;
pub use fixture::FixtureDataSource;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::constants::TOKEN_PREFIX;
use crate::templating::ParameterTable;

/// Rows returned by a data source. Each row is usually a JSON object.
pub type Rows = Vec<Value>;

/// Deferred configuration collected on a builder handle before it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// One query submitted to a data source.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    /// Builder that produced the query, `None` for top-level text
    pub builder: Option<String>,
    pub text: String,
    pub parameters: ParameterTable,
    /// Byte offset in `text` of token `$n` at index `n - 1`
    #[serde(skip)]
    pub token_offsets: Vec<usize>,
    pub options: BuilderOptions,
    /// Active data profile
    pub profile: String,
}

/// Rejection reported by a data source. Forwarded to callers unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DataSourceError {
    pub message: String,
}

impl DataSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes rendered queries.
pub trait DataSource: Send + Sync {
    fn execute(&self, request: QueryRequest) -> BoxFuture<'_, Result<Rows, DataSourceError>>;
}

/// Check that every bound value has exactly one token, placed where the
/// engine recorded it.
///
/// # Errors
///
/// Returns a [`DataSourceError`] describing the first mismatch.
pub fn check_parameter_binding(request: &QueryRequest) -> Result<(), DataSourceError> {
    let bound = request.parameters.len();
    if request.token_offsets.len() != bound {
        return Err(DataSourceError::new(format!(
            "query places {} tokens but {bound} parameters are bound",
            request.token_offsets.len()
        )));
    }
    for (index, &offset) in request.token_offsets.iter().enumerate() {
        let token = format!("{TOKEN_PREFIX}{}", index + 1);
        let placed = request
            .text
            .get(offset..)
            .and_then(|rest| rest.strip_prefix(token.as_str()))
            .is_some_and(|after| !after.starts_with(|c: char| c.is_ascii_digit()));
        if !placed {
            return Err(DataSourceError::new(format!(
                "parameter {token} is not placed at byte {offset} of the query"
            )));
        }
    }
    Ok(())
}
