//! Test utilities for sqlweave
//!
//! This module provides helpers shared by unit and integration tests: a
//! scripted [`DataSource`] that records every query it receives, and one-time
//! tracing setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use sqlweave_cli::test_utils::RecordingDataSource;
//!
//! let source = Arc::new(RecordingDataSource::new().respond("users", vec![json!({ "id": 1 })]));
//! // hand `source.clone()` to an ExecutionEngine, then inspect `source.calls()`
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Mutex, Once, PoisonError};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::datasource::{DataSource, DataSourceError, QueryRequest, Rows};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG` when it is set, otherwise leaves logging off.
///
/// ```bash
/// RUST_LOG=sqlweave_cli=trace cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// A data source answering from scripted responses keyed by builder name.
///
/// Builders without a scripted response get an empty row set. The top-level
/// query (no builder) is keyed by `None`. Every request is recorded in
/// arrival order.
#[derive(Debug, Default)]
pub struct RecordingDataSource {
    responses: HashMap<Option<String>, Result<Rows, DataSourceError>>,
    calls: Mutex<Vec<QueryRequest>>,
}

impl RecordingDataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries from `builder` with `rows`.
    #[must_use]
    pub fn respond(mut self, builder: &str, rows: Rows) -> Self {
        self.responses.insert(Some(builder.to_string()), Ok(rows));
        self
    }

    /// Answer the top-level query with `rows`.
    #[must_use]
    pub fn respond_top_level(mut self, rows: Rows) -> Self {
        self.responses.insert(None, Ok(rows));
        self
    }

    /// Reject queries from `builder` with `message`.
    #[must_use]
    pub fn fail(mut self, builder: &str, message: &str) -> Self {
        self.responses.insert(Some(builder.to_string()), Err(DataSourceError::new(message)));
        self
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<QueryRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Requests received for one builder.
    pub fn calls_for(&self, builder: &str) -> Vec<QueryRequest> {
        self.calls().into_iter().filter(|call| call.builder.as_deref() == Some(builder)).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl DataSource for RecordingDataSource {
    fn execute(&self, request: QueryRequest) -> BoxFuture<'_, Result<Rows, DataSourceError>> {
        async move {
            let response =
                self.responses.get(&request.builder).cloned().unwrap_or_else(|| Ok(Vec::new()));
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(request);
            response
        }
        .boxed()
    }
}
