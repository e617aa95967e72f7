use anyhow::{Context, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::Path;

use super::{DataSource, DataSourceError, QueryRequest, Rows, check_parameter_binding};

/// Answers queries from canned rows keyed by exact query text.
///
/// Fixture files are JSON objects:
///
/// ```json
/// {
///   "select count(*) from user where id = $1;": [{ "count": 1 }]
/// }
/// ```
///
/// `limit` and `offset` from the builder are applied to the canned rows.
#[derive(Debug, Clone, Default)]
pub struct FixtureDataSource {
    fixtures: HashMap<String, Rows>,
}

impl FixtureDataSource {
    #[must_use]
    pub fn new(fixtures: HashMap<String, Rows>) -> Self {
        Self {
            fixtures,
        }
    }

    /// Load fixtures from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not a JSON object of row arrays.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fixture file: {}", path.display()))?;
        let fixtures: HashMap<String, Rows> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), queries = fixtures.len(), "Loaded fixtures");
        Ok(Self::new(fixtures))
    }

    #[must_use]
    pub fn with_query(mut self, text: impl Into<String>, rows: Rows) -> Self {
        self.fixtures.insert(text.into(), rows);
        self
    }
}

impl DataSource for FixtureDataSource {
    fn execute(&self, request: QueryRequest) -> BoxFuture<'_, Result<Rows, DataSourceError>> {
        async move {
            check_parameter_binding(&request)?;
            let rows = self.fixtures.get(&request.text).ok_or_else(|| {
                DataSourceError::new(format!("no fixture for query: {}", request.text))
            })?;

            let offset = request.options.offset.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
            let limit = request.options.limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
            Ok(rows.iter().skip(offset).take(limit).cloned().collect())
        }
        .boxed()
    }
}
