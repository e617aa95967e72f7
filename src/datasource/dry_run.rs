use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;

use super::{DataSource, DataSourceError, QueryRequest, Rows, check_parameter_binding};

/// Returns the query it was given instead of running it.
///
/// The single row has the shape `{ "query": text, "parameters": { "$1": .. } }`
/// plus `limit`/`offset` when the builder was configured with them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunDataSource;

impl DataSource for DryRunDataSource {
    fn execute(&self, request: QueryRequest) -> BoxFuture<'_, Result<Rows, DataSourceError>> {
        async move {
            check_parameter_binding(&request)?;
            tracing::debug!(
                builder = request.builder.as_deref().unwrap_or("<top-level>"),
                profile = %request.profile,
                "Dry run query"
            );

            let mut row = json!({
                "query": request.text,
                "parameters": request.parameters,
            });
            if let Some(limit) = request.options.limit {
                row["limit"] = json!(limit);
            }
            if let Some(offset) = request.options.offset {
                row["offset"] = json!(offset);
            }
            Ok(vec![row])
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::BuilderOptions;
    use crate::templating::ParameterTable;

    #[tokio::test]
    async fn test_echoes_query_and_parameters() {
        let mut parameters = ParameterTable::new();
        parameters.bind(json!("user-id"));
        let rows = DryRunDataSource
            .execute(QueryRequest {
                builder: Some("users".into()),
                text: "select * from users where id = $1".into(),
                parameters,
                token_offsets: vec![31],
                options: BuilderOptions {
                    limit: Some(10),
                    offset: None,
                },
                profile: "default".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![json!({
                "query": "select * from users where id = $1",
                "parameters": { "$1": "user-id" },
                "limit": 10,
            })]
        );
    }

    #[tokio::test]
    async fn test_rejects_mismatched_binding() {
        let err = DryRunDataSource
            .execute(QueryRequest {
                builder: None,
                text: "select $1".into(),
                parameters: ParameterTable::new(),
                token_offsets: vec![7],
                options: BuilderOptions::default(),
                profile: "default".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.message, "query places 1 tokens but 0 parameters are bound");
    }
}
