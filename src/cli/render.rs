//! `sqlweave render`: execute a template and print the result.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::check::compile_file;
use crate::config::EngineConfig;
use crate::core::SqlweaveError;
use crate::templating::{ExecutionContext, ExecutionEngine, UserInfo};

#[derive(Args)]
pub struct RenderCommand {
    /// Template file to execute
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Parameter as name=value; the value is parsed as JSON when possible
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// All parameters as one JSON object; --param entries override it
    #[arg(long, value_name = "JSON")]
    pub params_json: Option<String>,

    /// Name of the calling user, exposed as context.user.name
    #[arg(long)]
    pub user: Option<String>,

    /// Data profile to run against (defaults to the configured default)
    #[arg(long)]
    pub profile: Option<String>,
}

/// Split a `name=value` argument.
///
/// The value is parsed as JSON so `limit=10` binds a number and
/// `ids=[1,2]` binds an array; anything that is not valid JSON is taken as a
/// plain string.
///
/// # Errors
///
/// [`SqlweaveError::InvalidParameter`] when there is no `=` or the name is
/// empty.
pub fn parse_param(input: &str) -> Result<(String, Value), SqlweaveError> {
    let invalid = |reason: &str| SqlweaveError::InvalidParameter {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let (name, raw) = input.split_once('=').ok_or_else(|| invalid("expected name=value"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("parameter name is empty"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

impl RenderCommand {
    fn parameters(&self) -> Result<Map<String, Value>, SqlweaveError> {
        let mut parameters = match &self.params_json {
            Some(json) => match serde_json::from_str::<Value>(json) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(SqlweaveError::InvalidParameter {
                        input: json.clone(),
                        reason: "--params-json must be a JSON object".to_string(),
                    });
                }
                Err(e) => {
                    return Err(SqlweaveError::InvalidParameter {
                        input: json.clone(),
                        reason: e.to_string(),
                    });
                }
            },
            None => Map::new(),
        };
        for param in &self.params {
            let (name, value) = parse_param(param)?;
            parameters.insert(name, value);
        }
        Ok(parameters)
    }

    /// # Errors
    ///
    /// Returns argument, configuration, compile and execution errors.
    pub async fn execute(self, config: &EngineConfig) -> Result<()> {
        let parameters = self.parameters()?;
        let template = compile_file(&self.template, config).await?;

        let profile = self.profile.clone().unwrap_or_else(|| config.default_profile.clone());
        let data_source = config.data_source(&profile).await?;
        let engine = ExecutionEngine::with_options(data_source, config.engine_options());

        let mut context = ExecutionContext::new().with_parameters(parameters).with_profile(&profile);
        if let Some(user) = &self.user {
            context = context.with_user(UserInfo::new(user));
        }

        tracing::debug!(template = %self.template.display(), %profile, "Rendering template");
        let result = engine
            .execute(&template, context)
            .await
            .with_context(|| format!("Failed to render {}", self.template.display()))?;

        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(())
    }
}
