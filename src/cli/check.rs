//! `sqlweave check`: compile a template without executing it.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::templating::{CompiledTemplate, Location, ParameterReference, TemplateCompiler};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Machine-readable report
    Json,
}

#[derive(Args)]
pub struct CheckCommand {
    /// Template file to compile
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct BuilderSummary<'a> {
    name: &'a str,
    main: bool,
    location: Location,
}

#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    template: String,
    builders: Vec<BuilderSummary<'a>>,
    parameters: &'a [ParameterReference],
    request_fields: Vec<String>,
}

impl<'a> CheckReport<'a> {
    fn new(path: &Path, template: &'a CompiledTemplate) -> Self {
        Self {
            template: path.display().to_string(),
            builders: template
                .builders()
                .iter()
                .map(|builder| BuilderSummary {
                    name: &builder.name,
                    main: builder.main,
                    location: builder.location,
                })
                .collect(),
            parameters: template.parameters(),
            request_fields: template.request_fields(),
        }
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {} compiles", "✓".green(), self.template);

        if self.builders.is_empty() {
            let _ = writeln!(out, "Builders: none");
        } else {
            let _ = writeln!(out, "Builders:");
            for builder in &self.builders {
                let marker = if builder.main {
                    format!(" {}", "main".bold())
                } else {
                    String::new()
                };
                let _ = writeln!(out, "  {}{marker} ({})", builder.name, builder.location);
            }
        }

        if self.parameters.is_empty() {
            let _ = writeln!(out, "Parameters: none");
        } else {
            let _ = writeln!(out, "Parameters:");
            for parameter in self.parameters {
                let locations: Vec<String> =
                    parameter.locations.iter().map(ToString::to_string).collect();
                let _ = writeln!(out, "  {} at {}", parameter.name, locations.join(", "));
            }
        }
        out
    }
}

/// Read and compile `path` with the configured compile options.
pub(super) async fn compile_file(path: &Path, config: &EngineConfig) -> Result<CompiledTemplate> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    TemplateCompiler::new(config.compile_options())
        .compile(&source)
        .with_context(|| format!("Failed to compile {}", path.display()))
}

impl CheckCommand {
    /// # Errors
    ///
    /// Returns read and compile errors.
    pub async fn execute(self, config: &EngineConfig) -> Result<()> {
        let template = compile_file(&self.template, config).await?;
        let report = CheckReport::new(&self.template, &template);

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => print!("{}", report.to_text()),
        }
        Ok(())
    }
}
