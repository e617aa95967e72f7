//! Shared helpers for the integration suite.

#![allow(dead_code)]

use anyhow::{Context, Result};
use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Output of one `sqlweave` invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A temporary working directory holding templates, fixtures and an
/// optional `sqlweave.toml`.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("Failed to create temp dir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `relative`, creating parent directories.
    pub async fn write_file(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub async fn write_config(&self, content: &str) -> Result<PathBuf> {
        self.write_file("sqlweave.toml", content).await
    }

    /// Run the binary inside the project directory with a clean environment.
    pub fn run_sqlweave(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::cargo_bin("sqlweave")?
            .current_dir(self.dir.path())
            .env_remove("SQLWEAVE_CONFIG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .args(args)
            .output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The two-builder template used across the suite: `groups` reads the id
/// returned by `user`.
pub const USER_GROUPS_TEMPLATE: &str = "\
{% req user %}
select * from users where id = {{ params.userId }};
{% endreq %}

{% req groups main %}
select * from groups where owner = '{{ user.value()[0].id }}';
{% endreq %}
";
