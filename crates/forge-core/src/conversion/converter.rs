//! The conversion backend seam and its onnxruntime-genai implementation.
//!
//! `ModelConverter` is what the service drives; `GenaiBuilder` runs
//! `python -m onnxruntime_genai.models.builder` as a child process. Tests
//! substitute their own converter to exercise the job lifecycle without Python.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use super::classify::classify_failure;
use super::pipeline;
use super::types::ValidatedParams;
use crate::cancel::CancellationToken;
use crate::config::{BuilderConfig, ServiceSettings};
use crate::{ForgeError, Result};

/// A backend that turns a hub model into an ONNX output directory.
#[async_trait::async_trait]
pub trait ModelConverter: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Convert `params.model_id` into `output_dir`.
    ///
    /// `output_dir` does not exist yet; the converter creates it. Must return
    /// `ForgeError::Cancelled` promptly once `cancel_token` fires, and must
    /// not leave a process running after it returns or is dropped.
    async fn convert(
        &self,
        job_id: &str,
        params: &ValidatedParams,
        output_dir: &Path,
        cancel_token: &CancellationToken,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// onnxruntime-genai builder
// ---------------------------------------------------------------------------

/// Runs the onnxruntime-genai model builder as a subprocess.
#[derive(Debug, Clone)]
pub struct GenaiBuilder {
    python: PathBuf,
    builder_args: Vec<String>,
    cache_dir: PathBuf,
}

impl GenaiBuilder {
    pub fn new(python: impl Into<PathBuf>, builder_args: Vec<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            builder_args,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn from_settings(settings: &ServiceSettings) -> Self {
        let builder_args = if settings.builder_args.is_empty() {
            BuilderConfig::default_builder_args()
        } else {
            settings.builder_args.clone()
        };
        Self::new(&settings.python, builder_args, &settings.cache_dir)
    }

    /// Arguments passed to the interpreter. Never contains the token.
    pub fn argv(&self, params: &ValidatedParams, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.builder_args.iter().map(OsString::from).collect();
        args.extend([
            "--model_name".into(),
            params.model_id.as_str().into(),
            "--output".into(),
            output_dir.as_os_str().to_owned(),
            "--precision".into(),
            params.precision.as_str().into(),
            "--execution_provider".into(),
            params.execution_provider.as_str().into(),
            "--cache_dir".into(),
            self.cache_dir.as_os_str().to_owned(),
        ]);
        args
    }

    /// Environment for the child: token, shared cache, telemetry off.
    pub fn env(&self, params: &ValidatedParams) -> Vec<(&'static str, OsString)> {
        let mut env: Vec<(&'static str, OsString)> = BuilderConfig::TOKEN_ENV_VARS
            .iter()
            .map(|&name| (name, OsString::from(params.token.expose())))
            .collect();
        env.push((BuilderConfig::HUB_CACHE_ENV_VAR, self.cache_dir.as_os_str().to_owned()));
        env.push((BuilderConfig::TELEMETRY_ENV_VAR, OsString::from("1")));
        env
    }

    fn command(&self, params: &ValidatedParams, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.args(self.argv(params, output_dir))
            .envs(self.env(params))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl ModelConverter for GenaiBuilder {
    fn name(&self) -> &str {
        "onnxruntime-genai builder"
    }

    async fn convert(
        &self,
        job_id: &str,
        params: &ValidatedParams,
        output_dir: &Path,
        cancel_token: &CancellationToken,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| ForgeError::io("creating hub cache dir", &self.cache_dir, e))?;

        info!(
            "[{}] Running builder for {} ({}, {})",
            job_id, params.model_id, params.precision, params.execution_provider
        );

        let mut child = self
            .command(params, output_dir)
            .spawn()
            .map_err(|e| ForgeError::ConversionFailed {
                message: format!("Failed to spawn {}: {e}", self.python.display()),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ForgeError::ConversionFailed {
            message: "builder stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ForgeError::ConversionFailed {
            message: "builder stderr was not captured".to_string(),
        })?;

        let stdout_task = tokio::spawn(pipeline::log_lines(
            stdout,
            job_id.to_string(),
            "stdout",
            params.token.clone(),
        ));
        let stderr_task = tokio::spawn(pipeline::tail_lines(
            stderr,
            job_id.to_string(),
            "stderr",
            params.token.clone(),
            BuilderConfig::STDERR_TAIL_LINES,
        ));

        let status = match pipeline::wait_or_kill(&mut child, "builder", cancel_token).await {
            Ok(status) => status,
            Err(e) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(e);
            }
        };

        if let Err(e) = stdout_task.await {
            warn!("[{}] stdout reader failed: {}", job_id, e);
        }
        let stderr_tail = stderr_task.await.unwrap_or_default().join("\n");

        if status.success() {
            info!("[{}] Builder finished", job_id);
            return Ok(());
        }

        let err = classify_failure(&params.model_id, &status, &stderr_tail);
        warn!("[{}] Builder failed ({}): {}", job_id, err.code(), stderr_tail);
        Err(err)
    }
}
