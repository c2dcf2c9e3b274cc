//! Centralized configuration for onnx-forge.
//!
//! Constants live on unit structs grouped by concern. The only runtime
//! configuration is [`ServiceSettings`], filled from the server's command line.

use std::path::PathBuf;
use std::time::Duration;

/// Service identity reported by the health endpoint.
pub struct ServiceConfig;

impl ServiceConfig {
    pub const SERVICE_NAME: &'static str = "onnx-forge";
    pub const HEALTHY_STATUS: &'static str = "healthy";
}

/// How the onnxruntime-genai builder is invoked.
pub struct BuilderConfig;

impl BuilderConfig {
    pub const DEFAULT_PYTHON: &'static str = "python3";
    pub const BUILDER_MODULE: &'static str = "onnxruntime_genai.models.builder";
    /// Environment variables the hub client reads the access token from.
    pub const TOKEN_ENV_VARS: &'static [&'static str] = &["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];
    pub const HUB_CACHE_ENV_VAR: &'static str = "HF_HUB_CACHE";
    pub const TELEMETRY_ENV_VAR: &'static str = "HF_HUB_DISABLE_TELEMETRY";
    /// Number of trailing stderr lines kept for failure classification.
    pub const STDERR_TAIL_LINES: usize = 64;

    /// Default leading arguments: `-m onnxruntime_genai.models.builder`.
    pub fn default_builder_args() -> Vec<String> {
        vec!["-m".to_string(), Self::BUILDER_MODULE.to_string()]
    }
}

/// Job admission and lifetime limits.
pub struct JobConfig;

impl JobConfig {
    pub const DEFAULT_MAX_CONCURRENT: usize = 1;
    pub const DEFAULT_MAX_QUEUED: usize = 4;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);
    /// Upper bounds accepted from the command line.
    pub const MAX_CONCURRENT_LIMIT: usize = 256;
    pub const MAX_QUEUED_LIMIT: usize = 4096;
    pub const JOB_DIR_PREFIX: &'static str = "job-";
    pub const OUTPUT_DIR_NAME: &'static str = "model_output";
}

/// Archive streaming.
pub struct ArchiveConfig;

impl ArchiveConfig {
    pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;
    pub const CONTENT_TYPE: &'static str = "application/zip";
    pub const EXTENSION: &'static str = "zip";
}

/// Runtime settings for a [`ConversionService`](crate::conversion::ConversionService).
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Root under which per-job temporary directories are created.
    pub work_dir: PathBuf,
    /// Hub download cache shared by all jobs.
    pub cache_dir: PathBuf,
    /// Python interpreter used to run the builder.
    pub python: PathBuf,
    /// Arguments placed before the builder's own flags.
    pub builder_args: Vec<String>,
    /// Conversions allowed to run at once.
    pub max_concurrent: usize,
    /// Admitted conversions allowed to wait for a free slot.
    pub max_queued: usize,
    /// Wall-clock limit for one conversion.
    pub job_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            cache_dir: default_cache_dir(),
            python: PathBuf::from(BuilderConfig::DEFAULT_PYTHON),
            builder_args: BuilderConfig::default_builder_args(),
            max_concurrent: JobConfig::DEFAULT_MAX_CONCURRENT,
            max_queued: JobConfig::DEFAULT_MAX_QUEUED,
            job_timeout: JobConfig::DEFAULT_TIMEOUT,
        }
    }
}

impl ServiceSettings {
    /// Conversion slots, at least one and no more than a semaphore can hold.
    pub fn slot_count(&self) -> usize {
        self.max_concurrent.clamp(1, tokio::sync::Semaphore::MAX_PERMITS)
    }

    /// Total number of jobs that may be admitted (running plus waiting).
    pub fn admission_capacity(&self) -> usize {
        self.slot_count().saturating_add(self.max_queued)
    }
}

/// `<system temp>/onnx-forge`
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join(ServiceConfig::SERVICE_NAME)
}

/// `<user cache dir>/huggingface/hub`, falling back to the work dir.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("huggingface").join("hub"))
        .unwrap_or_else(|| default_work_dir().join("hub-cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ServiceSettings::default();
        assert_eq!(settings.max_concurrent, 1);
        assert_eq!(settings.max_queued, 4);
        assert_eq!(settings.job_timeout, Duration::from_secs(1800));
        assert_eq!(
            settings.builder_args,
            vec!["-m", "onnxruntime_genai.models.builder"]
        );
        assert!(settings.work_dir.ends_with("onnx-forge"));
    }

    #[test]
    fn test_admission_capacity_never_zero_slots() {
        let settings = ServiceSettings {
            max_concurrent: 0,
            max_queued: 0,
            ..Default::default()
        };
        assert_eq!(settings.slot_count(), 1);
        assert_eq!(settings.admission_capacity(), 1);
    }

    #[test]
    fn test_huge_limits_saturate() {
        let settings = ServiceSettings {
            max_concurrent: usize::MAX,
            max_queued: usize::MAX,
            ..Default::default()
        };
        assert_eq!(settings.slot_count(), tokio::sync::Semaphore::MAX_PERMITS);
        assert_eq!(settings.admission_capacity(), usize::MAX);
    }
}
