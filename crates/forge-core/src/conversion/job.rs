//! Per-request working directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::JobConfig;
use crate::{ForgeError, Result};

/// Owns the uniquely named temporary directory of one conversion.
///
/// The directory, including builder output and any archive, is removed when
/// the job is dropped, whichever path the request took.
#[derive(Debug)]
pub struct ConversionJob {
    id: String,
    dir: TempDir,
}

impl ConversionJob {
    /// Create `<work_dir>/job-<id>-XXXXXX`.
    pub fn create(work_dir: &Path, id: &str) -> Result<Self> {
        std::fs::create_dir_all(work_dir)
            .map_err(|e| ForgeError::io("creating work dir", work_dir, e))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{}-", JobConfig::JOB_DIR_PREFIX, id))
            .tempdir_in(work_dir)
            .map_err(|e| ForgeError::io("creating job dir", work_dir, e))?;

        debug!("[{}] Created job dir {}", id, dir.path().display());
        Ok(Self {
            id: id.to_string(),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the builder writes its output.
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join(JobConfig::OUTPUT_DIR_NAME)
    }

    /// Remove the builder output once it has been archived.
    pub fn discard_output(&self) {
        let output = self.output_dir();
        if output.exists() {
            if let Err(e) = std::fs::remove_dir_all(&output) {
                warn!("[{}] Failed to remove builder output early: {}", self.id, e);
            }
        }
    }
}

impl Drop for ConversionJob {
    fn drop(&mut self) {
        debug!("[{}] Removing job dir {}", self.id, self.dir.path().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_job_dir_removed_on_drop() {
        let work = TempDir::new().unwrap();
        let job = ConversionJob::create(work.path(), "abc").unwrap();
        let path = job.path().to_path_buf();
        std::fs::create_dir_all(job.output_dir()).unwrap();
        std::fs::write(job.output_dir().join("model.onnx"), "x").unwrap();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("job-abc-"));

        drop(job);
        assert!(!path.exists());
    }

    #[test]
    fn test_work_dir_created_on_demand() {
        let root = TempDir::new().unwrap();
        let work = root.path().join("nested/work");
        let job = ConversionJob::create(&work, "j").unwrap();
        assert!(job.path().starts_with(&work));
    }

    #[test]
    fn test_jobs_get_distinct_dirs() {
        let work = TempDir::new().unwrap();
        let a = ConversionJob::create(work.path(), "same").unwrap();
        let b = ConversionJob::create(work.path(), "same").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_discard_output_keeps_job_dir() {
        let work = TempDir::new().unwrap();
        let job = ConversionJob::create(work.path(), "d").unwrap();
        std::fs::create_dir_all(job.output_dir()).unwrap();
        std::fs::write(job.path().join("bundle.zip"), "zip").unwrap();

        job.discard_output();
        assert!(!job.output_dir().exists());
        assert!(job.path().join("bundle.zip").exists());
    }
}
