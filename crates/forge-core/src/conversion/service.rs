//! Conversion service orchestrating admission, execution and packaging.
//!
//! Admits jobs against a fixed capacity, runs each one in a spawned task
//! holding a conversion slot, enforces the wall-clock limit, and hands back
//! a `ConversionArchive` that owns the job directory until the response body
//! that streams it is dropped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::archive::{self, ArchiveSummary};
use super::catalog::{self, ModelCatalog};
use super::converter::{GenaiBuilder, ModelConverter};
use super::job::ConversionJob;
use super::registry::{CancelOutcome, JobLease, JobRegistry};
use super::types::{ConversionRequest, JobSnapshot, JobState, ValidatedParams};
use super::validate;
use crate::cancel::CancellationToken;
use crate::config::ServiceSettings;
use crate::{ForgeError, Result};

/// Validates requests and runs conversions with bounded concurrency.
pub struct ConversionService {
    settings: ServiceSettings,
    converter: Arc<dyn ModelConverter>,
    registry: Arc<JobRegistry>,
    slots: Arc<Semaphore>,
    admitted: Arc<AtomicUsize>,
}

impl ConversionService {
    /// Create a service driving the given converter.
    pub fn new(settings: ServiceSettings, converter: Arc<dyn ModelConverter>) -> Self {
        let slots = Arc::new(Semaphore::new(settings.slot_count()));
        debug!(
            "Conversion service using {} converter ({} slot(s), capacity {})",
            converter.name(),
            settings.slot_count(),
            settings.admission_capacity()
        );
        Self {
            settings,
            converter,
            registry: Arc::new(JobRegistry::new()),
            slots,
            admitted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a service backed by the onnxruntime-genai builder.
    pub fn with_genai_builder(settings: ServiceSettings) -> Self {
        let builder = GenaiBuilder::from_settings(&settings);
        Self::new(settings, Arc::new(builder))
    }

    /// Validate a raw request.
    pub fn validate(&self, request: &ConversionRequest) -> Result<ValidatedParams> {
        validate::validate(request)
    }

    pub fn catalog(&self) -> ModelCatalog {
        catalog::model_catalog()
    }

    /// List in-flight jobs, oldest first.
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.registry.list_all()
    }

    /// Cancel an in-flight job.
    ///
    /// Jobs whose archive is already streaming are left alone and reported
    /// as `AlreadyStreaming`.
    pub fn cancel_job(&self, job_id: &str) -> Result<()> {
        match self.registry.cancel(job_id) {
            CancelOutcome::Cancelled => {
                info!("[{}] Cancellation requested", job_id);
                Ok(())
            }
            CancelOutcome::AlreadyStreaming => Err(ForgeError::AlreadyStreaming {
                job_id: job_id.to_string(),
            }),
            CancelOutcome::NotFound => Err(ForgeError::JobNotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    /// Graceful shutdown: cancel all in-flight jobs.
    pub fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            info!("Cancelled {} in-flight conversion(s) on shutdown", cancelled);
        }
    }

    /// Run a conversion and package its output.
    ///
    /// Fails fast with `Busy` when the admission capacity is used up. The
    /// job runs in its own task, so dropping this future does not stop it;
    /// cancel `cancel_token` to abandon it. On any error the job directory
    /// has already been removed when this returns.
    pub async fn execute(
        &self,
        params: ValidatedParams,
        cancel_token: CancellationToken,
    ) -> Result<ConversionArchive> {
        let ticket = AdmissionTicket::acquire(&self.admitted, self.settings.admission_capacity())?;

        let job_id = Uuid::new_v4().to_string();
        let lease = JobLease::register(
            self.registry.clone(),
            JobSnapshot {
                job_id: job_id.clone(),
                model_id: params.model_id.clone(),
                precision: params.precision,
                execution_provider: params.execution_provider,
                state: JobState::Queued,
                started_at: Utc::now(),
            },
            cancel_token.clone(),
        );

        info!(
            "[{}] Admitted conversion of {} ({}, {})",
            job_id, params.model_id, params.precision, params.execution_provider
        );

        let ctx = JobContext {
            job_id,
            settings: self.settings.clone(),
            converter: self.converter.clone(),
            slots: self.slots.clone(),
        };

        match tokio::spawn(run_job(ctx, params, lease, ticket, cancel_token)).await {
            Ok(result) => result,
            Err(e) => Err(ForgeError::Other(format!("conversion task failed: {e}"))),
        }
    }
}

/// Counts a job against the admission capacity while held.
struct AdmissionTicket {
    admitted: Arc<AtomicUsize>,
}

impl AdmissionTicket {
    fn acquire(admitted: &Arc<AtomicUsize>, capacity: usize) -> Result<Self> {
        admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|_| ForgeError::Busy { capacity })?;
        Ok(Self {
            admitted: admitted.clone(),
        })
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.admitted.fetch_sub(1, Ordering::SeqCst);
    }
}

struct JobContext {
    job_id: String,
    settings: ServiceSettings,
    converter: Arc<dyn ModelConverter>,
    slots: Arc<Semaphore>,
}

struct BuiltArchive {
    job: ConversionJob,
    path: PathBuf,
    download_name: String,
    summary: ArchiveSummary,
}

async fn run_job(
    ctx: JobContext,
    params: ValidatedParams,
    lease: JobLease,
    _ticket: AdmissionTicket,
    cancel_token: CancellationToken,
) -> Result<ConversionArchive> {
    match drive_job(&ctx, &params, &lease, &cancel_token).await {
        Ok(built) => {
            info!(
                "[{}] Archive ready: {} ({} files, {} -> {} bytes)",
                ctx.job_id,
                built.download_name,
                built.summary.files,
                built.summary.input_bytes,
                built.summary.archive_bytes
            );
            Ok(ConversionArchive {
                path: built.path,
                download_name: built.download_name,
                summary: built.summary,
                lease,
                job: built.job,
            })
        }
        Err(e) => {
            let state = if matches!(e, ForgeError::Cancelled) {
                JobState::Cancelled
            } else {
                JobState::Failed
            };
            lease.set_state(state);
            warn!("[{}] Conversion of {} ended: {}", ctx.job_id, params.model_id, e);
            Err(e)
        }
    }
}

async fn drive_job(
    ctx: &JobContext,
    params: &ValidatedParams,
    lease: &JobLease,
    cancel_token: &CancellationToken,
) -> Result<BuiltArchive> {
    let _permit = tokio::select! {
        permit = ctx.slots.clone().acquire_owned() => permit
            .map_err(|_| ForgeError::Other("conversion slots closed".to_string()))?,
        _ = cancel_token.cancelled() => return Err(ForgeError::Cancelled),
    };
    cancel_token.check()?;

    let job = ConversionJob::create(&ctx.settings.work_dir, &ctx.job_id)?;
    lease.set_state(JobState::Converting);

    let output_dir = job.output_dir();
    let conversion = ctx
        .converter
        .convert(&ctx.job_id, params, &output_dir, cancel_token);
    match tokio::time::timeout(ctx.settings.job_timeout, conversion).await {
        Ok(result) => result?,
        Err(_) => return Err(ForgeError::Timeout(ctx.settings.job_timeout)),
    }
    cancel_token.check()?;

    if !archive::has_output(&output_dir) {
        return Err(ForgeError::ConversionFailed {
            message: format!("builder produced no output in {}", output_dir.display()),
        });
    }

    lease.set_state(JobState::Archiving);
    let download_name = params.archive_name();
    let archive_path = job.path().join(&download_name);
    let summary = {
        let source = output_dir.clone();
        let target = archive_path.clone();
        tokio::task::spawn_blocking(move || archive::build_archive(&source, &target))
            .await
            .map_err(|e| ForgeError::Other(format!("archive task failed: {e}")))??
    };
    job.discard_output();
    if !lease.start_streaming() {
        return Err(ForgeError::Cancelled);
    }

    Ok(BuiltArchive {
        job,
        path: archive_path,
        download_name,
        summary,
    })
}

/// A finished archive, ready to stream.
///
/// Owns the job directory and registry entry; both go away when this is
/// dropped.
pub struct ConversionArchive {
    path: PathBuf,
    download_name: String,
    summary: ArchiveSummary,
    lease: JobLease,
    job: ConversionJob,
}

impl ConversionArchive {
    pub fn job_id(&self) -> &str {
        self.lease.job_id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    /// Archive size in bytes.
    pub fn size(&self) -> u64 {
        self.summary.archive_bytes
    }

    pub fn summary(&self) -> ArchiveSummary {
        self.summary
    }

    /// Directory that is removed when the archive is dropped.
    pub fn job_dir(&self) -> &Path {
        self.job.path()
    }

    /// Open the archive for streaming.
    pub async fn open(&self) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| ForgeError::io("opening archive", &self.path, e))
    }
}

impl std::fmt::Debug for ConversionArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionArchive")
            .field("job_id", &self.job_id())
            .field("download_name", &self.download_name)
            .field("summary", &self.summary)
            .finish()
    }
}

impl Drop for ConversionArchive {
    fn drop(&mut self) {
        self.lease.set_state(JobState::Done);
        info!("[{}] Released {}", self.lease.job_id(), self.download_name);
    }
}
