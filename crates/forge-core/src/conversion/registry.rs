//! Thread-safe registry of in-flight conversion jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::types::{JobSnapshot, JobState};
use crate::cancel::CancellationToken;

struct JobEntry {
    snapshot: JobSnapshot,
    cancel_token: CancellationToken,
}

/// Tracks every admitted job until it reaches a terminal state.
#[derive(Default)]
pub struct JobRegistry {
    state: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and its cancellation token.
    pub fn insert(&self, snapshot: JobSnapshot, cancel_token: CancellationToken) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.insert(
            snapshot.job_id.clone(),
            JobEntry {
                snapshot,
                cancel_token,
            },
        );
    }

    /// List all tracked jobs, oldest first.
    pub fn list_all(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().expect("registry lock poisoned");
        let mut jobs: Vec<JobSnapshot> = state.values().map(|e| e.snapshot.clone()).collect();
        jobs.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs
    }

    /// Update the state of a job.
    pub fn set_state(&self, job_id: &str, job_state: JobState) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        if let Some(entry) = state.get_mut(job_id) {
            entry.snapshot.state = job_state;
        }
    }

    /// Cancel a job that has not started streaming yet.
    pub fn cancel(&self, job_id: &str) -> CancelOutcome {
        let state = self.state.lock().expect("registry lock poisoned");
        match state.get(job_id) {
            None => CancelOutcome::NotFound,
            Some(entry) if entry.snapshot.state.is_past_cancellation() => {
                CancelOutcome::AlreadyStreaming
            }
            Some(entry) => {
                entry.cancel_token.cancel();
                CancelOutcome::Cancelled
            }
        }
    }

    /// Move a job to `Streaming` unless it was cancelled first.
    ///
    /// Shares the lock with [`cancel`](Self::cancel), so a job is either
    /// cancelled or streaming, never both.
    pub fn start_streaming(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().expect("registry lock poisoned");
        match state.get_mut(job_id) {
            Some(entry) if !entry.cancel_token.is_cancelled() => {
                entry.snapshot.state = JobState::Streaming;
                true
            }
            _ => false,
        }
    }

    /// Cancel every job that can still be cancelled.
    pub fn cancel_all(&self) -> usize {
        let state = self.state.lock().expect("registry lock poisoned");
        let mut cancelled = 0;
        for entry in state.values() {
            if !entry.snapshot.state.is_past_cancellation() {
                entry.cancel_token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Remove a job entry.
    pub fn remove(&self, job_id: &str) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.remove(job_id);
    }
}

/// Result of [`JobRegistry::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The archive is already being sent; the job runs to completion.
    AlreadyStreaming,
    NotFound,
}

/// Keeps a job registered for as long as it is held.
///
/// Dropping the lease removes the entry, so a job disappears from the
/// registry exactly when its resources are released.
pub struct JobLease {
    registry: Arc<JobRegistry>,
    job_id: String,
}

impl JobLease {
    pub fn register(
        registry: Arc<JobRegistry>,
        snapshot: JobSnapshot,
        cancel_token: CancellationToken,
    ) -> Self {
        let job_id = snapshot.job_id.clone();
        registry.insert(snapshot, cancel_token);
        Self { registry, job_id }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn set_state(&self, state: JobState) {
        self.registry.set_state(&self.job_id, state);
    }

    pub fn start_streaming(&self) -> bool {
        self.registry.start_streaming(&self.job_id)
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        self.registry.remove(&self.job_id);
    }
}
