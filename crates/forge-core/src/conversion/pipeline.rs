//! Shared subprocess utilities for the builder pipeline.
//!
//! Provides helpers for draining a child's output pipes while the child runs
//! and for waiting on it under a cancellation token.

use std::collections::VecDeque;
use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tracing::{debug, warn};

use super::types::HubToken;
use crate::cancel::CancellationToken;
use crate::{ForgeError, Result};

// ---------------------------------------------------------------------------
// Subprocess output streaming
// ---------------------------------------------------------------------------

/// Log every line of a pipe at debug level until EOF.
///
/// Lines are redacted before logging.
pub async fn log_lines<R>(pipe: R, job_id: String, stream: &'static str, token: HubToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => debug!("[{}] {}: {}", job_id, stream, token.redact(&line)),
            Ok(None) => break,
            Err(e) => {
                warn!("[{}] error reading builder {}: {}", job_id, stream, e);
                break;
            }
        }
    }
}

/// Read a pipe to EOF, logging each line and keeping the last `limit` lines.
///
/// Returned lines are redacted.
pub async fn tail_lines<R>(
    pipe: R,
    job_id: String,
    stream: &'static str,
    token: HubToken,
    limit: usize,
) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe).lines();
    let mut tail = VecDeque::with_capacity(limit);
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                let line = token.redact(&line);
                debug!("[{}] {}: {}", job_id, stream, line);
                if tail.len() == limit {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("[{}] error reading builder {}: {}", job_id, stream, e);
                break;
            }
        }
    }
    tail.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Process exit handling
// ---------------------------------------------------------------------------

/// Wait for a child to exit, killing it if the token is cancelled first.
pub async fn wait_or_kill(
    child: &mut Child,
    process_name: &str,
    cancel_token: &CancellationToken,
) -> Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status.map_err(|e| ForgeError::ConversionFailed {
            message: format!("{process_name} process error: {e}"),
        }),
        _ = cancel_token.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", process_name, e);
            }
            Err(ForgeError::Cancelled)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_tail_lines_keeps_last_lines_redacted() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("for i in 1 2 3 4 5; do echo line$i secret-tok; done")
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();

        let tail = tail_lines(
            stdout,
            "job-test".into(),
            "stdout",
            HubToken::new("secret-tok"),
            2,
        )
        .await;
        child.wait().await.unwrap();

        assert_eq!(tail, vec!["line4 ***", "line5 ***"]);
    }

    #[tokio::test]
    async fn test_wait_or_kill_returns_status() {
        let mut child = Command::new("sh").arg("-c").arg("exit 3").spawn().unwrap();
        let status = wait_or_kill(&mut child, "sh", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_wait_or_kill_kills_on_cancel() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            wait_or_kill(&mut child, "sleep", &token),
        )
        .await
        .expect("cancellation should interrupt the wait");
        canceller.await.unwrap();

        assert!(matches!(result, Err(ForgeError::Cancelled)));
    }
}
