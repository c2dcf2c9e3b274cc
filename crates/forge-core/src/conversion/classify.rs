//! Classification of builder failures.
//!
//! The builder is a Python process; the only signals it leaves are its exit
//! status and stderr. These are mapped onto `ForgeError` so that callers see
//! authentication, unsupported-architecture and out-of-memory failures as
//! distinct errors rather than one opaque "conversion failed".

use std::process::ExitStatus;
use std::sync::LazyLock;

use regex::RegexSet;

use crate::error::ForgeError;

/// Broad reason a builder run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    UnsupportedModel,
    ResourceExhausted,
    Internal,
}

static RESOURCE_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)out of memory",
        r"(?i)\bmemoryerror\b",
        r"(?i)cannot allocate memory",
        r"(?i)std::bad_alloc",
        r"(?i)no space left on device",
    ])
    .unwrap()
});

static AUTH_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b40[13] client error",
        r"(?i)\bunauthorized\b",
        r"(?i)\bforbidden\b",
        r"(?i)gatedrepoerror",
        r"(?i)repositorynotfounderror",
        r"(?i)invalid (user )?token",
        r"(?i)access to model .* is restricted",
    ])
    .unwrap()
});

static UNSUPPORTED_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)not currently supported",
        r"(?i)unsupported (model )?architecture",
        r"(?i)notimplementederror",
        r"(?i)unrecognized configuration class",
    ])
    .unwrap()
});

/// Classify builder stderr.
///
/// Resource exhaustion is checked first: an OOM traceback often mentions
/// sizes that would otherwise trip the looser patterns.
pub fn classify_stderr(stderr: &str) -> FailureKind {
    if RESOURCE_PATTERNS.is_match(stderr) {
        FailureKind::ResourceExhausted
    } else if AUTH_PATTERNS.is_match(stderr) {
        FailureKind::Authentication
    } else if UNSUPPORTED_PATTERNS.is_match(stderr) {
        FailureKind::UnsupportedModel
    } else {
        FailureKind::Internal
    }
}

/// Whether the process was killed by SIGKILL, which is what the kernel OOM
/// killer sends.
fn killed_by_sigkill(status: &ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal() == Some(9)
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        false
    }
}

/// Build the error for a failed builder run.
///
/// `stderr` must already be redacted; internal-error messages embed its last
/// line and are logged server-side.
pub fn classify_failure(model_id: &str, status: &ExitStatus, stderr: &str) -> ForgeError {
    let kind = if killed_by_sigkill(status) {
        FailureKind::ResourceExhausted
    } else {
        classify_stderr(stderr)
    };

    match kind {
        FailureKind::Authentication => ForgeError::Authentication {
            model_id: model_id.to_string(),
        },
        FailureKind::UnsupportedModel => ForgeError::UnsupportedModel {
            model_id: model_id.to_string(),
        },
        FailureKind::ResourceExhausted => ForgeError::ResourceExhausted {
            message: format!("builder exited with {status}: {}", last_line(stderr)),
        },
        FailureKind::Internal => ForgeError::ConversionFailed {
            message: format!("builder exited with {status}: {}", last_line(stderr)),
        },
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no stderr output")
}
