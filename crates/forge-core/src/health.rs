//! Liveness report.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::ServiceConfig;

/// Body of the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    /// RFC 3339, UTC
    pub timestamp: String,
}

/// Report liveness. Does not look at job state.
pub fn health() -> HealthStatus {
    health_at(Utc::now())
}

fn health_at(now: DateTime<Utc>) -> HealthStatus {
    HealthStatus {
        status: ServiceConfig::HEALTHY_STATUS,
        service: ServiceConfig::SERVICE_NAME,
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}
