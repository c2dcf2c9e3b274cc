//! Types for conversion requests and jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ArchiveConfig;
use crate::error::{ForgeError, Result, ValidationErrorKind};

/// Numeric representation of the converted weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Fp32,
    Fp16,
    Int4,
    Int8,
}

impl Precision {
    pub const ALL: [Precision; 4] = [
        Precision::Fp32,
        Precision::Fp16,
        Precision::Int4,
        Precision::Int8,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Int4 => "int4",
            Precision::Int8 => "int8",
        }
    }

    /// Exact match against the wire names; no case folding.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime backend the exported model targets.
///
/// Passed through to the builder untouched; hardware availability is never
/// checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
    Dml,
}

impl ExecutionProvider {
    pub const ALL: [ExecutionProvider; 3] = [
        ExecutionProvider::Cpu,
        ExecutionProvider::Cuda,
        ExecutionProvider::Dml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
            ExecutionProvider::Dml => "dml",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hub access token.
///
/// Never serialized, and rendered as `***` by `Debug` so it cannot end up in
/// logs through a derived `Debug` on a containing type.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct HubToken(String);

impl HubToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token. Only the builder environment should see this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Replace every occurrence of the token in `text` with `***`.
    pub fn redact(&self, text: &str) -> String {
        if self.is_blank() {
            return text.to_string();
        }
        text.replace(self.0.as_str(), "***")
    }
}

impl std::fmt::Debug for HubToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HubToken(***)")
    }
}

/// A request field as received on the wire.
///
/// Fields are not typed by deserialization so that a number or object where
/// a string belongs is reported by validation, in check order, like any
/// other bad value.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireField<T> {
    Text(T),
    Other(serde_json::Value),
}

impl<T> WireField<T> {
    /// The value if it was a JSON string.
    pub fn text(&self) -> Option<&T> {
        match self {
            WireField::Text(value) => Some(value),
            WireField::Other(_) => None,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for WireField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireField::Text(value) => value.fmt(f),
            // Only the JSON type: the value may be a misplaced credential.
            WireField::Other(value) => write!(f, "<{}>", json_kind(value)),
        }
    }
}

impl From<&str> for WireField<String> {
    fn from(value: &str) -> Self {
        WireField::Text(value.to_string())
    }
}

impl From<HubToken> for WireField<HubToken> {
    fn from(token: HubToken) -> Self {
        WireField::Text(token)
    }
}

/// JSON type name of a value.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Conversion request as received on the wire.
///
/// Every field is optional so that validation, not deserialization, decides
/// which error a missing or wrong value produces. A JSON `null` counts as
/// absent and unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionRequest {
    #[serde(default)]
    pub model: Option<WireField<String>>,
    #[serde(default)]
    pub precision: Option<WireField<String>>,
    #[serde(default)]
    pub execution_provider: Option<WireField<String>>,
    #[serde(default)]
    pub token: Option<WireField<HubToken>>,
}

impl ConversionRequest {
    /// Build a request from a parsed JSON body, which must be an object.
    pub fn from_json(body: serde_json::Value) -> Result<Self> {
        if !body.is_object() {
            return Err(ForgeError::validation(
                ValidationErrorKind::MalformedBody,
                format!("Request body must be a JSON object, got {}", json_kind(&body)),
            ));
        }
        serde_json::from_value(body).map_err(|e| {
            ForgeError::validation(
                ValidationErrorKind::MalformedBody,
                format!("Request body could not be read: {e}"),
            )
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedParams {
    pub model_id: String,
    pub precision: Precision,
    pub execution_provider: ExecutionProvider,
    pub token: HubToken,
}

impl ValidatedParams {
    /// Download name of the archive for this request.
    ///
    /// `<model id, unsafe chars replaced by _>_<precision>_<execution provider>.zip`
    pub fn archive_name(&self) -> String {
        let stem: String = self
            .model_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "{}_{}_{}.{}",
            stem,
            self.precision,
            self.execution_provider,
            ArchiveConfig::EXTENSION
        )
    }
}

/// Position of an admitted job in its lifecycle.
///
/// Requests rejected by validation never become jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, waiting for a conversion slot
    Queued,
    /// Builder subprocess running
    Converting,
    /// Zipping the builder output
    Archiving,
    /// Archive handed to the response body
    Streaming,
    /// Response fully sent
    Done,
    /// Conversion or archiving failed
    Failed,
    /// Cancelled by request or client disconnect
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }

    /// Once the archive is being sent, the job can no longer be cancelled.
    pub fn is_past_cancellation(&self) -> bool {
        matches!(self, JobState::Streaming | JobState::Done)
    }
}

/// Public view of an in-flight job. Carries no credentials.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub model_id: String,
    pub precision: Precision,
    pub execution_provider: ExecutionProvider,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
}
