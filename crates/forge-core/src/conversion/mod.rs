//! HuggingFace-to-ONNX conversion.
//!
//! `ConversionService` validates requests, admits them against a fixed
//! capacity, and drives a `ModelConverter` (by default the onnxruntime-genai
//! builder subprocess) inside a per-job temporary directory. The builder
//! output is zipped into a `ConversionArchive` that owns the directory until
//! it is dropped.

pub mod archive;
pub mod catalog;
pub mod classify;
pub mod converter;
mod job;
pub(crate) mod pipeline;
pub mod registry;
mod service;
mod types;
mod validate;

pub use archive::ArchiveSummary;
pub use catalog::{list_supported_models, model_catalog, Combination, ModelCatalog};
pub use classify::FailureKind;
pub use converter::{GenaiBuilder, ModelConverter};
pub use job::ConversionJob;
pub use registry::JobRegistry;
pub use service::{ConversionArchive, ConversionService};
pub use types::{
    json_kind, ConversionRequest, ExecutionProvider, HubToken, JobSnapshot, JobState, Precision,
    ValidatedParams, WireField,
};
pub use validate::validate;
