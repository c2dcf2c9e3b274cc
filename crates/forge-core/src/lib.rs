//! onnx-forge - Headless library behind the ONNX conversion service.
//!
//! Validates conversion requests, runs the onnxruntime-genai model builder
//! for them with bounded concurrency, and packages the output as a zip
//! archive. It has no HTTP dependency; `forge-server` puts it on the wire.
//!
//! # Example
//!
//! ```rust,ignore
//! use onnx_forge::{CancellationToken, ConversionRequest, ConversionService, ServiceSettings};
//!
//! #[tokio::main]
//! async fn main() -> onnx_forge::Result<()> {
//!     let service = ConversionService::with_genai_builder(ServiceSettings::default());
//!
//!     let request: ConversionRequest = serde_json::from_str(
//!         r#"{"model": "microsoft/phi-2", "precision": "int4", "token": "hf_..."}"#,
//!     ).unwrap();
//!     let params = service.validate(&request)?;
//!
//!     let archive = service.execute(params, CancellationToken::new()).await?;
//!     println!("{} ({} bytes)", archive.download_name(), archive.size());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod conversion;
pub mod error;
pub mod health;

pub use cancel::{CancelOnDrop, CancellationToken, CancelledError};
pub use config::ServiceSettings;
pub use conversion::{
    ConversionArchive, ConversionRequest, ConversionService, ExecutionProvider, HubToken,
    JobSnapshot, JobState, ModelConverter, Precision, ValidatedParams,
};
pub use error::{ForgeError, Result, ValidationErrorKind};
pub use health::{health, HealthStatus};
