//! Request validation.
//!
//! Checks run in a fixed order (model, token, precision, execution provider)
//! and the first failure wins. Nothing touches the filesystem or spawns a
//! process before validation succeeds.

use regex::Regex;
use std::sync::LazyLock;

use super::types::{
    json_kind, ConversionRequest, ExecutionProvider, Precision, ValidatedParams, WireField,
};
use crate::error::{ForgeError, Result, ValidationErrorKind};

/// Hub repo id: `name` or `owner/name`.
static HUB_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*(/[A-Za-z0-9][A-Za-z0-9._-]*)?$").unwrap()
});

const MAX_MODEL_ID_LENGTH: usize = 256;

/// Validate a conversion request.
///
/// Absent `precision` / `execution_provider` fields take their defaults
/// (`fp32`, `cpu`); an explicit but unrecognized value is rejected.
pub fn validate(request: &ConversionRequest) -> Result<ValidatedParams> {
    let model_id = validate_model_id(request.model.as_ref())?;

    let token = match request.token.as_ref().map(WireField::text) {
        Some(Some(token)) if !token.is_blank() => token.clone(),
        Some(None) => {
            return Err(ForgeError::validation(
                ValidationErrorKind::MissingToken,
                "token parameter must be a string",
            ))
        }
        _ => {
            return Err(ForgeError::validation(
                ValidationErrorKind::MissingToken,
                "token parameter is required",
            ))
        }
    };

    let precision = match request.precision.as_ref() {
        None => Precision::default(),
        Some(value) => value
            .text()
            .and_then(|v| Precision::parse(v))
            .ok_or_else(|| {
                ForgeError::validation(
                    ValidationErrorKind::InvalidPrecision,
                    format!(
                        "Unsupported precision: {}. Supported: {}",
                        describe(value),
                        join(Precision::ALL.iter().map(|p| p.as_str()))
                    ),
                )
            })?,
    };

    let execution_provider = match request.execution_provider.as_ref() {
        None => ExecutionProvider::default(),
        Some(value) => value
            .text()
            .and_then(|v| ExecutionProvider::parse(v))
            .ok_or_else(|| {
                ForgeError::validation(
                    ValidationErrorKind::InvalidExecutionProvider,
                    format!(
                        "Unsupported execution_provider: {}. Supported: {}",
                        describe(value),
                        join(ExecutionProvider::ALL.iter().map(|p| p.as_str()))
                    ),
                )
            })?,
    };

    Ok(ValidatedParams {
        model_id,
        precision,
        execution_provider,
        token,
    })
}

fn validate_model_id(model: Option<&WireField<String>>) -> Result<String> {
    let model = match model {
        None => "",
        Some(WireField::Text(model)) => model.trim(),
        Some(WireField::Other(value)) => {
            return Err(ForgeError::validation(
                ValidationErrorKind::InvalidModel,
                format!("model parameter must be a string, got {}", json_kind(value)),
            ))
        }
    };
    if model.is_empty() {
        return Err(ForgeError::validation(
            ValidationErrorKind::InvalidModel,
            "model parameter is required",
        ));
    }

    if model.len() > MAX_MODEL_ID_LENGTH || model.contains("..") || !HUB_ID.is_match(model) {
        return Err(ForgeError::validation(
            ValidationErrorKind::InvalidModel,
            format!("model must be a hub id of the form 'name' or 'owner/name', got '{model}'"),
        ));
    }

    Ok(model.to_string())
}

/// A precision or provider value as the client sent it.
fn describe(value: &WireField<String>) -> String {
    match value {
        WireField::Text(text) => text.clone(),
        WireField::Other(other) => other.to_string(),
    }
}

fn join<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(", ")
}
