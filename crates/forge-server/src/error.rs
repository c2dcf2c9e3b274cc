//! HTTP mapping of conversion errors.
//!
//! Client errors carry their own message. Internal errors are logged with
//! full detail and answered with a generic message, so builder output, file
//! paths and stack traces never reach the caller.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use onnx_forge::ForgeError;
use serde_json::json;
use tracing::error;

/// Message returned for every internal failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error during model conversion";

/// Seconds a `Busy` caller is asked to wait.
const BUSY_RETRY_AFTER: &str = "30";

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError(pub ForgeError);

impl From<ForgeError> for ApiError {
    fn from(err: ForgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if err.is_client_visible() {
            err.to_string()
        } else {
            error!(error = %err, code = err.code(), "conversion failed");
            INTERNAL_ERROR_MESSAGE.to_owned()
        };

        let mut response =
            (status, Json(json!({ "error": message, "code": err.code() }))).into_response();
        if matches!(err, ForgeError::Busy { .. }) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static(BUSY_RETRY_AFTER));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onnx_forge::ValidationErrorKind;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_is_visible() {
        let err = ForgeError::validation(ValidationErrorKind::MissingToken, "token parameter is required");
        let response = ApiError(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "token parameter is required");
        assert_eq!(body["code"], "MissingToken");
    }

    #[tokio::test]
    async fn test_internal_error_is_generic() {
        let err = ForgeError::ConversionFailed {
            message: "Traceback: /secret/path/builder.py line 12".into(),
        };
        let response = ApiError(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], INTERNAL_ERROR_MESSAGE);
        assert_eq!(body["code"], "InternalError");
    }

    #[tokio::test]
    async fn test_busy_sets_retry_after() {
        let response = ApiError(ForgeError::Busy { capacity: 2 }).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[RETRY_AFTER], "30");
        assert_eq!(body_json(response).await["code"], "Busy");
    }

    #[tokio::test]
    async fn test_status_codes() {
        let cases = [
            (ForgeError::Authentication { model_id: "m".into() }, 401),
            (ForgeError::UnsupportedModel { model_id: "m".into() }, 422),
            (ForgeError::Cancelled, 409),
            (ForgeError::JobNotFound { job_id: "j".into() }, 404),
            (ForgeError::Timeout(std::time::Duration::from_secs(1)), 408),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status().as_u16(), status);
        }
    }
}
