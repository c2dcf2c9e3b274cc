//! HTTP request handlers.

use crate::body::archive_body;
use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use onnx_forge::config::ArchiveConfig;
use onnx_forge::{CancellationToken, ConversionRequest, ForgeError, ValidationErrorKind};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(onnx_forge::health())
}

/// Catalog of supported architectures, precisions and providers.
pub async fn handle_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.catalog())
}

/// Convert a model and stream the resulting archive.
pub async fn handle_generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(malformed_body)?;
    let request = ConversionRequest::from_json(body)?;
    let params = state.service.validate(&request)?;

    // The guard cancels the job if this handler is dropped (client gone).
    let cancel_token = CancellationToken::new();
    let guard = cancel_token.drop_guard();
    let archive = state.service.execute(params, cancel_token).await?;
    guard.disarm();

    info!(
        job_id = archive.job_id(),
        filename = archive.download_name(),
        bytes = archive.size(),
        "streaming archive"
    );

    let file = archive.open().await?;
    let disposition = format!("attachment; filename=\"{}\"", archive.download_name());
    let size = archive.size();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, ArchiveConfig::CONTENT_TYPE)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, size)
        .body(archive_body(archive, file))
        .map_err(|e| ApiError(ForgeError::Other(format!("building response: {e}"))))
}

/// List in-flight jobs.
pub async fn handle_list_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "jobs": state.service.list_jobs() }))
}

/// Cancel an in-flight job.
pub async fn handle_cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.cancel_job(&job_id)?;
    Ok(Json(json!({ "cancelled": true, "job_id": job_id })))
}

/// Any route that does not exist.
pub async fn handle_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "endpoint not found" })),
    )
}

fn malformed_body(rejection: JsonRejection) -> ApiError {
    debug!(error = %rejection, "rejected request body");
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => "Content-Type must be application/json",
        JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
        _ => "Request body could not be read",
    };
    ApiError(ForgeError::validation(
        ValidationErrorKind::MalformedBody,
        message,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use onnx_forge::{ConversionService, ModelConverter, ServiceSettings, ValidatedParams};
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Writes a small model, or blocks until cancelled for `org/slow`.
    #[derive(Default)]
    struct StubConverter {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ModelConverter for StubConverter {
        fn name(&self) -> &str {
            "stub"
        }

        async fn convert(
            &self,
            _job_id: &str,
            params: &ValidatedParams,
            output_dir: &std::path::Path,
            cancel_token: &CancellationToken,
        ) -> onnx_forge::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(output_dir)?;
            if params.model_id == "org/slow" {
                cancel_token.cancelled().await;
                return Err(ForgeError::Cancelled);
            }
            std::fs::write(output_dir.join("model.onnx"), "graph")?;
            std::fs::write(output_dir.join("tokenizer.json"), "{}")?;
            Ok(())
        }
    }

    fn app(work: &TempDir) -> (axum::Router, Arc<ConversionService>) {
        let (router, service, _) = app_with_stub(work);
        (router, service)
    }

    fn app_with_stub(
        work: &TempDir,
    ) -> (axum::Router, Arc<ConversionService>, Arc<StubConverter>) {
        let settings = ServiceSettings {
            work_dir: work.path().join("jobs"),
            cache_dir: work.path().join("cache"),
            ..Default::default()
        };
        let stub = Arc::new(StubConverter::default());
        let service = Arc::new(ConversionService::new(settings, stub.clone()));
        let state = Arc::new(AppState {
            service: service.clone(),
        });
        (build_router(state), service, stub)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn job_dirs(work: &TempDir) -> usize {
        std::fs::read_dir(work.path().join("jobs"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_health() {
        let work = TempDir::new().unwrap();
        let (app, _) = app(&work);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "onnx-forge");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_models_lists_architectures_in_order() {
        let work = TempDir::new().unwrap();
        let (app, _) = app(&work);
        let response = app
            .oneshot(Request::get("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;

        let architectures: Vec<&str> = body["architectures"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(architectures, onnx_forge::conversion::list_supported_models());
    }

    #[tokio::test]
    async fn test_generate_streams_archive() {
        let work = TempDir::new().unwrap();
        let (app, service) = app(&work);
        let response = app
            .oneshot(post_json(
                "/generate",
                json!({"model": "microsoft/phi-2", "precision": "int4", "token": "hf_x"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"microsoft_phi-2_int4_cpu.zip\""
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
        let mut graph = String::new();
        zip.by_name("model.onnx")
            .unwrap()
            .read_to_string(&mut graph)
            .unwrap();
        assert_eq!(graph, "graph");

        assert_eq!(job_dirs(&work), 0);
        assert!(service.list_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_generate_validation_errors() {
        let cases = [
            (json!({"token": "hf_x"}), "InvalidModel"),
            (json!({"model": "  ", "token": "hf_x"}), "InvalidModel"),
            (json!({"model": "gpt2"}), "MissingToken"),
            (json!({"model": "gpt2", "token": ""}), "MissingToken"),
            (json!({"model": "gpt2", "token": "t", "precision": "FP16"}), "InvalidPrecision"),
            (
                json!({"model": "gpt2", "token": "t", "execution_provider": "tpu"}),
                "InvalidExecutionProvider",
            ),
            (json!({"model": 42, "token": "t"}), "InvalidModel"),
            (json!({"token": "t", "precision": 16}), "InvalidModel"),
            (json!({"model": "gpt2", "token": 123}), "MissingToken"),
            (json!({"model": "gpt2", "token": "t", "precision": 16}), "InvalidPrecision"),
            (
                json!({"model": "gpt2", "token": "t", "execution_provider": true}),
                "InvalidExecutionProvider",
            ),
            (json!(["gpt2", "fp32", "cpu", "t"]), "MalformedBody"),
        ];

        let work = TempDir::new().unwrap();
        let (app, _, stub) = app_with_stub(&work);
        for (body, code) in cases {
            let response = app.clone().oneshot(post_json("/generate", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{code}");
            assert_eq!(json_body(response).await["code"], code);
        }
        assert_eq!(job_dirs(&work), 0);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_requires_json_content_type() {
        let work = TempDir::new().unwrap();
        let (app, _) = app(&work);
        let request = Request::post("/generate")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("model=gpt2"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["code"], "MalformedBody");
        assert_eq!(body["error"], "Content-Type must be application/json");
    }

    #[tokio::test]
    async fn test_generate_rejects_invalid_json() {
        let work = TempDir::new().unwrap();
        let (app, _) = app(&work);
        let request = Request::post("/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "MalformedBody");
    }

    #[tokio::test]
    async fn test_cancel_in_flight_job() {
        let work = TempDir::new().unwrap();
        let (app, service) = app(&work);

        let generate = tokio::spawn(app.clone().oneshot(post_json(
            "/generate",
            json!({"model": "org/slow", "token": "hf_secret"}),
        )));

        let mut job_id = None;
        for _ in 0..200 {
            if let Some(job) = service.list_jobs().first() {
                job_id = Some(job.job_id.clone());
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let job_id = job_id.expect("job never registered");

        // Health stays responsive while a conversion is running.
        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let jobs = app
            .clone()
            .oneshot(Request::get("/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let jobs = json_body(jobs).await;
        assert_eq!(jobs["jobs"][0]["model_id"], "org/slow");
        assert!(!jobs.to_string().contains("hf_secret"));

        let cancel = app
            .clone()
            .oneshot(
                Request::post(format!("/jobs/{job_id}/cancel"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(cancel.status(), StatusCode::OK);
        assert_eq!(json_body(cancel).await["cancelled"], true);

        let response = generate.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["code"], "Cancelled");
        assert_eq!(job_dirs(&work), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_streaming_is_rejected() {
        let work = TempDir::new().unwrap();
        let (app, service) = app(&work);
        let response = app
            .clone()
            .oneshot(post_json(
                "/generate",
                json!({"model": "microsoft/phi-2", "token": "hf_x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The body has not been read yet, so the job is still streaming.
        let job_id = service.list_jobs()[0].job_id.clone();
        let cancel = app
            .oneshot(
                Request::post(format!("/jobs/{job_id}/cancel"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(cancel.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(cancel).await["code"], "AlreadyStreaming");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
        assert!(zip.by_name("model.onnx").is_ok());
        assert_eq!(job_dirs(&work), 0);
        assert!(service.list_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let work = TempDir::new().unwrap();
        let (app, _) = app(&work);
        let response = app
            .oneshot(
                Request::post("/jobs/does-not-exist/cancel")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "JobNotFound");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let work = TempDir::new().unwrap();
        let (app, _) = app(&work);
        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "endpoint not found");
    }
}
