//! forge-server - HTTP front-end over the onnxruntime-genai model builder.
//!
//! Accepts conversion requests for HuggingFace models, runs the builder as a
//! subprocess and streams the resulting ONNX files back as a zip archive.

mod body;
mod error;
mod handler;
mod server;

use anyhow::Result;
use clap::Parser;
use onnx_forge::config::{default_cache_dir, default_work_dir, BuilderConfig, JobConfig};
use onnx_forge::{ConversionService, ServiceSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for cancelled jobs to clean up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "forge-server")]
#[command(about = "Convert HuggingFace models to ONNX with onnxruntime-genai")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "FORGE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "FORGE_PORT", default_value = "8080")]
    port: u16,

    /// Root for per-job temporary directories
    #[arg(long, env = "FORGE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Hub download cache shared by all jobs
    #[arg(long, env = "FORGE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Python interpreter that has onnxruntime-genai installed
    #[arg(long, env = "FORGE_PYTHON", default_value = BuilderConfig::DEFAULT_PYTHON)]
    python: PathBuf,

    /// Argument placed before the builder flags (repeatable; replaces `-m onnxruntime_genai.models.builder`)
    #[arg(long = "builder-arg", allow_hyphen_values = true)]
    builder_args: Vec<String>,

    /// Conversions allowed to run at once
    #[arg(long, env = "FORGE_MAX_CONCURRENT", default_value_t = JobConfig::DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,

    /// Conversions allowed to wait for a free slot
    #[arg(long, env = "FORGE_MAX_QUEUED", default_value_t = JobConfig::DEFAULT_MAX_QUEUED)]
    max_queued: usize,

    /// Wall-clock limit for one conversion, in seconds
    #[arg(long, env = "FORGE_JOB_TIMEOUT_SECS", default_value_t = JobConfig::DEFAULT_TIMEOUT.as_secs())]
    job_timeout_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "FORGE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            work_dir: self.work_dir.clone().unwrap_or_else(default_work_dir),
            cache_dir: self.cache_dir.clone().unwrap_or_else(default_cache_dir),
            python: self.python.clone(),
            builder_args: if self.builder_args.is_empty() {
                BuilderConfig::default_builder_args()
            } else {
                self.builder_args.clone()
            },
            max_concurrent: self.max_concurrent.clamp(1, JobConfig::MAX_CONCURRENT_LIMIT),
            max_queued: self.max_queued.min(JobConfig::MAX_QUEUED_LIMIT),
            job_timeout: Duration::from_secs(self.job_timeout_secs.max(1)),
        }
    }
}

fn init_logging(debug: bool, json: bool) {
    // RUST_LOG wins over --debug.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting forge-server");

    let settings = args.settings();
    info!(
        work_dir = %settings.work_dir.display(),
        cache_dir = %settings.cache_dir.display(),
        python = %settings.python.display(),
        max_concurrent = settings.max_concurrent,
        max_queued = settings.max_queued,
        job_timeout_secs = settings.job_timeout.as_secs(),
        "Conversion settings"
    );

    std::fs::create_dir_all(&settings.work_dir)?;
    let service = Arc::new(ConversionService::with_genai_builder(settings));

    let addr = server::start_server(service.clone(), &args.host, args.port).await?;

    // Machine-readable port line for supervisors and tests
    println!("FORGE_PORT={}", addr.port());

    info!("forge-server running on {}", addr);

    shutdown_signal().await;
    service.shutdown();
    wait_for_jobs(&service, SHUTDOWN_GRACE).await;

    info!("forge-server stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}

/// Wait until cancelled jobs have released their directories.
async fn wait_for_jobs(service: &ConversionService, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    while !service.list_jobs().is_empty() {
        if tokio::time::Instant::now() >= deadline {
            warn!(
                remaining = service.list_jobs().len(),
                "Jobs still running at shutdown"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
