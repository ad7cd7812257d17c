//! Supertonic TTS Server - HTTP API over a single ONNX session

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use supertonic_tts::{package_audio, run_job, RuntimeConfig, TextToSpeech, TtsError, TtsRequest};

/// API error type
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        let status = match &err {
            TtsError::InvalidInput(_)
            | TtsError::BatchMismatch { .. }
            | TtsError::UnsupportedBatch(_)
            | TtsError::Load(_) => StatusCode::BAD_REQUEST,
            TtsError::Engine(_) | TtsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("TTS request failed: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// The session runs one request at a time.
#[derive(Clone)]
struct AppState {
    tts: Arc<Mutex<TextToSpeech>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "supertonic_server=info,supertonic_tts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Supertonic TTS Server");

    let runtime = RuntimeConfig::from_env();
    info!("Models directory: {:?}", runtime.onnx_dir);
    let tts = supertonic_tts::load(&runtime)?;
    let state = AppState {
        tts: Arc::new(Mutex::new(tts)),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/tts", post(synthesize))
        .with_state(state);

    let host = std::env::var("TTS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = match std::env::var("TTS_PORT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid TTS_PORT='{}', falling back to 8000", raw);
                8000
            }
        },
        Err(_) => 8000,
    };
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn synthesize(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Response<Body>, ApiError> {
    let job = request.into_job()?;

    // Inference and encoding are CPU bound
    let audio = tokio::task::spawn_blocking(move || {
        let mut tts = state
            .tts
            .lock()
            .map_err(|_| TtsError::engine("TTS session lock poisoned"))?;
        let result = run_job(&mut tts, &job)?;
        package_audio(&result, &job.texts)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Synthesis task failed: {}", e)))??;

    info!("Returning {} ({} bytes)", audio.file_name, audio.body.len());
    Response::builder()
        .header(header::CONTENT_TYPE, audio.content_type)
        .header(header::CONTENT_DISPOSITION, audio.content_disposition())
        .body(Body::from(audio.body))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
