//! HTTP endpoints.
//!
//! Both analyze endpoints answer 200 with a JSON body whether the analysis
//! succeeded or not; the outcome is carried by the body.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use log::{info, warn};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::{
    AnalysisError, NoiseAnalysis, NoiseAnalyzer, NoiseResponse, Result, VoiceAnalyzer,
    VoiceResponse,
};

pub const SERVICE_NAME: &str = "AI Living Noise Solver";

/// Read-only resources shared by every request
pub struct AppState {
    pub voice: VoiceAnalyzer,
    /// `None` when the audio event model failed to load at startup
    pub noise: Option<NoiseAnalyzer>,
    /// Bounds the noise requests running or queued on the model
    inference_slots: Arc<Semaphore>,
    max_pending_inference: usize,
}

impl AppState {
    pub fn new(
        voice: VoiceAnalyzer,
        noise: Option<NoiseAnalyzer>,
        max_pending_inference: usize,
    ) -> Self {
        let max_pending_inference = max_pending_inference.max(1);
        Self {
            voice,
            noise,
            inference_slots: Arc::new(Semaphore::new(max_pending_inference)),
            max_pending_inference,
        }
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/voice/analyze", post(analyze_voice))
        .route("/noise/analyze", post(analyze_noise))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(addr: SocketAddr, state: Arc<AppState>, max_upload_bytes: usize) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("{} listening on {}", SERVICE_NAME, listener.local_addr()?);

    axum::serve(listener, router(state, max_upload_bytes))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn read_root() -> Json<Value> {
    Json(json!({ "message": format!("{} is running!", SERVICE_NAME) }))
}

async fn analyze_voice(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Json<VoiceResponse> {
    let outcome = match read_upload(multipart, "file").await {
        Ok(bytes) => run_blocking(move || state.voice.analyze(&bytes)).await,
        Err(err) => Err(err),
    };

    match &outcome {
        Ok(analysis) => info!(
            "voice: median {} Hz, std {} -> {}",
            analysis.median_pitch, analysis.pitch_std, analysis.categories.sound
        ),
        Err(err) => warn!("voice analysis failed: {}", err),
    }
    Json(outcome.into())
}

async fn analyze_noise(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Json<NoiseResponse> {
    let outcome = match read_upload(multipart, "audio_file").await {
        Ok(bytes) => score_noise(state, bytes).await,
        Err(err) => Err(err),
    };

    match &outcome {
        Ok(analysis) => info!(
            "noise: top label {:?}, {} dB",
            analysis.ranked.first().map(|r| r.label.as_str()),
            analysis.db
        ),
        Err(err) => warn!("noise analysis failed: {}", err),
    }
    Json(outcome.into())
}

/// Run the noise pipeline if a queue slot is free. The slot is held until
/// the blocking job finishes.
async fn score_noise(
    state: Arc<AppState>,
    bytes: Bytes,
) -> std::result::Result<NoiseAnalysis, AnalysisError> {
    if state.noise.is_none() {
        return Err(AnalysisError::ModelUnavailable);
    }
    let permit = state
        .inference_slots
        .clone()
        .try_acquire_owned()
        .map_err(|_| AnalysisError::Busy(state.max_pending_inference))?;

    run_blocking(move || {
        let _permit = permit;
        match &state.noise {
            Some(noise) => noise.analyze(&bytes),
            None => Err(AnalysisError::ModelUnavailable),
        }
    })
    .await
}

/// Pull the named file field out of a multipart body
async fn read_upload(
    multipart: std::result::Result<Multipart, MultipartRejection>,
    field_name: &str,
) -> std::result::Result<Bytes, AnalysisError> {
    let mut multipart = multipart.map_err(|e| AnalysisError::Upload(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AnalysisError::Upload(e.body_text()))?
    {
        if field.name() == Some(field_name) {
            return field
                .bytes()
                .await
                .map_err(|e| AnalysisError::Upload(e.body_text()));
        }
    }

    Err(AnalysisError::Upload(format!(
        "missing multipart field `{}`",
        field_name
    )))
}

/// Run a pipeline on the blocking pool. A panic inside it becomes an
/// `Internal` failure instead of tearing down the connection.
async fn run_blocking<T, F>(job: F) -> std::result::Result<T, AnalysisError>
where
    F: FnOnce() -> std::result::Result<T, AnalysisError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(outcome) => outcome,
        Err(join_err) => Err(join_err.into()),
    }
}
