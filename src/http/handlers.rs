use super::state::AppState;
use crate::capture::{FileSource, RecordingKind};
use crate::nats::{RecordingEvent, RecordingEventMessage};
use crate::recorder::{ChunkRecorder, RecorderConfig, RecorderError};
use crate::upload::TransportFactory;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Media file to record from
    pub source_path: String,

    /// Recording kind (default from config)
    pub kind: Option<RecordingKind>,

    /// Optional recording ID (if not provided, generate UUID)
    pub recording_id: Option<Uuid>,

    /// Chunk emission interval in milliseconds (default from config)
    pub timeslice_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartRecordingResponse {
    pub recording_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopRecordingResponse {
    pub recording_id: Uuid,
    pub status: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelRecordingResponse {
    pub recording_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn recorder_error_response(err: &RecorderError) -> Response {
    let status = match err {
        RecorderError::NoMediaSource | RecorderError::Capture(_) => StatusCode::BAD_REQUEST,
        RecorderError::AlreadyRecording
        | RecorderError::NotRecording
        | RecorderError::Cancelled => StatusCode::CONFLICT,
        RecorderError::NoData => StatusCode::UNPROCESSABLE_ENTITY,
        RecorderError::FlushTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RecorderError::TransportInit(_)
        | RecorderError::PartUpload { .. }
        | RecorderError::DirectUpload(_)
        | RecorderError::Completion(_) => StatusCode::BAD_GATEWAY,
    };

    error_response(status, err.to_string())
}

fn not_found(recording_id: Uuid) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Recording {} not found", recording_id),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recordings/start
/// Start recording a media file into storage
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> Response {
    let recording_id = req.recording_id.unwrap_or_else(Uuid::new_v4);

    info!("Starting recording {} from {}", recording_id, req.source_path);

    let source_path = shellexpand::tilde(&req.source_path).into_owned();
    let source = match FileSource::open(&source_path).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open media source: {:#}", e);
            return error_response(StatusCode::BAD_REQUEST, format!("{:#}", e));
        }
    };

    let mut config = RecorderConfig::from(state.recorder.as_ref());
    if let Some(kind) = req.kind {
        config.kind = kind;
    }
    if let Some(timeslice_ms) = req.timeslice_ms {
        config.timeslice = Duration::from_millis(timeslice_ms);
    }

    let transport = match TransportFactory::create(&state.storage, config.part_size) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to create upload transport: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
        }
    };

    let recorder = Arc::new(
        ChunkRecorder::new(config, transport).with_callbacks(state.event_callbacks(recording_id)),
    );

    // Claim the id before starting so concurrent requests cannot both win it
    {
        let mut recordings = state.recordings.write().await;
        match recordings.entry(recording_id) {
            Entry::Occupied(_) => {
                return error_response(
                    StatusCode::CONFLICT,
                    format!("Recording {} is already in progress", recording_id),
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&recorder));
            }
        }
    }

    if let Err(e) = recorder.start_with_id(Box::new(source), recording_id).await {
        state.forget(recording_id, &recorder).await;
        return recorder_error_response(&e);
    }

    state
        .publish(RecordingEventMessage::new(recording_id, RecordingEvent::Started))
        .await;

    info!("Recording {} started", recording_id);

    (
        StatusCode::OK,
        Json(StartRecordingResponse {
            recording_id,
            status: "recording".to_string(),
            message: format!("Recording {} started", recording_id),
        }),
    )
        .into_response()
}

/// POST /recordings/:recording_id/stop
/// Stop a recording and finalize its upload
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(recording_id): Path<Uuid>,
) -> Response {
    info!("Stopping recording {}", recording_id);

    // Stays registered while finalizing so status and cancel still reach it
    let recorder = {
        let recordings = state.recordings.read().await;
        recordings.get(&recording_id).cloned()
    };

    let Some(recorder) = recorder else {
        return not_found(recording_id);
    };

    let result = recorder.stop().await;
    if !matches!(result, Err(RecorderError::NotRecording)) {
        state.forget(recording_id, &recorder).await;
    }

    match result {
        Ok(url) => {
            state
                .publish(RecordingEventMessage::completed(recording_id, url.clone()))
                .await;

            (
                StatusCode::OK,
                Json(StopRecordingResponse {
                    recording_id,
                    status: "completed".to_string(),
                    url,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop recording {}: {}", recording_id, e);
            recorder_error_response(&e)
        }
    }
}

/// POST /recordings/:recording_id/cancel
/// Discard a recording without uploading the rest
pub async fn cancel_recording(
    State(state): State<AppState>,
    Path(recording_id): Path<Uuid>,
) -> Response {
    let recorder = {
        let mut recordings = state.recordings.write().await;
        recordings.remove(&recording_id)
    };

    let Some(recorder) = recorder else {
        return not_found(recording_id);
    };

    recorder.cancel().await;

    state
        .publish(RecordingEventMessage::new(recording_id, RecordingEvent::Cancelled))
        .await;

    (
        StatusCode::OK,
        Json(CancelRecordingResponse {
            recording_id,
            status: "cancelled".to_string(),
        }),
    )
        .into_response()
}

/// GET /recordings/:recording_id/status
/// Get status of a recording
pub async fn get_recording_status(
    State(state): State<AppState>,
    Path(recording_id): Path<Uuid>,
) -> Response {
    let recordings = state.recordings.read().await;

    match recordings.get(&recording_id) {
        Some(recorder) => (StatusCode::OK, Json(recorder.status().await)).into_response(),
        None => not_found(recording_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
