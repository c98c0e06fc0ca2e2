//! HTTP API server for recording control
//!
//! This module provides a REST API for driving recordings:
//! - POST /recordings/start - Start recording a media file
//! - POST /recordings/:id/stop - Stop and finalize the upload
//! - POST /recordings/:id/cancel - Discard a recording
//! - GET /recordings/:id/status - Query recorder status
//! - GET /objects/* - Objects of the local store
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{
    CancelRecordingResponse, ErrorResponse, StartRecordingRequest, StartRecordingResponse,
    StopRecordingResponse,
};
pub use routes::create_router;
pub use state::AppState;
