//! Session listing and archive download endpoints

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use cifar_classify::session::archive_file_name;
use cifar_classify::{ClassifyError, SessionId};
use serde::Serialize;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::ApiError;
use crate::state::SharedState;

/// Response for listing sessions
#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<String>,
}

/// GET /sessions - List all classification sessions
pub async fn list_sessions(
    State(state): State<SharedState>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let store = state.store.clone();
    let sessions = tokio::task::spawn_blocking(move || store.list_sessions()).await??;
    Ok(Json(SessionListResponse { sessions }))
}

/// GET /download/{session_id} - Zip a session and stream it back
pub async fn download(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = SessionId::parse(&session_id)?;

    let store = state.store.clone();
    let archived = session.clone();
    let zip_path = tokio::task::spawn_blocking(move || store.archive(&archived)).await??;

    let file = fs::File::open(&zip_path).await.map_err(ClassifyError::from)?;
    let filename = archive_file_name(&session);
    info!("Serving {:?}", zip_path);

    let body = Body::from_stream(ReaderStream::new(file));
    let content_disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        body,
    ))
}
