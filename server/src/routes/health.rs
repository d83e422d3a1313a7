//! Health check and API index endpoints

use axum::{extract::State, Json};
use cifar_classify::CLASS_NAMES;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub model_loaded: bool,
    pub classes: Vec<&'static str>,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model: state.model.name().to_string(),
        model_loaded: state.model.is_loaded(),
        classes: CLASS_NAMES.to_vec(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET / - Describe the available endpoints
pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "CIFAR-10 Image Classification API",
        "endpoints": {
            "/predict": "POST - Classify images (multipart field 'images')",
            "/download/{session_id}": "GET - Download a session as a zip archive",
            "/sessions": "GET - List classification sessions",
            "/health": "GET - Health check",
            "/api/predict": "POST - Same as /predict",
            "/api/download/{session_id}": "GET - Same as /download/{session_id}",
            "/api/sessions": "GET - Same as /sessions",
            "/api/health": "GET - Same as /health"
        },
        "note": "Every endpoint is served both at the root and under /api"
    }))
}
