//! Classification endpoint

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use cifar_classify::inference::{classify_batch, BatchResult, ImageInput, Persistence};
use cifar_classify::ClassifyError;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::SharedState;

/// Multipart field carrying the uploaded images
pub const IMAGES_FIELD: &str = "images";

/// Response for a classified batch
#[derive(Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub batch: BatchResult,
    /// Only present when images were persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Collect every file part named `images`.
///
/// Returns `None` when the request has no such part at all, which is
/// different from parts whose filename is empty.
async fn read_images(mut multipart: Multipart) -> Result<Option<Vec<ImageInput>>, ApiError> {
    let mut inputs = Vec::new();
    let mut found = false;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGES_FIELD) {
            continue;
        }
        // A file part with an empty filename may surface without one
        if field.file_name().is_none() && field.content_type().is_none() {
            debug!("Ignoring non-file '{}' field", IMAGES_FIELD);
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();

        found = true;
        let bytes = field.bytes().await?;
        inputs.push(ImageInput::new(filename, bytes.to_vec()));
    }

    Ok(found.then_some(inputs))
}

/// POST /predict - Classify the uploaded images
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let multipart = multipart.map_err(|_| ClassifyError::InputMissing)?;
    let inputs = read_images(multipart)
        .await?
        .ok_or(ClassifyError::InputMissing)?;

    let classifier = state.model.get().await?;

    let session = state
        .config
        .storage
        .persist
        .then(|| state.store.create_session_id());
    info!(
        "Classifying {} uploaded images{}",
        inputs.len(),
        session
            .as_ref()
            .map(|s| format!(" into session {}", s))
            .unwrap_or_default()
    );

    let worker_state = state.clone();
    let worker_session = session.clone();
    let batch = tokio::task::spawn_blocking(move || {
        let persistence = worker_session.as_ref().map(|session| Persistence {
            store: &worker_state.store,
            session,
        });
        classify_batch(
            &inputs,
            classifier.as_ref(),
            worker_state.preprocessor,
            persistence,
        )
    })
    .await?;

    Ok(Json(PredictResponse {
        batch,
        session_id: session.map(|s| s.to_string()),
    }))
}
