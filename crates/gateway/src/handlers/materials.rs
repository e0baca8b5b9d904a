//! Material ingestion handlers
//!
//! Ingestion is fire-and-forget: the approval workflow triggers it and polls
//! the status endpoint; the end user is never blocked on indexing.

use crate::user::UserContext;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use studyforge_common::errors::{AppError, Result};
use uuid::Uuid;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestAccepted {
    pub material_id: Uuid,
    pub index_status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialStatus {
    pub material_id: Uuid,
    pub index_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<chrono::DateTime<chrono::FixedOffset>>,
}

/// Trigger ingestion of a material. Returns immediately; failures are
/// recorded on the material record, not surfaced here.
pub async fn trigger_ingest(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<IngestAccepted>)> {
    let material = state
        .repository
        .find_material_by_id(id)
        .await?
        .ok_or_else(|| AppError::MaterialNotFound { id: id.to_string() })?;

    let ingestion = state.ingestion.clone();
    tokio::spawn(async move {
        if let Err(e) = ingestion.ingest_material(id).await {
            tracing::error!(material_id = %id, error = %e, "Ingestion failed");
        }
    });

    tracing::info!(material_id = %id, title = %material.title, "Ingestion triggered");

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            material_id: id,
            index_status: "indexing".to_string(),
        }),
    ))
}

/// Poll a material's index status
pub async fn material_status(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> Result<Json<MaterialStatus>> {
    let material = state
        .repository
        .find_material_by_id(id)
        .await?
        .ok_or_else(|| AppError::MaterialNotFound { id: id.to_string() })?;

    Ok(Json(MaterialStatus {
        material_id: material.id,
        index_status: material.index_status,
        index_error: material.index_error,
        indexed_at: material.indexed_at,
    }))
}
