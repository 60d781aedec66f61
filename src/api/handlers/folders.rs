use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::{default_limit, nullable, paginate};
use crate::api::identity::Owner;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated};
use crate::service::{FolderService, ServiceError};
use crate::storage::models::FolderRecord;
use crate::AppState;

/// Buffer between the archive writer task and the response body.
const ARCHIVE_PIPE_CAPACITY: usize = 64 * 1024;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FolderResponse {
    pub created_at: String,
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub path: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateFolderRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// `null` moves the folder to the root; absent leaves it where it is.
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListFoldersParams {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    AppJson(req): AppJson<CreateFolderRequest>,
) -> Result<Json<JSend<FolderResponse>>, ApiError> {
    let parent_id = req.parent_id.as_deref().filter(|id| !id.is_empty());
    let folder = state.folders.create(owner, &req.name, parent_id).await?;
    Ok(JSend::success(folder_to_response(&state.folders, &folder)?))
}

pub async fn get_folder(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<JSend<FolderResponse>>, ApiError> {
    let folder = state.folders.get(&id, owner)?;
    Ok(JSend::success(folder_to_response(&state.folders, &folder)?))
}

pub async fn list_folders(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    AppQuery(params): AppQuery<ListFoldersParams>,
) -> Result<Json<JSendPaginated<FolderResponse>>, ApiError> {
    let parent_id = params.parent_id.as_deref().filter(|id| !id.is_empty());
    let folders = state.folders.list(owner, parent_id)?;

    paginate(&folders, params.limit, params.offset, |folder| {
        folder_to_response(&state.folders, folder)
    })
}

pub async fn update_folder(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateFolderRequest>,
) -> Result<Json<JSend<FolderResponse>>, ApiError> {
    if req.name.is_none() && req.parent_id.is_none() {
        return Err(ApiError::bad_request(
            "at least one field (name, parent_id) must be provided",
        ));
    }

    let mut folder = state.folders.get(&id, owner)?;
    // Rename and move commit separately; refuse a bad destination before
    // the rename lands.
    if let (Some(_), Some(parent_id)) = (&req.name, &req.parent_id) {
        state.folders.check_move(&id, parent_id.as_deref(), owner)?;
    }
    if let Some(name) = req.name.as_deref() {
        folder = state.folders.rename(&id, name, owner).await?;
    }
    if let Some(parent_id) = req.parent_id {
        folder = state
            .folders
            .move_to(&id, parent_id.as_deref(), owner)
            .await?;
    }

    tracing::debug!(folder_id = %id, "Updated folder");
    Ok(JSend::success(folder_to_response(&state.folders, &folder)?))
}

pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    match state.folders.delete(&id, owner).await {
        Ok(()) => {}
        Err(ServiceError::OrphanedStorageObject { path, source }) => {
            tracing::warn!(folder_id = %id, path = %path, error = %source, "Failed to delete folder from object storage");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(JSend::success(()))
}

/// Stream a zip archive of the folder.
/// Route: GET /folders/:id/archive
pub async fn export_folder(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    // Checked up front so access errors still get a JSend response.
    let folder = state.folders.get(&id, owner)?;

    let (mut writer, reader) = tokio::io::duplex(ARCHIVE_PIPE_CAPACITY);
    let folders = state.folders.clone();
    tokio::spawn(async move {
        if let Err(e) = folders.export_zip(&id, owner, &mut writer).await {
            tracing::error!(folder_id = %id, error = %e, "Failed to stream folder archive");
        }
    });

    let mut response = (StatusCode::OK, Body::from_stream(ReaderStream::new(reader))).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );

    let filename = folder.name.replace('"', "");
    if let Ok(value) = format!("attachment; filename=\"{filename}.zip\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

// ============================================================================
// Helpers
// ============================================================================

fn folder_to_response(
    folders: &FolderService,
    folder: &FolderRecord,
) -> Result<FolderResponse, ApiError> {
    Ok(FolderResponse {
        created_at: folder.created_at.to_rfc3339(),
        id: folder.id.clone(),
        name: folder.name.clone(),
        parent_id: folder.parent_id.clone(),
        path: folders.resolver().resolve(&folder.id)?,
        updated_at: folder.updated_at.to_rfc3339(),
    })
}
