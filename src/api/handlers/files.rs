use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{default_limit, nullable, paginate};
use crate::api::identity::Owner;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated};
use crate::service::{NewFile, ServiceError};
use crate::storage::models::FileRecord;
use crate::{AppState, OwnerId};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub byte_size: u64,
    pub created_at: String,
    pub folder_id: Option<String>,
    pub id: String,
    pub mime_type: Option<String>,
    pub name: String,
    pub path: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateFileRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// `null` moves the file to the root; absent leaves it where it is.
    #[serde(default, deserialize_with = "nullable")]
    pub folder_id: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

// ============================================================================
// Handlers
// ============================================================================

/// Parts collected from an upload form.
#[derive(Default)]
struct UploadForm {
    content: Option<Bytes>,
    filename: Option<String>,
    part_type: Option<String>,
    name: Option<String>,
    folder_id: Option<String>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart, max_size: u64) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        let malformed = |e: MultipartError| ApiError::bad_request(format!("Malformed upload: {e}"));

        while let Some(part) = multipart.next_field().await.map_err(malformed)? {
            match part.name() {
                Some("file") => {
                    form.filename = part.file_name().map(str::to_owned);
                    form.part_type = part.content_type().map(str::to_owned);
                    let bytes = part.bytes().await.map_err(malformed)?;
                    if bytes.len() as u64 > max_size {
                        return Err(ApiError::payload_too_large(format!(
                            "Upload is larger than the {max_size} byte limit"
                        )));
                    }
                    form.content = Some(bytes);
                }
                Some("name") => form.name = Some(part.text().await.map_err(malformed)?),
                Some("folder_id") => {
                    let id = part.text().await.map_err(malformed)?;
                    form.folder_id = Some(id.trim().to_owned()).filter(|id| !id.is_empty());
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn into_new_file(self, owner: OwnerId) -> Result<NewFile, ApiError> {
        let content = self
            .content
            .ok_or_else(|| ApiError::bad_request("file field is required"))?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .or(self.filename)
            .ok_or_else(|| ApiError::bad_request("name is required when the file part has no filename"))?;
        let mime_type = self
            .part_type
            .filter(|ct| ct != "application/octet-stream")
            .or_else(|| mime_guess::from_path(&name).first().map(|m| m.to_string()));

        Ok(NewFile {
            folder_id: self.folder_id,
            owner,
            name,
            mime_type,
            content,
        })
    }
}

pub async fn create_file(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    mut multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let form = UploadForm::read(&mut multipart, state.config.max_upload_size).await?;
    let file = state.files.upload(form.into_new_file(owner)?).await?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.files.get(&id, owner)?;
    Ok(JSend::success(file_to_response(&file)))
}

/// Route: GET /files/:id/content
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (file, data) = state.files.download(&id, owner).await?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .as_deref()
            .and_then(|m| m.parse().ok())
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.byte_size));

    let filename = file.name.replace('"', "");
    if let Ok(value) = format!("attachment; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

pub async fn update_file(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateFileRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    if req.name.is_none() && req.folder_id.is_none() {
        return Err(ApiError::bad_request(
            "at least one field (name, folder_id) must be provided",
        ));
    }

    let mut file = state.files.get(&id, owner)?;
    // Rename and move commit separately; refuse a bad destination before
    // the rename lands.
    if let (Some(_), Some(folder_id)) = (&req.name, &req.folder_id) {
        state.files.check_destination(folder_id.as_deref(), owner)?;
    }
    if let Some(name) = req.name.as_deref() {
        file = state.files.rename(&id, name, owner).await?;
    }
    if let Some(folder_id) = req.folder_id {
        file = state.files.move_to(&id, folder_id.as_deref(), owner).await?;
    }

    tracing::debug!(file_id = %id, "Updated file");
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    match state.files.delete(&id, owner).await {
        Ok(()) => {}
        // The record is gone; the leftover object is logged for cleanup.
        Err(ServiceError::OrphanedStorageObject { path, source }) => {
            tracing::warn!(file_id = %id, path = %path, error = %source, "Failed to delete file from object storage");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(JSend::success(()))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    let files = state
        .files
        .list_in_folder(params.folder_id.as_deref().filter(|id| !id.is_empty()), owner)?;
    paginate(&files, params.limit, params.offset, |file| {
        Ok(file_to_response(file))
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        byte_size: file.byte_size,
        created_at: file.created_at.to_rfc3339(),
        folder_id: file.folder_id.clone(),
        id: file.id.clone(),
        mime_type: file.mime_type.clone(),
        name: file.name.clone(),
        path: file.path.clone(),
        updated_at: file.updated_at.to_rfc3339(),
    }
}
