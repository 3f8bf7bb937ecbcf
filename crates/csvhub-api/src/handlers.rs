//! HTTP handlers for the `/csvfile` and `/task-status` routes.

use crate::error::ApiError;
use crate::service::{JoinOutcome, UploadOutcome};
use crate::tracker::JoinTask;
use crate::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use csvhub_core::{CatalogEntry, CatalogError, FileSummary, JoinRequest, Records};
use serde::Deserialize;

/// Multipart field carrying the uploaded CSV
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    pub api_address: Option<String>,
    pub new_file_name: Option<String>,
    /// Key column on the stored file
    pub column1: Option<String>,
    /// Key column on the remote records
    pub column2: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value.ok_or_else(|| {
        ApiError(CatalogError::ValidationError(format!(
            "query parameter '{}' is required",
            name
        )))
    })
}

/// List stored files, newest first
pub async fn list_files(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<FileSummary>>, ApiError> {
    let files = state.service.list(params.skip, params.limit).await?;
    Ok(Json(files))
}

/// Rows of one file as an array of objects
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Records>, ApiError> {
    let dataset = state.service.get_dataset(id).await?;
    Ok(Json(dataset.into_records()))
}

/// Metadata of one file
pub async fn get_file_meta(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CatalogEntry>, ApiError> {
    Ok(Json(state.service.get_entry(id).await?))
}

/// One file serialized as CSV
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let exported = state.service.export_csv(id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_file_name(&exported.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        exported.content,
    )
        .into_response())
}

/// Upload a CSV file sent as multipart field `file`
pub async fn upload_file(
    State(state): State<AppState>,
    Query(params): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, ApiError> {
    let file_name = required(params.file_name, "file_name")?;

    let mut content = None;
    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        if field.name() == Some(UPLOAD_FIELD) {
            content = Some(field.bytes().await.map_err(invalid_multipart)?);
            break;
        }
    }
    let content = content.ok_or_else(|| {
        ApiError(CatalogError::ValidationError(format!(
            "multipart field '{}' is required",
            UPLOAD_FIELD
        )))
    })?;

    Ok(Json(state.service.upload(&file_name, &content).await?))
}

/// Join a stored file with a remote API and store the result
pub async fn join_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<JoinQuery>,
) -> Result<Json<JoinOutcome>, ApiError> {
    let request = JoinRequest {
        source_file_id: id,
        remote_address: required(params.api_address, "api_address")?,
        new_file_name: required(params.new_file_name, "new_file_name")?,
        left_key: required(params.column1, "column1")?,
        right_key: required(params.column2, "column2")?,
    };
    Ok(Json(state.service.join(request).await?))
}

/// State of a join task
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<JoinTask>, ApiError> {
    Ok(Json(state.service.task_status(&task_id)?))
}

fn invalid_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError(CatalogError::ValidationError(format!(
        "invalid multipart body: {}",
        e
    )))
}

/// File name usable inside a quoted `Content-Disposition` value.
fn header_safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
