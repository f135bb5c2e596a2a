use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::messaging::AttachmentInfo;
use crate::state::AppState;

use super::extract::PathParam;
use super::{data, Envelope};

#[derive(Serialize)]
pub struct AttachmentLink {
    pub url: String,
    pub expires_in: u64,
}

/// Accepts a single `file` field and returns the metadata to pass along with
/// the `file` or `image` message that references it.
pub async fn upload_attachment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<Envelope<AttachmentInfo>>)> {
    let mut multipart = multipart?;
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        warn!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("filename is required"))?;
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|err| {
            warn!(error = %err, "failed to read attachment bytes");
            AppError::bad_request(format!("failed to read file bytes: {err}"))
        })?;
        upload = Some((file_name, content_type, bytes.to_vec()));
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| AppError::bad_request("file field is required"))?;

    let attachment = state
        .messaging
        .upload_attachment(user.user_id, conversation_id, &file_name, content_type, bytes)
        .await?;

    tracing::info!(
        %conversation_id,
        user_id = %user.user_id,
        file_path = %attachment.file_path,
        file_size = attachment.file_size,
        "attachment uploaded"
    );
    Ok((StatusCode::CREATED, data(attachment)))
}

pub async fn attachment_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(message_id): PathParam<Uuid>,
) -> AppResult<Json<Envelope<AttachmentLink>>> {
    let ttl = state.attachment_url_ttl();
    let url = state
        .messaging
        .attachment_url(user.user_id, message_id, ttl)
        .await?;
    Ok(data(AttachmentLink {
        url,
        expires_in: ttl.as_secs(),
    }))
}
