use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::messaging::{MessageView, PageRequest, PostMessageInput};
use crate::state::AppState;

use super::extract::{JsonBody, PathParam, QueryParams};
use super::{data, Envelope};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

/// Plain page of messages; the read cursor is left untouched.
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
    QueryParams(query): QueryParams<PageQuery>,
) -> AppResult<Json<Envelope<Vec<MessageView>>>> {
    let messages = state.messaging.list_messages(
        user.user_id,
        conversation_id,
        PageRequest {
            limit: query.limit,
            offset: query.offset,
        },
    )?;
    Ok(data(messages))
}

pub async fn post_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<PostMessageInput>,
) -> AppResult<(StatusCode, Json<Envelope<MessageView>>)> {
    let message = state
        .messaging
        .post_message(user.user_id, conversation_id, payload)?;
    Ok((StatusCode::CREATED, data(message)))
}

pub async fn edit_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(message_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<EditMessageRequest>,
) -> AppResult<Json<Envelope<MessageView>>> {
    let message = state
        .messaging
        .edit_message(user.user_id, message_id, &payload.content)?;
    Ok(data(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(message_id): PathParam<Uuid>,
) -> AppResult<StatusCode> {
    state
        .messaging
        .delete_message(user.user_id, message_id)
        .await?;
    tracing::info!(%message_id, user_id = %user.user_id, "message deleted");
    Ok(StatusCode::NO_CONTENT)
}
