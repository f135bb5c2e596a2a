use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::messaging::ParticipantView;
use crate::models::ParticipantRole;
use crate::state::AppState;

use super::extract::{JsonBody, PathParam};
use super::{data, Envelope};

#[derive(Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

#[derive(Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Serialize)]
pub struct MuteState {
    pub conversation_id: Uuid,
    pub is_muted: bool,
}

pub async fn add_participant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<AddParticipantRequest>,
) -> AppResult<(StatusCode, Json<Envelope<ParticipantView>>)> {
    let participant = state.messaging.add_participant(
        user.user_id,
        conversation_id,
        payload.user_id,
        payload.role,
    )?;
    Ok((StatusCode::CREATED, data(participant)))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam((conversation_id, user_id)): PathParam<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    state
        .messaging
        .remove_participant(user.user_id, conversation_id, user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_muted(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<MuteRequest>,
) -> AppResult<Json<Envelope<MuteState>>> {
    state
        .messaging
        .set_muted(user.user_id, conversation_id, payload.muted)?;
    Ok(data(MuteState {
        conversation_id,
        is_muted: payload.muted,
    }))
}
