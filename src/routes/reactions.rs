use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::messaging::{ReactionSummary, ReactionView};
use crate::state::AppState;

use super::extract::{JsonBody, PathParam};
use super::{data, Envelope};

#[derive(Deserialize)]
pub struct AddReactionRequest {
    pub emoji: String,
}

pub async fn list_reactions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(message_id): PathParam<Uuid>,
) -> AppResult<Json<Envelope<Vec<ReactionSummary>>>> {
    let summaries = state.messaging.list_reactions(user.user_id, message_id)?;
    Ok(data(summaries))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(message_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<AddReactionRequest>,
) -> AppResult<(StatusCode, Json<Envelope<ReactionView>>)> {
    let reaction = state
        .messaging
        .add_reaction(user.user_id, message_id, &payload.emoji)?;
    Ok((StatusCode::CREATED, data(reaction)))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam((message_id, reaction_id)): PathParam<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    state
        .messaging
        .remove_reaction(user.user_id, message_id, reaction_id)?;
    Ok(StatusCode::NO_CONTENT)
}
