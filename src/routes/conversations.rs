use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::messaging::{
    ConversationDetail, ConversationSummary, CreateConversationInput, PageRequest,
    UpdateConversationInput,
};
use crate::state::AppState;
use crate::utils::json::{classify_nullable, NullableValue};

use super::extract::{JsonBody, PathParam, QueryParams};
use super::{data, Envelope};

#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub mark_read: Option<bool>,
}

#[derive(Serialize)]
pub struct UnreadCount {
    pub unread_count: i64,
}

#[derive(Serialize)]
pub struct ReadReceipt {
    pub conversation_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<Vec<ConversationSummary>>>> {
    let summaries = state.messaging.list_conversations(user.user_id)?;
    Ok(data(summaries))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(payload): JsonBody<CreateConversationInput>,
) -> AppResult<(StatusCode, Json<Envelope<ConversationSummary>>)> {
    let summary = state.messaging.create_conversation(user.user_id, payload)?;
    Ok((StatusCode::CREATED, data(summary)))
}

/// Fetching the first page marks the conversation read unless the client
/// opts out with `mark_read=false`.
pub async fn get_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
    QueryParams(query): QueryParams<DetailQuery>,
) -> AppResult<Json<Envelope<ConversationDetail>>> {
    let first_page = query.offset.unwrap_or(0) <= 0;
    let advance_cursor = first_page && query.mark_read.unwrap_or(true);
    let detail = state.messaging.conversation_detail(
        user.user_id,
        conversation_id,
        PageRequest {
            limit: query.limit,
            offset: query.offset,
        },
        advance_cursor,
    )?;
    Ok(data(detail))
}

pub async fn update_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
    JsonBody(body): JsonBody<Value>,
) -> AppResult<Json<Envelope<ConversationSummary>>> {
    let input = parse_update(&body)?;
    let summary = state
        .messaging
        .update_conversation(user.user_id, conversation_id, input)?;
    Ok(data(summary))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
) -> AppResult<Json<Envelope<ReadReceipt>>> {
    let last_read_at = state.messaging.mark_read(user.user_id, conversation_id)?;
    Ok(data(ReadReceipt {
        conversation_id,
        last_read_at,
    }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    PathParam(conversation_id): PathParam<Uuid>,
) -> AppResult<Json<Envelope<UnreadCount>>> {
    let unread_count = state.messaging.unread_count(user.user_id, conversation_id)?;
    Ok(data(UnreadCount { unread_count }))
}

pub async fn total_unread(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<UnreadCount>>> {
    let unread_count = state.messaging.total_unread(user.user_id)?;
    Ok(data(UnreadCount { unread_count }))
}

/// `description` distinguishes an omitted key from an explicit `null`.
fn parse_update(body: &Value) -> AppResult<UpdateConversationInput> {
    if !body.is_object() {
        return Err(AppError::bad_request("expected a JSON object"));
    }

    let title = match classify_nullable(body.get("title")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => return Err(AppError::bad_request("title cannot be null")),
        NullableValue::String(value) => Some(value),
    };

    let description =
        match classify_nullable(body.get("description")).map_err(AppError::bad_request)? {
            NullableValue::Omitted => None,
            NullableValue::Null => Some(None),
            NullableValue::String(value) => Some(Some(value)),
        };

    let is_archived = match body.get("is_archived") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "is_archived must be a boolean, got {other}"
            )))
        }
    };

    Ok(UpdateConversationInput {
        title,
        description,
        is_archived,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn explicit_null_description_clears_it() {
        let input = parse_update(&json!({ "description": null })).unwrap();
        assert_eq!(input.description, Some(None));
        assert_eq!(input.title, None);
    }

    #[test]
    fn omitted_description_is_left_alone() {
        let input = parse_update(&json!({ "title": "Renamed", "is_archived": true })).unwrap();
        assert_eq!(input.description, None);
        assert_eq!(input.title.as_deref(), Some("Renamed"));
        assert_eq!(input.is_archived, Some(true));
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_update(&json!({ "title": null })).is_err());
        assert!(parse_update(&json!({ "title": 4 })).is_err());
        assert!(parse_update(&json!({ "is_archived": "yes" })).is_err());
        assert!(parse_update(&json!([1, 2])).is_err());
    }
}
