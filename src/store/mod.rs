//! Persistence access for the messaging read-model.
//!
//! [`ConversationStore`] is the one handle every component receives. Writes
//! that are causally linked (a conversation and its first participants, a
//! message and its conversation's `last_message_at`) are single calls so the
//! implementation can make them atomic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationChanges, Message, NewConversation, NewMessage, NewParticipant,
    NewReaction, NewUser, Participant, Reaction, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryConversationStore;
pub use postgres::PgConversationStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("record not found")]
    NotFound,
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => StoreError::NotFound,
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => StoreError::UniqueViolation,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(value: diesel::r2d2::PoolError) -> Self {
        StoreError::Backend(format!("database pool error: {value}"))
    }
}

pub trait ConversationStore: Send + Sync + 'static {
    fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    fn users_by_ids(&self, user_ids: &[Uuid]) -> StoreResult<Vec<User>>;

    fn set_user_active(&self, user_id: Uuid, active: bool) -> StoreResult<()>;

    /// Inserts the conversation together with its initial participants.
    /// Either every row is written or none is.
    fn create_conversation(
        &self,
        conversation: NewConversation,
        participants: Vec<NewParticipant>,
    ) -> StoreResult<Conversation>;

    fn find_conversation(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>>;

    fn update_conversation(
        &self,
        conversation_id: Uuid,
        changes: ConversationChanges,
    ) -> StoreResult<Conversation>;

    /// Conversations in which `user_id` holds an active participant row.
    fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;

    /// Returns the participant row whether or not it has been left.
    fn find_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>>;

    /// The user's own active participant rows, one per conversation.
    fn participations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Participant>>;

    /// Active participants of the given conversations.
    fn active_participants(&self, conversation_ids: &[Uuid]) -> StoreResult<Vec<Participant>>;

    /// Inserts a new participant row, or re-activates a row whose user left.
    /// An already active row yields [`StoreError::UniqueViolation`].
    fn add_participant(&self, participant: NewParticipant) -> StoreResult<Participant>;

    /// Marks the participant as left. Returns `false` when no active row exists.
    fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    fn set_last_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn set_muted(&self, conversation_id: Uuid, user_id: Uuid, muted: bool) -> StoreResult<()>;

    /// Inserts the message and advances the conversation's `last_message_at`
    /// in the same unit of work.
    fn insert_message(&self, message: NewMessage) -> StoreResult<Message>;

    fn find_message(&self, message_id: Uuid) -> StoreResult<Option<Message>>;

    fn messages_by_ids(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Message>>;

    /// Newest first.
    fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Message>>;

    /// The most recent message of each conversation that has one.
    fn latest_messages(&self, conversation_ids: &[Uuid]) -> StoreResult<Vec<Message>>;

    fn update_message_content(
        &self,
        message_id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> StoreResult<Message>;

    /// Deletes the message and its reactions. Returns `false` if it did not exist.
    fn delete_message(&self, message_id: Uuid) -> StoreResult<bool>;

    /// Whether any message still references the stored object at `file_path`.
    fn file_path_in_use(&self, file_path: &str) -> StoreResult<bool>;

    /// Unread messages per conversation for `user_id`: messages from others
    /// newer than the user's read cursor (all of them when it is unset).
    /// Only conversations where the user is active are counted; zero counts
    /// are omitted from the map.
    fn unread_counts(
        &self,
        user_id: Uuid,
        conversation_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, i64>>;

    fn insert_reaction(&self, reaction: NewReaction) -> StoreResult<Reaction>;

    fn find_reaction(&self, reaction_id: Uuid) -> StoreResult<Option<Reaction>>;

    fn delete_reaction(&self, reaction_id: Uuid) -> StoreResult<bool>;

    fn reactions_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Reaction>>;
}
