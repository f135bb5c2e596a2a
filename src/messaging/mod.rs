//! Conversation read-model: membership gate, message threading, reactions,
//! read cursors and the conversation summary view.
//!
//! Nothing here knows about HTTP. Handlers translate [`MessagingError`] into
//! responses; tests drive [`MessagingService`] directly against the in-memory
//! store.

use std::sync::Arc;

use crate::storage::ObjectStorage;
use crate::store::{ConversationStore, StoreError};

pub mod membership;
pub mod messages;
pub mod reactions;
pub mod read_cursor;
pub mod summary;

pub use membership::ParticipantView;
pub use messages::{AttachmentInfo, MessageView, PostMessageInput, ReplyPreview};
pub use reactions::{ReactionSummary, ReactionView};
pub use summary::{
    ConversationDetail, ConversationSummary, CreateConversationInput, LastMessagePreview,
    UpdateConversationInput,
};

pub type MessagingResult<T> = Result<T, MessagingError>;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("{0}")]
    ValidationFailed(String),
    /// Caller is not an active participant, or lacks the role for the action.
    /// Also returned for conversations that do not exist.
    #[error("access denied")]
    AccessDenied,
    /// Owner-only mutation on a record that is missing or belongs to someone
    /// else. The two cases are indistinguishable.
    #[error("not found")]
    NotFoundOrUnauthorized,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Upstream(#[from] StoreError),
}

impl MessagingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

/// Bounds applied to message listing.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: crate::config::DEFAULT_PAGE_LIMIT,
            max_limit: crate::config::DEFAULT_MAX_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageLimits {
    /// Clamps a requested page to `[1, max_limit]` with a non-negative offset.
    pub fn resolve(&self, page: PageRequest) -> (i64, i64) {
        let limit = page
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1));
        let offset = page.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Clone)]
pub struct MessagingService {
    store: Arc<dyn ConversationStore>,
    storage: Arc<dyn ObjectStorage>,
    limits: PageLimits,
}

impl MessagingService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        storage: Arc<dyn ObjectStorage>,
        limits: PageLimits,
    ) -> Self {
        Self {
            store,
            storage,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }
}
