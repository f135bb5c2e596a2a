use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageType, NewMessage, UserSummary};
use crate::store::StoreError;

use super::reactions::{aggregate, ReactionSummary};
use super::{MessagingError, MessagingResult, MessagingService, PageRequest};

const MAX_FILE_NAME_CHARS: usize = 120;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostMessageInput {
    pub content: String,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
}

/// Shallow projection of the message being replied to.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyPreview {
    pub id: Uuid,
    pub content: String,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender: Option<UserSummary>,
    pub content: String,
    pub message_type: MessageType,
    pub attachment: Option<AttachmentInfo>,
    pub reply_to: Option<Uuid>,
    pub reply: Option<ReplyPreview>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reactions: Vec<ReactionSummary>,
}

/// Storage key prefix under which one uploader's attachments for a
/// conversation live. A message may only reference files under its sender's
/// own prefix.
pub fn attachment_prefix(conversation_id: Uuid, uploader: Uuid) -> String {
    format!("conversations/{conversation_id}/{uploader}/")
}

/// Reduces an uploaded file name to a safe key segment.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

fn attachment_of(message: &Message) -> Option<AttachmentInfo> {
    let path = message.file_path.clone()?;
    Some(AttachmentInfo {
        file_name: message
            .file_name
            .clone()
            .unwrap_or_else(|| path.rsplit('/').next().unwrap_or_default().to_string()),
        file_size: message.file_size.unwrap_or(0),
        file_path: path,
    })
}

fn storage_failure(error: anyhow::Error) -> MessagingError {
    MessagingError::Upstream(StoreError::Backend(format!("{error:#}")))
}

impl MessagingService {
    pub fn post_message(
        &self,
        sender: Uuid,
        conversation_id: Uuid,
        input: PostMessageInput,
    ) -> MessagingResult<MessageView> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(MessagingError::validation("content must not be empty"));
        }
        self.require_participant(conversation_id, sender)?;

        let message_type = match input.message_type {
            Some(kind) => kind,
            None if input.file_path.is_some() => MessageType::File,
            None => MessageType::Text,
        };

        let attachment = match (message_type.carries_file(), input.file_path) {
            (true, Some(path)) => {
                if !path.starts_with(&attachment_prefix(conversation_id, sender)) {
                    return Err(MessagingError::validation(
                        "file_path must reference your own upload in this conversation",
                    ));
                }
                let size = input.file_size.unwrap_or(0);
                if size < 0 {
                    return Err(MessagingError::validation("file_size must not be negative"));
                }
                let name = input
                    .file_name
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| path.rsplit('/').next().unwrap_or_default().to_string());
                Some(AttachmentInfo {
                    file_path: path,
                    file_name: name,
                    file_size: size,
                })
            }
            (true, None) => {
                return Err(MessagingError::validation(
                    "file and image messages require file_path",
                ))
            }
            (false, Some(_)) => {
                return Err(MessagingError::validation(
                    "text messages cannot carry a file",
                ))
            }
            (false, None) => None,
        };

        if let Some(reply_to) = input.reply_to {
            let parent = self.store.find_message(reply_to)?;
            if parent.map_or(true, |parent| parent.conversation_id != conversation_id) {
                return Err(MessagingError::validation(
                    "reply_to must reference a message in the same conversation",
                ));
            }
        }

        let message = self.store.insert_message(NewMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: sender,
            content: content.to_string(),
            message_type: message_type.to_db().to_string(),
            file_path: attachment.as_ref().map(|a| a.file_path.clone()),
            file_name: attachment.as_ref().map(|a| a.file_name.clone()),
            file_size: attachment.as_ref().map(|a| a.file_size),
            reply_to: input.reply_to,
            created_at: Utc::now(),
        })?;

        tracing::debug!(%conversation_id, message_id = %message.id, "message posted");
        let mut views = self.enrich(vec![message], sender)?;
        views
            .pop()
            .ok_or_else(|| StoreError::Backend("posted message vanished".to_string()).into())
    }

    /// Newest first. Does not touch the read cursor.
    pub fn list_messages(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        page: PageRequest,
    ) -> MessagingResult<Vec<MessageView>> {
        self.require_participant(conversation_id, caller)?;
        let (limit, offset) = self.limits.resolve(page);
        let rows = self.store.list_messages(conversation_id, limit, offset)?;
        self.enrich(rows, caller)
    }

    /// Sender-only. A missing message and someone else's message answer alike.
    pub fn edit_message(
        &self,
        caller: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> MessagingResult<MessageView> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MessagingError::validation("content must not be empty"));
        }
        self.owned_message(caller, message_id)?;

        let updated = self
            .store
            .update_message_content(message_id, content, Utc::now())
            .map_err(|err| match err {
                StoreError::NotFound => MessagingError::NotFoundOrUnauthorized,
                other => other.into(),
            })?;
        let mut views = self.enrich(vec![updated], caller)?;
        views
            .pop()
            .ok_or(MessagingError::NotFoundOrUnauthorized)
    }

    /// Sender-only delete. Reactions go with the row; removal of an attached
    /// object is attempted afterwards and its failure is only logged.
    pub async fn delete_message(&self, caller: Uuid, message_id: Uuid) -> MessagingResult<()> {
        let message = self.owned_message(caller, message_id)?;

        if !self.store.delete_message(message.id)? {
            return Err(MessagingError::NotFoundOrUnauthorized);
        }

        let Some(path) = message.file_path.as_deref() else {
            return Ok(());
        };
        match self.store.file_path_in_use(path) {
            Ok(false) => {
                if let Err(err) = self.storage.delete_object(path).await {
                    tracing::warn!(
                        message_id = %message.id,
                        file_path = path,
                        error = %err,
                        "failed to delete message attachment"
                    );
                }
            }
            Ok(true) => {
                tracing::debug!(
                    message_id = %message.id,
                    file_path = path,
                    "attachment still referenced, keeping object"
                );
            }
            Err(err) => {
                tracing::warn!(
                    message_id = %message.id,
                    file_path = path,
                    error = %err,
                    "could not check attachment references, keeping object"
                );
            }
        }
        Ok(())
    }

    pub async fn upload_attachment(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        file_name: &str,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> MessagingResult<AttachmentInfo> {
        self.require_participant(conversation_id, caller)?;
        if bytes.is_empty() {
            return Err(MessagingError::validation("attachment must not be empty"));
        }

        let name = sanitize_file_name(file_name);
        let key = format!(
            "{}{}-{}",
            attachment_prefix(conversation_id, caller),
            Uuid::new_v4(),
            name
        );
        let content_type = content_type.or_else(|| {
            mime_guess::from_path(&name)
                .first()
                .map(|mime| mime.essence_str().to_string())
        });
        let size = bytes.len() as i64;

        self.storage
            .put_object(&key, bytes, content_type)
            .await
            .map_err(storage_failure)?;

        Ok(AttachmentInfo {
            file_path: key,
            file_name: name,
            file_size: size,
        })
    }

    /// Short-lived download link for a message's attachment; participants only.
    pub async fn attachment_url(
        &self,
        caller: Uuid,
        message_id: Uuid,
        expires_in: Duration,
    ) -> MessagingResult<String> {
        let message = self
            .store
            .find_message(message_id)?
            .ok_or(MessagingError::NotFoundOrUnauthorized)?;
        self.require_participant(message.conversation_id, caller)?;
        let path = message
            .file_path
            .ok_or(MessagingError::NotFoundOrUnauthorized)?;

        self.storage
            .presign_get_object(&path, expires_in)
            .await
            .map_err(storage_failure)
    }

    fn owned_message(&self, caller: Uuid, message_id: Uuid) -> MessagingResult<Message> {
        self.store
            .find_message(message_id)?
            .filter(|message| message.sender_id == caller)
            .ok_or(MessagingError::NotFoundOrUnauthorized)
    }

    /// Attaches sender identity, reply previews and reaction summaries.
    pub(crate) fn enrich(
        &self,
        rows: Vec<Message>,
        viewer: Uuid,
    ) -> MessagingResult<Vec<MessageView>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let reply_ids: Vec<Uuid> = rows.iter().filter_map(|m| m.reply_to).collect();
        let replies: HashMap<Uuid, Message> = self
            .store
            .messages_by_ids(&reply_ids)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut user_ids: Vec<Uuid> = rows
            .iter()
            .map(|m| m.sender_id)
            .chain(replies.values().map(|m| m.sender_id))
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let users: HashMap<Uuid, UserSummary> = self
            .store
            .users_by_ids(&user_ids)?
            .iter()
            .map(|u| (u.id, UserSummary::from(u)))
            .collect();

        let message_ids: Vec<Uuid> = rows.iter().map(|m| m.id).collect();
        let mut reactions_by_message: HashMap<Uuid, Vec<_>> = HashMap::new();
        for reaction in self.store.reactions_for_messages(&message_ids)? {
            reactions_by_message
                .entry(reaction.message_id)
                .or_default()
                .push(reaction);
        }

        Ok(rows
            .into_iter()
            .map(|message| {
                let reply = message
                    .reply_to
                    .and_then(|id| replies.get(&id))
                    .map(|parent| ReplyPreview {
                        id: parent.id,
                        content: parent.content.clone(),
                        sender_name: users
                            .get(&parent.sender_id)
                            .map(|u| u.display_name.clone()),
                    });
                let reactions = reactions_by_message
                    .get(&message.id)
                    .map(|list| aggregate(list, viewer))
                    .unwrap_or_default();

                MessageView {
                    id: message.id,
                    conversation_id: message.conversation_id,
                    sender_id: message.sender_id,
                    sender: users.get(&message.sender_id).cloned(),
                    attachment: attachment_of(&message),
                    message_type: MessageType::from_db(&message.message_type)
                        .unwrap_or_default(),
                    content: message.content,
                    reply_to: message.reply_to,
                    reply,
                    is_edited: message.is_edited,
                    edited_at: message.edited_at,
                    created_at: message.created_at,
                    reactions,
                }
            })
            .collect())
    }
}
