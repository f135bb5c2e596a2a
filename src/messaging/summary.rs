use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationChanges, ConversationType, Message, MessageType, NewConversation,
    NewParticipant, Participant, ParticipantRole, UserSummary,
};

use super::membership::ParticipantView;
use super::messages::MessageView;
use super::{MessagingError, MessagingResult, MessagingService, PageRequest};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateConversationInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type", alias = "conversation_type")]
    pub conversation_type: Option<ConversationType>,
    #[serde(default)]
    pub is_private: Option<bool>,
    #[serde(default)]
    pub participants: Vec<Uuid>,
}

/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct UpdateConversationInput {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastMessagePreview {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    pub is_private: bool,
    pub is_archived: bool,
    pub created_by: Uuid,
    pub creator: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub participants: Vec<ParticipantView>,
    pub last_message: Option<LastMessagePreview>,
    pub unread_count: i64,
    pub my_role: Option<ParticipantRole>,
    pub is_muted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageView>,
    pub limit: i64,
    pub offset: i64,
}

/// Most recent activity first; conversations without messages go last.
fn by_recent_activity(a: &ConversationSummary, b: &ConversationSummary) -> Ordering {
    let by_last_message = match (a.last_message_at, b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_last_message.then_with(|| b.created_at.cmp(&a.created_at))
}

impl MessagingService {
    pub fn create_conversation(
        &self,
        creator: Uuid,
        input: CreateConversationInput,
    ) -> MessagingResult<ConversationSummary> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(MessagingError::validation("title must not be empty"));
        }
        let conversation_type = input.conversation_type.unwrap_or_default();

        let mut others: Vec<Uuid> = Vec::new();
        for id in input.participants {
            if id != creator && !others.contains(&id) {
                others.push(id);
            }
        }
        if conversation_type == ConversationType::Direct && others.len() != 1 {
            return Err(MessagingError::validation(
                "direct conversations need exactly one other participant",
            ));
        }
        let known = self
            .store
            .users_by_ids(&others)?
            .into_iter()
            .filter(|user| user.is_active)
            .count();
        if known != others.len() {
            return Err(MessagingError::validation("unknown participant"));
        }

        let now = Utc::now();
        let conversation_id = Uuid::new_v4();
        let mut participants = vec![NewParticipant {
            conversation_id,
            user_id: creator,
            role: ParticipantRole::Admin.to_db().to_string(),
            joined_at: now,
        }];
        participants.extend(others.into_iter().map(|user_id| NewParticipant {
            conversation_id,
            user_id,
            role: ParticipantRole::Member.to_db().to_string(),
            joined_at: now,
        }));

        let created = self.store.create_conversation(
            NewConversation {
                id: conversation_id,
                title: title.to_string(),
                description: input
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                conversation_type: conversation_type.to_db().to_string(),
                is_private: input.is_private.unwrap_or(false),
                created_by: creator,
                created_at: now,
                updated_at: now,
            },
            participants,
        )?;

        tracing::info!(%conversation_id, %creator, "conversation created");
        self.single_summary(created, creator)
    }

    /// Creator-only. Anyone else, including callers who cannot see the
    /// conversation at all, is denied.
    pub fn update_conversation(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        input: UpdateConversationInput,
    ) -> MessagingResult<ConversationSummary> {
        let existing = self
            .store
            .find_conversation(conversation_id)?
            .filter(|c| c.created_by == caller)
            .ok_or(MessagingError::AccessDenied)?;

        let title = match input.title {
            Some(title) => {
                let trimmed = title.trim();
                if trimmed.is_empty() {
                    return Err(MessagingError::validation("title must not be empty"));
                }
                Some(trimmed.to_string())
            }
            None => None,
        };
        let description = input.description.map(|value| {
            value
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
        });

        let updated = self.store.update_conversation(
            existing.id,
            ConversationChanges {
                title,
                description,
                is_archived: input.is_archived,
                updated_at: Some(Utc::now()),
            },
        )?;
        self.single_summary(updated, caller)
    }

    /// Every conversation the caller actively participates in, newest
    /// activity first.
    pub fn list_conversations(&self, caller: Uuid) -> MessagingResult<Vec<ConversationSummary>> {
        let conversations = self.store.conversations_for_user(caller)?;
        let mut summaries = self.summarize(conversations, caller)?;
        summaries.sort_by(by_recent_activity);
        Ok(summaries)
    }

    /// Summary plus one page of messages. When `advance_cursor` is set the
    /// caller's read cursor moves to now before the summary is built.
    pub fn conversation_detail(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        page: PageRequest,
        advance_cursor: bool,
    ) -> MessagingResult<ConversationDetail> {
        self.require_participant(conversation_id, caller)?;
        if advance_cursor {
            self.mark_read_quietly(caller, conversation_id);
        }

        let conversation = self
            .store
            .find_conversation(conversation_id)?
            .ok_or(MessagingError::AccessDenied)?;
        let summary = self.single_summary(conversation, caller)?;

        let (limit, offset) = self.limits.resolve(page);
        let rows = self.store.list_messages(conversation_id, limit, offset)?;
        let messages = self.enrich(rows, caller)?;

        Ok(ConversationDetail {
            conversation: summary,
            messages,
            limit,
            offset,
        })
    }

    fn single_summary(
        &self,
        conversation: Conversation,
        viewer: Uuid,
    ) -> MessagingResult<ConversationSummary> {
        self.summarize(vec![conversation], viewer)?
            .pop()
            .ok_or(MessagingError::AccessDenied)
    }

    fn summarize(
        &self,
        conversations: Vec<Conversation>,
        viewer: Uuid,
    ) -> MessagingResult<Vec<ConversationSummary>> {
        if conversations.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();

        let mut participants_by_conversation: HashMap<Uuid, Vec<Participant>> = HashMap::new();
        for participant in self.store.active_participants(&ids)? {
            participants_by_conversation
                .entry(participant.conversation_id)
                .or_default()
                .push(participant);
        }

        let latest: HashMap<Uuid, Message> = self
            .store
            .latest_messages(&ids)?
            .into_iter()
            .map(|m| (m.conversation_id, m))
            .collect();

        let unread = self.store.unread_counts(viewer, &ids)?;

        let mut user_ids: Vec<Uuid> = conversations
            .iter()
            .map(|c| c.created_by)
            .chain(
                participants_by_conversation
                    .values()
                    .flatten()
                    .map(|p| p.user_id),
            )
            .chain(latest.values().map(|m| m.sender_id))
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let users: HashMap<Uuid, UserSummary> = self
            .store
            .users_by_ids(&user_ids)?
            .iter()
            .map(|u| (u.id, UserSummary::from(u)))
            .collect();

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let members = participants_by_conversation
                .remove(&conversation.id)
                .unwrap_or_default();
            let me = members.iter().find(|p| p.user_id == viewer);
            let unread_count = unread.get(&conversation.id).copied().unwrap_or(0);

            summaries.push(ConversationSummary {
                id: conversation.id,
                conversation_type: ConversationType::from_db(&conversation.conversation_type)
                    .unwrap_or_default(),
                is_private: conversation.is_private,
                is_archived: conversation.is_archived,
                created_by: conversation.created_by,
                creator: users.get(&conversation.created_by).cloned(),
                created_at: conversation.created_at,
                updated_at: conversation.updated_at,
                last_message_at: conversation.last_message_at,
                last_message: latest.get(&conversation.id).map(|m| LastMessagePreview {
                    id: m.id,
                    sender_id: m.sender_id,
                    sender_name: users.get(&m.sender_id).map(|u| u.display_name.clone()),
                    content: m.content.clone(),
                    message_type: MessageType::from_db(&m.message_type).unwrap_or_default(),
                    created_at: m.created_at,
                }),
                unread_count,
                my_role: me.map(Participant::participant_role),
                is_muted: me.map_or(false, |p| p.is_muted),
                participants: members
                    .iter()
                    .map(|p| ParticipantView::new(p, users.get(&p.user_id).cloned()))
                    .collect(),
                title: conversation.title,
                description: conversation.description,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::testing::{group, say, service, user};

    #[test]
    fn new_group_has_only_the_creator_as_admin() {
        let service = service();
        let alice = user(&service, "Alice");

        let created = service
            .create_conversation(
                alice,
                CreateConversationInput {
                    title: "Team Standup".to_string(),
                    conversation_type: Some(ConversationType::Group),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(created.participants.len(), 1);
        assert_eq!(created.participants[0].user_id, alice);
        assert_eq!(created.participants[0].role, ParticipantRole::Admin);
        assert_eq!(
            created.creator.as_ref().map(|c| c.display_name.as_str()),
            Some("Alice")
        );
        assert!(created.last_message.is_none());
    }

    #[test]
    fn extra_participants_join_as_members_without_duplicates() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");

        let created = service
            .create_conversation(
                alice,
                CreateConversationInput {
                    title: "Pair".to_string(),
                    participants: vec![bob, bob, alice],
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(created.participants.len(), 2);
        let bob_view = created
            .participants
            .iter()
            .find(|p| p.user_id == bob)
            .unwrap();
        assert_eq!(bob_view.role, ParticipantRole::Member);
    }

    #[test]
    fn creation_validates_title_and_participants() {
        let service = service();
        let alice = user(&service, "Alice");

        let blank = service.create_conversation(
            alice,
            CreateConversationInput {
                title: "  ".to_string(),
                ..Default::default()
            },
        );
        assert!(matches!(blank, Err(MessagingError::ValidationFailed(_))));

        let unknown = service.create_conversation(
            alice,
            CreateConversationInput {
                title: "Ghosts".to_string(),
                participants: vec![Uuid::new_v4()],
                ..Default::default()
            },
        );
        assert!(matches!(unknown, Err(MessagingError::ValidationFailed(_))));

        let lonely_direct = service.create_conversation(
            alice,
            CreateConversationInput {
                title: "Just me".to_string(),
                conversation_type: Some(ConversationType::Direct),
                ..Default::default()
            },
        );
        assert!(matches!(
            lonely_direct,
            Err(MessagingError::ValidationFailed(_))
        ));
    }

    #[test]
    fn listing_only_returns_own_conversations_by_recent_activity() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let quiet = group(&service, alice, "Quiet");
        let busy = group(&service, alice, "Busy");
        let older = group(&service, alice, "Older");
        let hidden = group(&service, bob, "Bob only");

        say(&service, older, alice, "first");
        std::thread::sleep(std::time::Duration::from_millis(2));
        say(&service, busy, alice, "latest");

        let listed = service.list_conversations(alice).unwrap();
        let titles: Vec<&str> = listed.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Busy", "Older", "Quiet"]);
        assert_eq!(
            listed[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("latest")
        );
        assert!(listed.iter().all(|c| c.id != hidden));
        assert_eq!(listed[2].id, quiet);
    }

    #[test]
    fn left_conversations_disappear_from_listing() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Temp");
        service.add_participant(alice, conversation, bob, None).unwrap();
        assert_eq!(service.list_conversations(bob).unwrap().len(), 1);

        service.remove_participant(bob, conversation, bob).unwrap();
        assert!(service.list_conversations(bob).unwrap().is_empty());
    }

    #[test]
    fn only_creator_updates() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Board");
        service.add_participant(alice, conversation, bob, None).unwrap();

        let denied = service.update_conversation(
            bob,
            conversation,
            UpdateConversationInput {
                title: Some("Mine now".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(denied, Err(MessagingError::AccessDenied)));

        let updated = service
            .update_conversation(
                alice,
                conversation,
                UpdateConversationInput {
                    description: Some(Some("Monthly board sync".to_string())),
                    is_archived: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("Monthly board sync"));
        assert!(updated.is_archived);

        let cleared = service
            .update_conversation(
                alice,
                conversation,
                UpdateConversationInput {
                    description: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.description.is_none());
    }

    #[test]
    fn first_page_fetch_advances_cursor_but_deeper_pages_do_not() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Team Standup");
        say(&service, conversation, alice, "hello");
        service.add_participant(alice, conversation, bob, None).unwrap();

        let detail = service
            .conversation_detail(bob, conversation, PageRequest::default(), true)
            .unwrap();
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.conversation.unread_count, 0);
        assert!(detail
            .conversation
            .participants
            .iter()
            .any(|p| p.user_id == bob && p.last_read_at.is_some()));
        assert_eq!(service.unread_count(bob, conversation).unwrap(), 0);

        std::thread::sleep(std::time::Duration::from_millis(2));
        say(&service, conversation, alice, "again");
        service
            .conversation_detail(
                bob,
                conversation,
                PageRequest {
                    limit: Some(1),
                    offset: Some(1),
                },
                false,
            )
            .unwrap();
        assert_eq!(service.unread_count(bob, conversation).unwrap(), 1);
    }

    #[test]
    fn outsider_detail_is_denied() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Team Standup");

        assert!(matches!(
            service.conversation_detail(bob, conversation, PageRequest::default(), true),
            Err(MessagingError::AccessDenied)
        ));
        assert!(matches!(
            service.conversation_detail(bob, Uuid::new_v4(), PageRequest::default(), true),
            Err(MessagingError::AccessDenied)
        ));
    }
}
