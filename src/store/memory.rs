use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationChanges, Message, NewConversation, NewMessage, NewParticipant,
    NewReaction, NewUser, Participant, Reaction, User,
};

use super::{ConversationStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    conversations: HashMap<Uuid, Conversation>,
    participants: HashMap<(Uuid, Uuid), Participant>,
    messages: HashMap<Uuid, Message>,
    reactions: HashMap<Uuid, Reaction>,
}

/// Process-local store used by tests and single-node demos. Every call holds
/// one lock, so multi-row writes are atomic.
#[derive(Default)]
pub struct MemoryConversationStore {
    tables: Mutex<Tables>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

fn newest_first(a: &Message, b: &Message) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

impl ConversationStore for MemoryConversationStore {
    fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables()?;
        if tables.users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::UniqueViolation);
        }
        let now = Utc::now();
        let row = User {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables()?.users.get(&user_id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    fn users_by_ids(&self, user_ids: &[Uuid]) -> StoreResult<Vec<User>> {
        let tables = self.tables()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.users.get(id).cloned())
            .collect())
    }

    fn set_user_active(&self, user_id: Uuid, active: bool) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.is_active = active;
        user.updated_at = Utc::now();
        Ok(())
    }

    fn create_conversation(
        &self,
        conversation: NewConversation,
        participants: Vec<NewParticipant>,
    ) -> StoreResult<Conversation> {
        let mut tables = self.tables()?;
        if tables.conversations.contains_key(&conversation.id) {
            return Err(StoreError::UniqueViolation);
        }
        let mut seen = std::collections::HashSet::new();
        if !participants.iter().all(|p| seen.insert(p.user_id)) {
            return Err(StoreError::UniqueViolation);
        }

        let row = Conversation {
            id: conversation.id,
            title: conversation.title,
            description: conversation.description,
            conversation_type: conversation.conversation_type,
            is_private: conversation.is_private,
            is_archived: false,
            created_by: conversation.created_by,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            last_message_at: None,
        };
        tables.conversations.insert(row.id, row.clone());
        for participant in participants {
            tables.participants.insert(
                (participant.conversation_id, participant.user_id),
                Participant {
                    conversation_id: participant.conversation_id,
                    user_id: participant.user_id,
                    role: participant.role,
                    joined_at: participant.joined_at,
                    last_read_at: None,
                    is_muted: false,
                    left_at: None,
                },
            );
        }
        Ok(row)
    }

    fn find_conversation(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.tables()?.conversations.get(&conversation_id).cloned())
    }

    fn update_conversation(
        &self,
        conversation_id: Uuid,
        changes: ConversationChanges,
    ) -> StoreResult<Conversation> {
        let mut tables = self.tables()?;
        let row = tables
            .conversations
            .get_mut(&conversation_id)
            .ok_or(StoreError::NotFound)?;
        if let Some(title) = changes.title {
            row.title = title;
        }
        if let Some(description) = changes.description {
            row.description = description;
        }
        if let Some(archived) = changes.is_archived {
            row.is_archived = archived;
        }
        if let Some(updated_at) = changes.updated_at {
            row.updated_at = updated_at;
        }
        Ok(row.clone())
    }

    fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let tables = self.tables()?;
        Ok(tables
            .participants
            .values()
            .filter(|p| p.user_id == user_id && p.is_active())
            .filter_map(|p| tables.conversations.get(&p.conversation_id).cloned())
            .collect())
    }

    fn find_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        Ok(self
            .tables()?
            .participants
            .get(&(conversation_id, user_id))
            .cloned())
    }

    fn participations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Participant>> {
        let tables = self.tables()?;
        let mut rows: Vec<Participant> = tables
            .participants
            .values()
            .filter(|p| p.user_id == user_id && p.is_active())
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.joined_at);
        Ok(rows)
    }

    fn active_participants(&self, conversation_ids: &[Uuid]) -> StoreResult<Vec<Participant>> {
        let tables = self.tables()?;
        let mut rows: Vec<Participant> = tables
            .participants
            .values()
            .filter(|p| p.is_active() && conversation_ids.contains(&p.conversation_id))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.joined_at);
        Ok(rows)
    }

    fn add_participant(&self, participant: NewParticipant) -> StoreResult<Participant> {
        let mut tables = self.tables()?;
        let key = (participant.conversation_id, participant.user_id);
        if let Some(existing) = tables.participants.get(&key) {
            if existing.is_active() {
                return Err(StoreError::UniqueViolation);
            }
        }
        let row = Participant {
            conversation_id: participant.conversation_id,
            user_id: participant.user_id,
            role: participant.role,
            joined_at: participant.joined_at,
            last_read_at: None,
            is_muted: false,
            left_at: None,
        };
        tables.participants.insert(key, row.clone());
        Ok(row)
    }

    fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        match tables.participants.get_mut(&(conversation_id, user_id)) {
            Some(row) if row.is_active() => {
                row.left_at = Some(left_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_last_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        if let Some(row) = tables.participants.get_mut(&(conversation_id, user_id)) {
            if row.is_active() {
                row.last_read_at = Some(read_at);
            }
        }
        Ok(())
    }

    fn set_muted(&self, conversation_id: Uuid, user_id: Uuid, muted: bool) -> StoreResult<()> {
        let mut tables = self.tables()?;
        match tables.participants.get_mut(&(conversation_id, user_id)) {
            Some(row) if row.is_active() => {
                row.is_muted = muted;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut tables = self.tables()?;
        if tables.messages.contains_key(&message.id) {
            return Err(StoreError::UniqueViolation);
        }
        let conversation = tables
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| StoreError::Backend("conversation foreign key violated".to_string()))?;
        if conversation
            .last_message_at
            .map_or(true, |at| at < message.created_at)
        {
            conversation.last_message_at = Some(message.created_at);
            conversation.updated_at = message.created_at;
        }

        let row = Message {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            file_path: message.file_path,
            file_name: message.file_name,
            file_size: message.file_size,
            reply_to: message.reply_to,
            is_edited: false,
            edited_at: None,
            created_at: message.created_at,
        };
        tables.messages.insert(row.id, row.clone());
        Ok(row)
    }

    fn find_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self.tables()?.messages.get(&message_id).cloned())
    }

    fn messages_by_ids(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Message>> {
        let tables = self.tables()?;
        Ok(message_ids
            .iter()
            .filter_map(|id| tables.messages.get(id).cloned())
            .collect())
    }

    fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Message>> {
        let tables = self.tables()?;
        let mut rows: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(newest_first);
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    fn latest_messages(&self, conversation_ids: &[Uuid]) -> StoreResult<Vec<Message>> {
        let tables = self.tables()?;
        let mut latest: HashMap<Uuid, &Message> = HashMap::new();
        for message in tables
            .messages
            .values()
            .filter(|m| conversation_ids.contains(&m.conversation_id))
        {
            let slot = latest.entry(message.conversation_id).or_insert(message);
            if newest_first(message, slot).is_lt() {
                *slot = message;
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    fn update_message_content(
        &self,
        message_id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let mut tables = self.tables()?;
        let row = tables
            .messages
            .get_mut(&message_id)
            .ok_or(StoreError::NotFound)?;
        row.content = content.to_string();
        row.is_edited = true;
        row.edited_at = Some(edited_at);
        Ok(row.clone())
    }

    fn delete_message(&self, message_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        if tables.messages.remove(&message_id).is_none() {
            return Ok(false);
        }
        tables.reactions.retain(|_, r| r.message_id != message_id);
        for message in tables.messages.values_mut() {
            if message.reply_to == Some(message_id) {
                message.reply_to = None;
            }
        }
        Ok(true)
    }

    fn file_path_in_use(&self, file_path: &str) -> StoreResult<bool> {
        Ok(self
            .tables()?
            .messages
            .values()
            .any(|m| m.file_path.as_deref() == Some(file_path)))
    }

    fn unread_counts(
        &self,
        user_id: Uuid,
        conversation_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, i64>> {
        let tables = self.tables()?;
        let mut counts = HashMap::new();
        for conversation_id in conversation_ids {
            let Some(me) = tables
                .participants
                .get(&(*conversation_id, user_id))
                .filter(|p| p.is_active())
            else {
                continue;
            };
            let count = tables
                .messages
                .values()
                .filter(|m| m.conversation_id == *conversation_id && m.sender_id != user_id)
                .filter(|m| me.last_read_at.map_or(true, |since| m.created_at > since))
                .count();
            if count > 0 {
                counts.insert(*conversation_id, count as i64);
            }
        }
        Ok(counts)
    }

    fn insert_reaction(&self, reaction: NewReaction) -> StoreResult<Reaction> {
        let mut tables = self.tables()?;
        if !tables.messages.contains_key(&reaction.message_id) {
            return Err(StoreError::Backend("message foreign key violated".to_string()));
        }
        let duplicate = tables.reactions.values().any(|existing| {
            existing.message_id == reaction.message_id
                && existing.user_id == reaction.user_id
                && existing.emoji == reaction.emoji
        });
        if duplicate {
            return Err(StoreError::UniqueViolation);
        }
        let row = Reaction {
            id: reaction.id,
            message_id: reaction.message_id,
            user_id: reaction.user_id,
            emoji: reaction.emoji,
            created_at: reaction.created_at,
        };
        tables.reactions.insert(row.id, row.clone());
        Ok(row)
    }

    fn find_reaction(&self, reaction_id: Uuid) -> StoreResult<Option<Reaction>> {
        Ok(self.tables()?.reactions.get(&reaction_id).cloned())
    }

    fn delete_reaction(&self, reaction_id: Uuid) -> StoreResult<bool> {
        Ok(self.tables()?.reactions.remove(&reaction_id).is_some())
    }

    fn reactions_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Reaction>> {
        let tables = self.tables()?;
        let mut rows: Vec<Reaction> = tables
            .reactions
            .values()
            .filter(|r| message_ids.contains(&r.message_id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seed_conversation(store: &MemoryConversationStore) -> (Uuid, Uuid) {
        let id = Uuid::new_v4();
        let user = store
            .insert_user(NewUser {
                id,
                email: format!("owner-{id}@example.org"),
                display_name: "Owner".to_string(),
                avatar_url: None,
                password_hash: "x".to_string(),
                role: "staff".to_string(),
            })
            .unwrap();
        let now = Utc::now();
        let conversation_id = Uuid::new_v4();
        let conversation = store
            .create_conversation(
                NewConversation {
                    id: conversation_id,
                    title: "Ops".to_string(),
                    description: None,
                    conversation_type: "group".to_string(),
                    is_private: false,
                    created_by: user.id,
                    created_at: now,
                    updated_at: now,
                },
                vec![NewParticipant {
                    conversation_id,
                    user_id: user.id,
                    role: "admin".to_string(),
                    joined_at: now,
                }],
            )
            .unwrap();
        (conversation.id, user.id)
    }

    fn message(conversation_id: Uuid, sender_id: Uuid, at: DateTime<Utc>) -> NewMessage {
        NewMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: "hi".to_string(),
            message_type: "text".to_string(),
            file_path: None,
            file_name: None,
            file_size: None,
            reply_to: None,
            created_at: at,
        }
    }

    #[test]
    fn last_message_at_never_moves_backwards() {
        let store = MemoryConversationStore::new();
        let (conversation_id, user_id) = seed_conversation(&store);
        let later = Utc::now() + Duration::seconds(10);
        store
            .insert_message(message(conversation_id, user_id, later))
            .unwrap();
        store
            .insert_message(message(conversation_id, user_id, later - Duration::seconds(5)))
            .unwrap();

        let conversation = store.find_conversation(conversation_id).unwrap().unwrap();
        assert_eq!(conversation.last_message_at, Some(later));
    }

    #[test]
    fn rejoining_participant_resets_membership() {
        let store = MemoryConversationStore::new();
        let (conversation_id, _) = seed_conversation(&store);
        let member = Uuid::new_v4();
        let now = Utc::now();
        let join = NewParticipant {
            conversation_id,
            user_id: member,
            role: "member".to_string(),
            joined_at: now,
        };

        store.add_participant(join.clone()).unwrap();
        assert!(matches!(
            store.add_participant(join.clone()),
            Err(StoreError::UniqueViolation)
        ));
        assert!(store.remove_participant(conversation_id, member, now).unwrap());
        assert!(!store.remove_participant(conversation_id, member, now).unwrap());

        let rejoined = store.add_participant(join).unwrap();
        assert!(rejoined.is_active());
    }

    #[test]
    fn deleting_message_drops_its_reactions() {
        let store = MemoryConversationStore::new();
        let (conversation_id, user_id) = seed_conversation(&store);
        let posted = store
            .insert_message(message(conversation_id, user_id, Utc::now()))
            .unwrap();
        store
            .insert_reaction(NewReaction {
                id: Uuid::new_v4(),
                message_id: posted.id,
                user_id,
                emoji: "👍".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();

        assert!(store.delete_message(posted.id).unwrap());
        assert!(store.reactions_for_messages(&[posted.id]).unwrap().is_empty());
    }

    #[test]
    fn unread_counts_cover_only_active_memberships() {
        let store = MemoryConversationStore::new();
        let (busy, owner) = seed_conversation(&store);
        let (quiet, _) = seed_conversation(&store);
        let reader = Uuid::new_v4();
        let now = Utc::now();
        for conversation_id in [busy, quiet] {
            store
                .add_participant(NewParticipant {
                    conversation_id,
                    user_id: reader,
                    role: "member".to_string(),
                    joined_at: now,
                })
                .unwrap();
        }

        let earlier = now - Duration::seconds(30);
        store.insert_message(message(busy, owner, earlier)).unwrap();
        store.insert_message(message(busy, owner, now)).unwrap();
        store.insert_message(message(busy, reader, now)).unwrap();
        store
            .set_last_read(busy, reader, earlier + Duration::seconds(1))
            .unwrap();

        let counts = store.unread_counts(reader, &[busy, quiet]).unwrap();
        assert_eq!(counts.get(&busy), Some(&1));
        assert!(!counts.contains_key(&quiet));

        store.remove_participant(busy, reader, now).unwrap();
        assert!(store.unread_counts(reader, &[busy]).unwrap().is_empty());
        assert_eq!(store.participations_for_user(reader).unwrap().len(), 1);
    }
}
