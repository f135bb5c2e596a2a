use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::{
    dsl::count_star,
    pg::PgConnection,
    prelude::*,
    r2d2::{ConnectionManager, PooledConnection},
};
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{
    Conversation, ConversationChanges, Message, NewConversation, NewMessage, NewParticipant,
    NewReaction, NewUser, Participant, Reaction, User,
};
use crate::schema::{conversation_participants, conversations, message_reactions, messages, users};

use super::{ConversationStore, StoreError, StoreResult};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<PgPooledConnection> {
        Ok(self.pool.get()?)
    }
}

impl ConversationStore for PgConversationStore {
    fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(users::table)
            .values(&user)
            .get_result(&mut conn)?)
    }

    fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table.find(user_id).first(&mut conn).optional()?)
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::email.eq(email))
            .first(&mut conn)
            .optional()?)
    }

    fn users_by_ids(&self, user_ids: &[Uuid]) -> StoreResult<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::id.eq_any(user_ids))
            .load(&mut conn)?)
    }

    fn set_user_active(&self, user_id: Uuid, active: bool) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(users::table.find(user_id))
            .set((users::is_active.eq(active), users::updated_at.eq(Utc::now())))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn create_conversation(
        &self,
        conversation: NewConversation,
        participants: Vec<NewParticipant>,
    ) -> StoreResult<Conversation> {
        let mut conn = self.conn()?;
        conn.transaction::<Conversation, StoreError, _>(|conn| {
            let created: Conversation = diesel::insert_into(conversations::table)
                .values(&conversation)
                .get_result(conn)?;
            diesel::insert_into(conversation_participants::table)
                .values(&participants)
                .execute(conn)?;
            Ok(created)
        })
    }

    fn find_conversation(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>> {
        let mut conn = self.conn()?;
        Ok(conversations::table
            .find(conversation_id)
            .first(&mut conn)
            .optional()?)
    }

    fn update_conversation(
        &self,
        conversation_id: Uuid,
        changes: ConversationChanges,
    ) -> StoreResult<Conversation> {
        let mut conn = self.conn()?;
        Ok(diesel::update(conversations::table.find(conversation_id))
            .set(&changes)
            .get_result(&mut conn)?)
    }

    fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let mut conn = self.conn()?;
        Ok(conversations::table
            .inner_join(conversation_participants::table)
            .filter(conversation_participants::user_id.eq(user_id))
            .filter(conversation_participants::left_at.is_null())
            .select(conversations::all_columns)
            .order((
                conversations::last_message_at.desc().nulls_last(),
                conversations::created_at.desc(),
            ))
            .load(&mut conn)?)
    }

    fn find_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        let mut conn = self.conn()?;
        Ok(conversation_participants::table
            .find((conversation_id, user_id))
            .first(&mut conn)
            .optional()?)
    }

    fn participations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Participant>> {
        let mut conn = self.conn()?;
        Ok(conversation_participants::table
            .filter(conversation_participants::user_id.eq(user_id))
            .filter(conversation_participants::left_at.is_null())
            .order(conversation_participants::joined_at.asc())
            .load(&mut conn)?)
    }

    fn active_participants(&self, conversation_ids: &[Uuid]) -> StoreResult<Vec<Participant>> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        Ok(conversation_participants::table
            .filter(conversation_participants::conversation_id.eq_any(conversation_ids))
            .filter(conversation_participants::left_at.is_null())
            .order(conversation_participants::joined_at.asc())
            .load(&mut conn)?)
    }

    fn add_participant(&self, participant: NewParticipant) -> StoreResult<Participant> {
        let mut conn = self.conn()?;
        conn.transaction::<Participant, StoreError, _>(|conn| {
            let key = (participant.conversation_id, participant.user_id);
            let existing: Option<Participant> = conversation_participants::table
                .find(key)
                .for_update()
                .first(conn)
                .optional()?;

            match existing {
                Some(row) if row.is_active() => Err(StoreError::UniqueViolation),
                Some(_) => Ok(diesel::update(conversation_participants::table.find(key))
                    .set((
                        conversation_participants::role.eq(&participant.role),
                        conversation_participants::joined_at.eq(participant.joined_at),
                        conversation_participants::last_read_at.eq(None::<DateTime<Utc>>),
                        conversation_participants::is_muted.eq(false),
                        conversation_participants::left_at.eq(None::<DateTime<Utc>>),
                    ))
                    .get_result(conn)?),
                None => Ok(diesel::insert_into(conversation_participants::table)
                    .values(&participant)
                    .get_result(conn)?),
            }
        })
    }

    fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            conversation_participants::table
                .find((conversation_id, user_id))
                .filter(conversation_participants::left_at.is_null()),
        )
        .set(conversation_participants::left_at.eq(Some(left_at)))
        .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn set_last_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::update(
            conversation_participants::table
                .find((conversation_id, user_id))
                .filter(conversation_participants::left_at.is_null()),
        )
        .set(conversation_participants::last_read_at.eq(Some(read_at)))
        .execute(&mut conn)?;
        Ok(())
    }

    fn set_muted(&self, conversation_id: Uuid, user_id: Uuid, muted: bool) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            conversation_participants::table
                .find((conversation_id, user_id))
                .filter(conversation_participants::left_at.is_null()),
        )
        .set(conversation_participants::is_muted.eq(muted))
        .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut conn = self.conn()?;
        conn.transaction::<Message, StoreError, _>(|conn| {
            let created: Message = diesel::insert_into(messages::table)
                .values(&message)
                .get_result(conn)?;

            let current: Option<DateTime<Utc>> = conversations::table
                .find(created.conversation_id)
                .select(conversations::last_message_at)
                .for_update()
                .first(conn)?;

            // Never move the denormalized timestamp backwards.
            if current.map_or(true, |at| at < created.created_at) {
                diesel::update(conversations::table.find(created.conversation_id))
                    .set((
                        conversations::last_message_at.eq(Some(created.created_at)),
                        conversations::updated_at.eq(created.created_at),
                    ))
                    .execute(conn)?;
            }

            Ok(created)
        })
    }

    fn find_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        let mut conn = self.conn()?;
        Ok(messages::table.find(message_id).first(&mut conn).optional()?)
    }

    fn messages_by_ids(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Message>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        Ok(messages::table
            .filter(messages::id.eq_any(message_ids))
            .load(&mut conn)?)
    }

    fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Message>> {
        let mut conn = self.conn()?;
        Ok(messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .order((messages::created_at.desc(), messages::id.desc()))
            .limit(limit)
            .offset(offset)
            .load(&mut conn)?)
    }

    fn latest_messages(&self, conversation_ids: &[Uuid]) -> StoreResult<Vec<Message>> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        Ok(messages::table
            .filter(messages::conversation_id.eq_any(conversation_ids))
            .distinct_on(messages::conversation_id)
            .order((
                messages::conversation_id,
                messages::created_at.desc(),
                messages::id.desc(),
            ))
            .load(&mut conn)?)
    }

    fn update_message_content(
        &self,
        message_id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let mut conn = self.conn()?;
        Ok(diesel::update(messages::table.find(message_id))
            .set((
                messages::content.eq(content),
                messages::is_edited.eq(true),
                messages::edited_at.eq(Some(edited_at)),
            ))
            .get_result(&mut conn)?)
    }

    fn delete_message(&self, message_id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        conn.transaction::<bool, StoreError, _>(|conn| {
            diesel::delete(
                message_reactions::table.filter(message_reactions::message_id.eq(message_id)),
            )
            .execute(conn)?;
            let deleted = diesel::delete(messages::table.find(message_id)).execute(conn)?;
            Ok(deleted > 0)
        })
    }

    fn file_path_in_use(&self, file_path: &str) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let referencing: i64 = messages::table
            .filter(messages::file_path.eq(file_path))
            .count()
            .get_result(&mut conn)?;
        Ok(referencing > 0)
    }

    fn unread_counts(
        &self,
        user_id: Uuid,
        conversation_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, i64>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.conn()?;
        let rows: Vec<(Uuid, i64)> = messages::table
            .inner_join(
                conversation_participants::table.on(conversation_participants::conversation_id
                    .eq(messages::conversation_id)
                    .and(conversation_participants::user_id.eq(user_id))),
            )
            .filter(messages::conversation_id.eq_any(conversation_ids))
            .filter(conversation_participants::left_at.is_null())
            .filter(messages::sender_id.ne(user_id))
            .filter(
                conversation_participants::last_read_at
                    .is_null()
                    .nullable()
                    .or(messages::created_at
                        .nullable()
                        .gt(conversation_participants::last_read_at)),
            )
            .group_by(messages::conversation_id)
            .select((messages::conversation_id, count_star()))
            .load(&mut conn)?;
        Ok(rows.into_iter().collect())
    }

    fn insert_reaction(&self, reaction: NewReaction) -> StoreResult<Reaction> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(message_reactions::table)
            .values(&reaction)
            .get_result(&mut conn)?)
    }

    fn find_reaction(&self, reaction_id: Uuid) -> StoreResult<Option<Reaction>> {
        let mut conn = self.conn()?;
        Ok(message_reactions::table
            .find(reaction_id)
            .first(&mut conn)
            .optional()?)
    }

    fn delete_reaction(&self, reaction_id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(message_reactions::table.find(reaction_id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn reactions_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        Ok(message_reactions::table
            .filter(message_reactions::message_id.eq_any(message_ids))
            .order(message_reactions::created_at.asc())
            .load(&mut conn)?)
    }
}
