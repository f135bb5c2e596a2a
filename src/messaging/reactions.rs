use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{NewReaction, Reaction};
use crate::store::StoreError;

use super::{MessagingError, MessagingResult, MessagingService};

const MAX_EMOJI_CHARS: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct ReactionView {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl From<Reaction> for ReactionView {
    fn from(reaction: Reaction) -> Self {
        Self {
            id: reaction.id,
            message_id: reaction.message_id,
            user_id: reaction.user_id,
            emoji: reaction.emoji,
            created_at: reaction.created_at,
        }
    }
}

/// Reactions of one message folded per emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
    pub reacted_by_me: bool,
    /// The viewer's own reaction, so it can be removed.
    pub my_reaction_id: Option<Uuid>,
}

/// Groups reactions by emoji. Most used emoji first; ties keep the order in
/// which each emoji was first used.
pub fn aggregate<'a, I>(reactions: I, viewer: Uuid) -> Vec<ReactionSummary>
where
    I: IntoIterator<Item = &'a Reaction>,
{
    let mut ordered: Vec<&Reaction> = reactions.into_iter().collect();
    ordered.sort_by_key(|reaction| reaction.created_at);

    let mut summaries: Vec<ReactionSummary> = Vec::new();
    for reaction in ordered {
        let index = match summaries.iter().position(|s| s.emoji == reaction.emoji) {
            Some(index) => index,
            None => {
                summaries.push(ReactionSummary {
                    emoji: reaction.emoji.clone(),
                    count: 0,
                    user_ids: Vec::new(),
                    reacted_by_me: false,
                    my_reaction_id: None,
                });
                summaries.len() - 1
            }
        };
        let summary = &mut summaries[index];
        summary.count += 1;
        summary.user_ids.push(reaction.user_id);
        if reaction.user_id == viewer {
            summary.reacted_by_me = true;
            summary.my_reaction_id = Some(reaction.id);
        }
    }

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

fn normalize_emoji(raw: &str) -> MessagingResult<String> {
    let emoji = raw.trim();
    if emoji.is_empty() {
        return Err(MessagingError::validation("emoji must not be empty"));
    }
    if emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(MessagingError::validation("emoji is too long"));
    }
    Ok(emoji.to_string())
}

impl MessagingService {
    pub fn add_reaction(
        &self,
        caller: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> MessagingResult<ReactionView> {
        let emoji = normalize_emoji(emoji)?;
        let message = self
            .store
            .find_message(message_id)?
            .ok_or(MessagingError::NotFoundOrUnauthorized)?;
        self.require_participant(message.conversation_id, caller)?;

        let reaction = self
            .store
            .insert_reaction(NewReaction {
                id: Uuid::new_v4(),
                message_id,
                user_id: caller,
                emoji,
                created_at: Utc::now(),
            })
            .map_err(|err| match err {
                StoreError::UniqueViolation => {
                    MessagingError::Conflict("reaction already exists".to_string())
                }
                other => other.into(),
            })?;

        Ok(reaction.into())
    }

    /// Only the owner may remove a reaction. Missing, foreign, or mismatched
    /// reactions all answer `NotFoundOrUnauthorized`, like message edits.
    pub fn remove_reaction(
        &self,
        caller: Uuid,
        message_id: Uuid,
        reaction_id: Uuid,
    ) -> MessagingResult<()> {
        let reaction = self
            .store
            .find_reaction(reaction_id)?
            .filter(|reaction| reaction.message_id == message_id && reaction.user_id == caller)
            .ok_or(MessagingError::NotFoundOrUnauthorized)?;

        if !self.store.delete_reaction(reaction.id)? {
            return Err(MessagingError::NotFoundOrUnauthorized);
        }
        Ok(())
    }

    pub fn list_reactions(
        &self,
        caller: Uuid,
        message_id: Uuid,
    ) -> MessagingResult<Vec<ReactionSummary>> {
        let message = self
            .store
            .find_message(message_id)?
            .ok_or(MessagingError::NotFoundOrUnauthorized)?;
        self.require_participant(message.conversation_id, caller)?;

        let reactions = self.store.reactions_for_messages(&[message_id])?;
        Ok(aggregate(&reactions, caller))
    }
}
