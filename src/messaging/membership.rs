use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{NewParticipant, Participant, ParticipantRole, UserSummary};
use crate::store::StoreError;

use super::{MessagingError, MessagingResult, MessagingService};

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantView {
    pub user_id: Uuid,
    pub user: Option<UserSummary>,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub is_muted: bool,
}

impl ParticipantView {
    pub(crate) fn new(participant: &Participant, user: Option<UserSummary>) -> Self {
        Self {
            user_id: participant.user_id,
            user,
            role: participant.participant_role(),
            joined_at: participant.joined_at,
            last_read_at: participant.last_read_at,
            is_muted: participant.is_muted,
        }
    }
}

impl MessagingService {
    pub fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> MessagingResult<bool> {
        Ok(self.active_participant(conversation_id, user_id)?.is_some())
    }

    pub fn role_of(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> MessagingResult<Option<ParticipantRole>> {
        Ok(self
            .active_participant(conversation_id, user_id)?
            .map(|participant| participant.participant_role()))
    }

    /// Resolves the caller's active participant row. Absence, including a
    /// conversation that does not exist, is reported as access denied.
    pub fn require_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> MessagingResult<Participant> {
        self.active_participant(conversation_id, user_id)?
            .ok_or(MessagingError::AccessDenied)
    }

    fn active_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> MessagingResult<Option<Participant>> {
        Ok(self
            .store
            .find_participant(conversation_id, user_id)?
            .filter(Participant::is_active))
    }

    pub fn add_participant(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
        role: Option<ParticipantRole>,
    ) -> MessagingResult<ParticipantView> {
        let caller_role = self
            .require_participant(conversation_id, caller)?
            .participant_role();
        if !caller_role.can_add_participants() {
            return Err(MessagingError::AccessDenied);
        }

        let role = role.unwrap_or(ParticipantRole::Member);
        if role > caller_role {
            return Err(MessagingError::AccessDenied);
        }

        let user = self
            .store
            .find_user(user_id)?
            .filter(|user| user.is_active)
            .ok_or_else(|| MessagingError::validation("user not found"))?;

        let participant = self
            .store
            .add_participant(NewParticipant {
                conversation_id,
                user_id,
                role: role.to_db().to_string(),
                joined_at: Utc::now(),
            })
            .map_err(|err| match err {
                StoreError::UniqueViolation => {
                    MessagingError::Conflict("user is already a participant".to_string())
                }
                other => other.into(),
            })?;

        tracing::info!(
            %conversation_id,
            added_by = %caller,
            %user_id,
            role = %role,
            "participant added"
        );
        Ok(ParticipantView::new(&participant, Some(UserSummary::from(&user))))
    }

    /// Self-removal is always allowed; removing someone else needs `admin`.
    pub fn remove_participant(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> MessagingResult<()> {
        let caller_role = self
            .require_participant(conversation_id, caller)?
            .participant_role();
        if user_id != caller && !caller_role.can_remove_others() {
            return Err(MessagingError::AccessDenied);
        }

        if !self
            .store
            .remove_participant(conversation_id, user_id, Utc::now())?
        {
            return Err(MessagingError::NotFoundOrUnauthorized);
        }

        tracing::info!(%conversation_id, removed_by = %caller, %user_id, "participant removed");
        Ok(())
    }

    pub fn set_muted(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        muted: bool,
    ) -> MessagingResult<()> {
        self.require_participant(conversation_id, caller)?;
        self.store.set_muted(conversation_id, caller, muted)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::messaging::testing::{group, service, user};
    use crate::messaging::MessagingError;
    use crate::models::ParticipantRole;

    #[test]
    fn creator_is_the_only_admin_of_a_new_group() {
        let service = service();
        let alice = user(&service, "Alice");
        let conversation = group(&service, alice, "Team Standup");

        assert!(service.is_participant(conversation, alice).unwrap());
        assert_eq!(
            service.role_of(conversation, alice).unwrap(),
            Some(ParticipantRole::Admin)
        );
    }

    #[test]
    fn outsiders_are_denied() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Board");

        assert!(!service.is_participant(conversation, bob).unwrap());
        assert_eq!(service.role_of(conversation, bob).unwrap(), None);
        assert!(matches!(
            service.require_participant(conversation, bob),
            Err(MessagingError::AccessDenied)
        ));
        assert!(matches!(
            service.add_participant(bob, conversation, bob, None),
            Err(MessagingError::AccessDenied)
        ));
    }

    #[test]
    fn members_cannot_add_participants() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let carol = user(&service, "Carol");
        let conversation = group(&service, alice, "Volunteers");

        service.add_participant(alice, conversation, bob, None).unwrap();
        let result = service.add_participant(bob, conversation, carol, None);
        assert!(matches!(result, Err(MessagingError::AccessDenied)));
    }

    #[test]
    fn moderators_cannot_grant_admin() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let carol = user(&service, "Carol");
        let conversation = group(&service, alice, "Fundraising");

        service
            .add_participant(alice, conversation, bob, Some(ParticipantRole::Moderator))
            .unwrap();
        assert!(matches!(
            service.add_participant(bob, conversation, carol, Some(ParticipantRole::Admin)),
            Err(MessagingError::AccessDenied)
        ));
        let added = service
            .add_participant(bob, conversation, carol, None)
            .unwrap();
        assert_eq!(added.role, ParticipantRole::Member);
    }

    #[test]
    fn duplicate_participant_is_a_conflict() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Logistics");

        service.add_participant(alice, conversation, bob, None).unwrap();
        assert!(matches!(
            service.add_participant(alice, conversation, bob, None),
            Err(MessagingError::Conflict(_))
        ));
    }

    #[test]
    fn unknown_user_fails_validation() {
        let service = service();
        let alice = user(&service, "Alice");
        let conversation = group(&service, alice, "Logistics");

        assert!(matches!(
            service.add_participant(alice, conversation, uuid::Uuid::new_v4(), None),
            Err(MessagingError::ValidationFailed(_))
        ));
    }

    #[test]
    fn removal_rules() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let carol = user(&service, "Carol");
        let conversation = group(&service, alice, "Aid desk");
        service.add_participant(alice, conversation, bob, None).unwrap();
        service.add_participant(alice, conversation, carol, None).unwrap();

        assert!(matches!(
            service.remove_participant(bob, conversation, carol),
            Err(MessagingError::AccessDenied)
        ));

        service.remove_participant(bob, conversation, bob).unwrap();
        assert!(!service.is_participant(conversation, bob).unwrap());

        service.remove_participant(alice, conversation, carol).unwrap();
        assert!(matches!(
            service.remove_participant(alice, conversation, carol),
            Err(MessagingError::NotFoundOrUnauthorized)
        ));
    }

    #[test]
    fn left_participant_can_be_re_added() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Aid desk");

        service.add_participant(alice, conversation, bob, None).unwrap();
        service.remove_participant(bob, conversation, bob).unwrap();
        service.add_participant(alice, conversation, bob, None).unwrap();

        assert!(service.is_participant(conversation, bob).unwrap());
    }
}
