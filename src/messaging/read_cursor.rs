use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{MessagingResult, MessagingService};

impl MessagingService {
    /// Moves the caller's read cursor to now and returns the new value.
    pub fn mark_read(&self, caller: Uuid, conversation_id: Uuid) -> MessagingResult<DateTime<Utc>> {
        self.require_participant(conversation_id, caller)?;
        let now = Utc::now();
        self.store.set_last_read(conversation_id, caller, now)?;
        Ok(now)
    }

    /// Messages from other participants newer than the caller's cursor. A
    /// caller who never read the conversation sees every such message.
    pub fn unread_count(&self, caller: Uuid, conversation_id: Uuid) -> MessagingResult<i64> {
        self.require_participant(conversation_id, caller)?;
        let counts = self.store.unread_counts(caller, &[conversation_id])?;
        Ok(counts.get(&conversation_id).copied().unwrap_or(0))
    }

    /// Unread messages across every non-muted conversation of the caller;
    /// drives the notification badge.
    pub fn total_unread(&self, caller: Uuid) -> MessagingResult<i64> {
        let audible: Vec<Uuid> = self
            .store
            .participations_for_user(caller)?
            .into_iter()
            .filter(|participant| !participant.is_muted)
            .map(|participant| participant.conversation_id)
            .collect();

        Ok(self.store.unread_counts(caller, &audible)?.values().sum())
    }

    /// Cursor advance performed while listing. Never fails the listing.
    pub(crate) fn mark_read_quietly(&self, caller: Uuid, conversation_id: Uuid) {
        if let Err(err) = self.store.set_last_read(conversation_id, caller, Utc::now()) {
            tracing::warn!(
                %conversation_id,
                user_id = %caller,
                error = %err,
                "failed to advance read cursor"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::messaging::testing::{group, say, service, user};
    use crate::messaging::MessagingError;

    #[test]
    fn never_read_counts_every_foreign_message() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Team Standup");
        service.add_participant(alice, conversation, bob, None).unwrap();

        say(&service, conversation, alice, "one");
        say(&service, conversation, alice, "two");
        say(&service, conversation, bob, "mine");

        assert_eq!(service.unread_count(bob, conversation).unwrap(), 2);
        assert_eq!(service.unread_count(alice, conversation).unwrap(), 1);
    }

    #[test]
    fn mark_read_drops_count_to_newer_messages_only() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Team Standup");
        service.add_participant(alice, conversation, bob, None).unwrap();
        say(&service, conversation, alice, "before");

        let before = service.unread_count(bob, conversation).unwrap();
        service.mark_read(bob, conversation).unwrap();
        let after = service.unread_count(bob, conversation).unwrap();
        assert!(after <= before);
        assert_eq!(after, 0);

        std::thread::sleep(std::time::Duration::from_millis(2));
        say(&service, conversation, alice, "after");
        assert_eq!(service.unread_count(bob, conversation).unwrap(), 1);
    }

    #[test]
    fn muted_conversations_do_not_count_toward_badge() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let loud = group(&service, alice, "Loud");
        let quiet = group(&service, alice, "Quiet");
        service.add_participant(alice, loud, bob, None).unwrap();
        service.add_participant(alice, quiet, bob, None).unwrap();
        say(&service, loud, alice, "ping");
        say(&service, quiet, alice, "ping");

        service.set_muted(bob, quiet, true).unwrap();
        assert_eq!(service.total_unread(bob).unwrap(), 1);
    }

    #[test]
    fn outsiders_get_no_count() {
        let service = service();
        let alice = user(&service, "Alice");
        let bob = user(&service, "Bob");
        let conversation = group(&service, alice, "Board");

        assert!(matches!(
            service.unread_count(bob, conversation),
            Err(MessagingError::AccessDenied)
        ));
        assert!(matches!(
            service.mark_read(bob, conversation),
            Err(MessagingError::AccessDenied)
        ));
    }
}
