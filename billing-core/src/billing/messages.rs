use std::collections::BTreeSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::billing::invoicing::merge_messages;
use crate::models::message::{AssignmentTarget, Message, MessageAssignment};

/// Messages currently shown to a client.
///
/// `global` holds messages with an "all clients" row and `specific` those
/// assigned to this client directly. A message appearing in both is only
/// returned once.
pub fn active_for(global: Vec<Message>, specific: Vec<Message>, today: NaiveDate) -> Vec<Message> {
    merge_messages(global, specific)
        .into_iter()
        .filter(|message| message.is_active_on(today))
        .collect()
}

/// Assignment rows to add and remove to reach a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentPlan {
    pub insert: Vec<MessageAssignment>,
    pub delete: Vec<MessageAssignment>,
}

impl AssignmentPlan {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}

/// Reconciles a message's current assignment rows with `target`.
///
/// "All clients" and specific clients are mutually exclusive: moving to one
/// removes every row of the other kind. Rows already matching the target
/// are left alone.
pub fn plan_assignment(
    message_id: Uuid,
    current: &[MessageAssignment],
    target: &AssignmentTarget,
) -> AssignmentPlan {
    let wanted: BTreeSet<Option<Uuid>> = match target {
        AssignmentTarget::AllClients => BTreeSet::from([None]),
        AssignmentTarget::SpecificClients(clients) => {
            clients.iter().copied().map(Some).collect()
        }
    };
    let existing: BTreeSet<Option<Uuid>> = current.iter().map(|row| row.client_id).collect();

    let row = |client_id| MessageAssignment {
        message_id,
        client_id,
    };

    AssignmentPlan {
        insert: wanted.difference(&existing).copied().map(row).collect(),
        delete: existing.difference(&wanted).copied().map(row).collect(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn message(from: Option<NaiveDate>, until: Option<NaiveDate>) -> Message {
        Message {
            id: Uuid::new_v4(),
            text: "Notice".into(),
            from_date: from,
            until_date: until,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_window() {
        let today = date(2025, 6, 19);
        let current = message(Some(date(2025, 6, 14)), Some(date(2025, 6, 24)));
        let expired = message(None, Some(date(2025, 6, 18)));
        let future = message(Some(date(2025, 6, 20)), None);
        let open = message(None, None);

        let active = active_for(
            vec![current.clone(), expired, future],
            vec![open.clone()],
            today,
        );
        let ids: BTreeSet<_> = active.iter().map(|m| m.id).collect();
        assert_eq!(ids, BTreeSet::from([current.id, open.id]));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let today = date(2025, 6, 19);
        let starts_today = message(Some(today), None);
        let ends_today = message(None, Some(today));
        assert_eq!(active_for(vec![starts_today, ends_today], vec![], today).len(), 2);
    }

    #[test]
    fn test_message_in_both_sets_counted_once() {
        let shared = message(None, None);
        let active = active_for(vec![shared.clone()], vec![shared], date(2025, 6, 19));
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_assign_to_all_replaces_specific_rows() {
        let message_id = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let current = vec![
            MessageAssignment { message_id, client_id: Some(a) },
            MessageAssignment { message_id, client_id: Some(b) },
        ];

        let plan = plan_assignment(message_id, &current, &AssignmentTarget::AllClients);
        assert_eq!(plan.insert, vec![MessageAssignment { message_id, client_id: None }]);
        assert_eq!(plan.delete.len(), 2);
    }

    #[test]
    fn test_specific_clients_reconcile_and_drop_sentinel() {
        let message_id = Uuid::new_v4();
        let (keep, drop, add) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let current = vec![
            MessageAssignment { message_id, client_id: None },
            MessageAssignment { message_id, client_id: Some(keep) },
            MessageAssignment { message_id, client_id: Some(drop) },
        ];

        let plan = plan_assignment(
            message_id,
            &current,
            &AssignmentTarget::SpecificClients(BTreeSet::from([keep, add])),
        );

        assert_eq!(plan.insert, vec![MessageAssignment { message_id, client_id: Some(add) }]);
        let deleted: BTreeSet<_> = plan.delete.iter().map(|row| row.client_id).collect();
        assert_eq!(deleted, BTreeSet::from([None, Some(drop)]));
    }

    #[test]
    fn test_unchanged_target_plans_nothing() {
        let message_id = Uuid::new_v4();
        let current = vec![MessageAssignment { message_id, client_id: None }];
        assert!(plan_assignment(message_id, &current, &AssignmentTarget::AllClients).is_empty());
    }
}
