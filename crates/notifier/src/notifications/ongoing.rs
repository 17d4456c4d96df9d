use super::{NotificationDraft, OngoingNotificationItem, OngoingState};
use common::types::{Event, EventLevel, ProgressionStartValue, Snowflake};
use std::collections::HashMap;
use tracing::debug;

/// Result of a progression reaching its end: what to append to the discrete list.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub event_id: Snowflake,
    pub state: OngoingState,
    pub draft: NotificationDraft,
    pub level: EventLevel,
}

/// In-flight progressions keyed by the start event's `event_id`.
///
/// Items move `absent -> ongoing -> {done, error}`; the terminal states are
/// transient, the item is removed as soon as it enters one.
#[derive(Debug, Default)]
pub struct OngoingNotifications {
    items: HashMap<Snowflake, OngoingNotificationItem>,
    // Start order, for stable listing.
    order: Vec<Snowflake>,
}

impl OngoingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// `absent -> ongoing`. A second start for a live id is ignored.
    pub fn start(
        &mut self,
        event_id: Snowflake,
        start_event: &Event,
        progression_name: &str,
        total: Option<f64>,
        start_value: Option<ProgressionStartValue>,
    ) -> bool {
        if self.items.contains_key(&event_id) {
            debug!(event_id = %event_id, "progression already ongoing, ignoring start");
            return false;
        }

        self.items.insert(
            event_id,
            OngoingNotificationItem {
                event_id,
                state: OngoingState::Ongoing,
                progress: 0.0,
                total: total.filter(|t| t.is_finite() && *t >= 0.0),
                title: progression_name.to_string(),
                message: None,
                timestamp: start_event.timestamp(),
                level: start_event.level,
                start_value,
            },
        );
        self.order.push(event_id);
        metrics::gauge!("notifier_ongoing_operations").set(self.items.len() as f64);
        true
    }

    /// `ongoing -> ongoing`. Progress only moves forward and never past `total`.
    /// Message and level are overwritten only when provided.
    pub fn update(
        &mut self,
        event_id: Snowflake,
        progress_delta: f64,
        message: Option<String>,
        level: Option<EventLevel>,
    ) -> bool {
        let Some(item) = self.items.get_mut(&event_id) else {
            debug!(event_id = %event_id, "dropping update for unknown progression");
            return false;
        };

        let delta = if progress_delta.is_finite() {
            progress_delta.max(0.0)
        } else {
            0.0
        };
        let next = item.progress + delta;
        item.progress = match item.total {
            Some(total) => next.min(total),
            None => next,
        };
        if message.is_some() {
            item.message = message;
        }
        if let Some(level) = level {
            item.level = level;
        }
        true
    }

    /// `ongoing -> done | error -> removed`. Returns the completion to forward to
    /// the discrete list, or `None` when the id was never started.
    pub fn end(
        &mut self,
        event_id: Snowflake,
        success: bool,
        message: Option<String>,
    ) -> Option<Completion> {
        let Some(mut item) = self.items.remove(&event_id) else {
            debug!(event_id = %event_id, "dropping end for unknown progression");
            return None;
        };
        self.order.retain(|id| *id != event_id);
        metrics::gauge!("notifier_ongoing_operations").set(self.items.len() as f64);

        item.state = if success {
            OngoingState::Done
        } else {
            OngoingState::Error
        };
        if message.is_some() {
            item.message = message;
        }
        if let (true, Some(total)) = (success, item.total) {
            item.progress = total;
        }

        Some(Completion {
            event_id,
            state: item.state,
            level: if success { item.level } else { EventLevel::Error },
            draft: NotificationDraft::new(item.title, item.message),
        })
    }

    pub fn get(&self, event_id: Snowflake) -> Option<&OngoingNotificationItem> {
        self.items.get(&event_id)
    }

    /// Live items in start order.
    pub fn items(&self) -> Vec<&OngoingNotificationItem> {
        self.order
            .iter()
            .filter_map(|id| self.items.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
        metrics::gauge!("notifier_ongoing_operations").set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{CausedBy, EventInner};

    fn start_event(id: u64, level: EventLevel) -> Event {
        Event {
            snowflake: Snowflake::new(id),
            level,
            // The reducer only reads id, level and timestamp from the start event.
            event_inner: EventInner::Unknown,
            details: String::new(),
            caused_by: CausedBy::Unknown,
        }
    }

    fn started(total: Option<f64>) -> OngoingNotifications {
        let mut ongoing = OngoingNotifications::new();
        assert!(ongoing.start(
            Snowflake::new(1),
            &start_event(1, EventLevel::Info),
            "Creating Survival",
            total,
            None,
        ));
        ongoing
    }

    #[test]
    fn test_progress_accumulates_and_clamps_to_total() {
        let mut ongoing = started(Some(4.0));
        for _ in 0..3 {
            ongoing.update(Snowflake::new(1), 1.0, None, None);
        }
        let item = ongoing.get(Snowflake::new(1)).unwrap();
        assert_eq!(item.progress, 3.0);
        assert_eq!(item.state, OngoingState::Ongoing);

        ongoing.update(Snowflake::new(1), 5.0, None, None);
        assert_eq!(ongoing.get(Snowflake::new(1)).unwrap().progress, 4.0);
    }

    #[test]
    fn test_progress_unbounded_without_total() {
        let mut ongoing = started(None);
        ongoing.update(Snowflake::new(1), 250.0, None, None);
        ongoing.update(Snowflake::new(1), 250.0, None, None);
        assert_eq!(ongoing.get(Snowflake::new(1)).unwrap().progress, 500.0);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut ongoing = started(Some(10.0));
        let mut last = 0.0;
        for delta in [2.0, -5.0, f64::NAN, 1.0, -0.5, 20.0] {
            ongoing.update(Snowflake::new(1), delta, None, None);
            let progress = ongoing.get(Snowflake::new(1)).unwrap().progress;
            assert!(progress >= last, "progress went from {last} to {progress}");
            assert!(progress <= 10.0);
            last = progress;
        }
    }

    #[test]
    fn test_update_is_sparse() {
        let mut ongoing = started(Some(4.0));
        ongoing.update(
            Snowflake::new(1),
            1.0,
            Some("Downloading server jar".to_string()),
            Some(EventLevel::Warning),
        );
        ongoing.update(Snowflake::new(1), 1.0, None, None);

        let item = ongoing.get(Snowflake::new(1)).unwrap();
        assert_eq!(item.message.as_deref(), Some("Downloading server jar"));
        assert_eq!(item.level, EventLevel::Warning);
    }

    #[test]
    fn test_end_removes_item_and_returns_completion() {
        let mut ongoing = started(Some(4.0));
        ongoing.update(Snowflake::new(1), 1.0, Some("Setting up".to_string()), None);

        let completion = ongoing
            .end(Snowflake::new(1), true, Some("Done".to_string()))
            .unwrap();

        assert_eq!(completion.state, OngoingState::Done);
        assert_eq!(completion.draft.title, "Creating Survival");
        assert_eq!(completion.draft.message.as_deref(), Some("Done"));
        assert_eq!(completion.level, EventLevel::Info);
        assert!(ongoing.is_empty());
        assert!(ongoing.items().is_empty());
    }

    #[test]
    fn test_failed_end_keeps_last_message_and_raises_level() {
        let mut ongoing = started(None);
        ongoing.update(Snowflake::new(1), 1.0, Some("Unpacking".to_string()), None);

        let completion = ongoing.end(Snowflake::new(1), false, None).unwrap();

        assert_eq!(completion.state, OngoingState::Error);
        assert_eq!(completion.draft.message.as_deref(), Some("Unpacking"));
        assert_eq!(completion.level, EventLevel::Error);
    }

    #[test]
    fn test_unknown_ids_are_tolerated() {
        let mut ongoing = OngoingNotifications::new();
        assert!(!ongoing.update(Snowflake::new(9), 1.0, None, None));
        assert!(ongoing
            .end(Snowflake::new(9), true, Some("Done".to_string()))
            .is_none());
        assert!(ongoing.is_empty());
    }

    #[test]
    fn test_duplicate_start_keeps_single_item() {
        let mut ongoing = started(Some(4.0));
        ongoing.update(Snowflake::new(1), 2.0, None, None);
        assert!(!ongoing.start(
            Snowflake::new(1),
            &start_event(1, EventLevel::Info),
            "Creating Survival again",
            Some(8.0),
            None,
        ));

        assert_eq!(ongoing.len(), 1);
        let item = ongoing.get(Snowflake::new(1)).unwrap();
        assert_eq!(item.progress, 2.0);
        assert_eq!(item.title, "Creating Survival");
    }

    #[test]
    fn test_items_listed_in_start_order() {
        let mut ongoing = OngoingNotifications::new();
        for id in [5, 3, 8] {
            ongoing.start(
                Snowflake::new(id),
                &start_event(id, EventLevel::Info),
                "op",
                None,
                None,
            );
        }
        ongoing.end(Snowflake::new(3), true, None);
        let ids: Vec<u64> = ongoing.items().iter().map(|i| i.event_id.as_u64()).collect();
        assert_eq!(ids, vec![5, 8]);
    }
}
