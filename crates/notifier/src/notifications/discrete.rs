use super::{NotificationDraft, NotificationItem};
use common::types::{Event, EventLevel, Snowflake};
use std::collections::HashSet;
use tracing::warn;

/// Append-only, de-duplicated list of discrete notifications.
///
/// Items keep insertion order; consumers choose their own display order.
#[derive(Debug, Default)]
pub struct DiscreteNotifications {
    items: Vec<NotificationItem>,
    keys: HashSet<Snowflake>,
}

impl DiscreteNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification for `event`. A second add for the same event id is a no-op.
    ///
    /// Returns the appended item, or `None` when the id was already present.
    pub fn add(
        &mut self,
        draft: NotificationDraft,
        event: &Event,
        fresh: bool,
    ) -> Option<&NotificationItem> {
        self.push(draft, event.id(), event.level, fresh)
    }

    /// Append with an explicit key and level, used for synthesized completions
    /// and manual entries.
    pub fn push(
        &mut self,
        draft: NotificationDraft,
        key: Snowflake,
        level: EventLevel,
        fresh: bool,
    ) -> Option<&NotificationItem> {
        if !self.keys.insert(key) {
            warn!(key = %key, "dropping duplicate notification");
            metrics::counter!("notifier_duplicate_events_total").increment(1);
            return None;
        }

        self.items.push(NotificationItem {
            key,
            title: draft.title,
            message: draft.message,
            level,
            timestamp: key.timestamp(),
            fresh,
        });
        metrics::counter!("notifier_notifications_total").increment(1);
        self.items.last()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
    }

    pub fn items(&self) -> &[NotificationItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: Snowflake) -> bool {
        self.keys.contains(&key)
    }
}
