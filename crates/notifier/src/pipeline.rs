use crate::classifier::{classify, ProgressAction, Route};
use crate::notifications::discrete::DiscreteNotifications;
use crate::notifications::ongoing::OngoingNotifications;
use crate::notifications::{NotificationDraft, NotificationItem, OngoingNotificationItem};
use common::types::{Event, EventKind, EventLevel, Snowflake};

/// What a single `ingest` changed, for the caller to fan out.
#[derive(Debug, Default)]
pub struct Ingested {
    /// Discrete items appended, in append order.
    pub appended: Vec<NotificationItem>,
    /// Side-effect key to dispatch, if the event has one.
    pub side_effect: Option<EventKind>,
    /// The event's key was already present; nothing downstream should react.
    pub duplicate: bool,
}

/// Owns both reducers and performs the ongoing -> discrete forward on completion.
///
/// Nothing outside this type mutates either collection.
#[derive(Debug, Default)]
pub struct NotificationPipeline {
    discrete: DiscreteNotifications,
    ongoing: OngoingNotifications,
}

impl NotificationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, event: &Event, fresh: bool) -> Ingested {
        let mut out = Ingested::default();

        for route in classify(event) {
            match route {
                Route::Notify(draft) => match self.discrete.add(draft, event, fresh) {
                    Some(item) => out.appended.push(item.clone()),
                    None => out.duplicate = true,
                },
                Route::Progress(action) => self.apply_progress(action, event, fresh, &mut out),
                Route::SideEffect(kind) => out.side_effect = Some(kind),
            }
        }

        out
    }

    fn apply_progress(
        &mut self,
        action: ProgressAction,
        event: &Event,
        fresh: bool,
        out: &mut Ingested,
    ) {
        match action {
            ProgressAction::Start {
                event_id,
                progression_name,
                total,
                inner,
            } => {
                self.ongoing
                    .start(event_id, event, &progression_name, total, inner);
            }
            ProgressAction::Update {
                event_id,
                progress_delta,
                message,
                level,
            } => {
                self.ongoing.update(event_id, progress_delta, message, level);
            }
            ProgressAction::End {
                event_id,
                success,
                message,
            } => {
                let Some(completion) = self.ongoing.end(event_id, success, message) else {
                    return;
                };
                // Keyed by the end event so the completion sorts by its arrival.
                let pushed = self
                    .discrete
                    .push(completion.draft, event.id(), completion.level, fresh);
                if let Some(item) = pushed {
                    out.appended.push(item.clone());
                }
            }
        }
    }

    /// Manual add for flows that are not event driven.
    pub fn add(
        &mut self,
        draft: NotificationDraft,
        key: Snowflake,
        level: EventLevel,
        fresh: bool,
    ) -> Option<NotificationItem> {
        self.discrete.push(draft, key, level, fresh).cloned()
    }

    /// Empty the discrete list.
    pub fn clear(&mut self) {
        self.discrete.clear();
    }

    /// Session reset: both collections back to empty.
    pub fn reset(&mut self) {
        self.discrete.clear();
        self.ongoing.clear();
    }

    pub fn notifications(&self) -> &[NotificationItem] {
        self.discrete.items()
    }

    pub fn ongoing(&self) -> Vec<OngoingNotificationItem> {
        self.ongoing.items().into_iter().cloned().collect()
    }

    pub fn ongoing_item(&self, event_id: Snowflake) -> Option<&OngoingNotificationItem> {
        self.ongoing.get(event_id)
    }
}
