//! Routes each incoming event to the reducers that care about it.
//!
//! `classify` is pure: it never touches reducer state. Titles are derived from
//! the payload here so the reducers only deal in drafts.

use crate::notifications::NotificationDraft;
use common::types::{
    Event, EventInner, EventKind, EventLevel, FsEvent, InstanceEvent, InstanceEventInner,
    MacroEvent, MacroEventInner, MacroExitStatus, Player, ProgressionEvent, ProgressionEventInner,
    ProgressionStartValue, Snowflake, UserEvent, UserEventInner,
};
use tracing::debug;

/// Transition for the ongoing-progress reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressAction {
    Start {
        event_id: Snowflake,
        progression_name: String,
        total: Option<f64>,
        inner: Option<ProgressionStartValue>,
    },
    Update {
        event_id: Snowflake,
        progress_delta: f64,
        message: Option<String>,
        level: Option<EventLevel>,
    },
    End {
        event_id: Snowflake,
        success: bool,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Append a discrete notification keyed by the event id.
    Notify(NotificationDraft),
    /// Apply a transition to the ongoing reducer.
    Progress(ProgressAction),
    /// Hand the event to registered side effects.
    SideEffect(EventKind),
}

/// Classify an event into zero or more routes. Unknown variants yield none.
pub fn classify(event: &Event) -> Vec<Route> {
    let kind = event.kind();
    if kind == EventKind::Unknown {
        debug!(event_id = %event.id(), "dropping event with unknown variant");
        metrics::counter!("notifier_events_dropped_total", "reason" => "unknown_variant")
            .increment(1);
        return Vec::new();
    }

    let primary = match &event.event_inner {
        EventInner::InstanceEvent(e) => instance_draft(e).map(Route::Notify),
        EventInner::UserEvent(e) => user_draft(e).map(Route::Notify),
        EventInner::MacroEvent(e) => macro_draft(e).map(Route::Notify),
        EventInner::FSEvent(e) => Some(Route::Notify(fs_draft(e))),
        EventInner::ProgressionEvent(e) => progress_action(e, event.level).map(Route::Progress),
        EventInner::Unknown => None,
    };

    let mut routes = Vec::with_capacity(2);
    routes.extend(primary);
    routes.push(Route::SideEffect(kind));
    routes
}

/// Returns `None` for sub-variants that never notify (console traffic, chat).
fn instance_draft(e: &InstanceEvent) -> Option<NotificationDraft> {
    let name = &e.instance_name;
    let draft = match &e.instance_event_inner {
        InstanceEventInner::StateTransition { to } => {
            NotificationDraft::new(format!("{name} is now {to}"), None)
        }
        InstanceEventInner::InstanceWarning { message } => {
            NotificationDraft::new(format!("Warning from {name}"), Some(message.clone()))
        }
        InstanceEventInner::InstanceError { message } => {
            NotificationDraft::new(format!("Error in {name}"), Some(message.clone()))
        }
        InstanceEventInner::InstanceCreationFailed { message } => {
            NotificationDraft::new(format!("Failed to create {name}"), Some(message.clone()))
        }
        InstanceEventInner::SystemMessage { message } => {
            NotificationDraft::new(format!("Message from {name}"), Some(message.clone()))
        }
        InstanceEventInner::PlayerChange {
            players_joined,
            players_left,
            ..
        } => player_change_draft(name, players_joined, players_left)?,
        InstanceEventInner::InstanceInput { .. }
        | InstanceEventInner::InstanceOutput { .. }
        | InstanceEventInner::PlayerMessage { .. }
        | InstanceEventInner::Unknown => return None,
    };
    Some(draft)
}

fn player_change_draft(
    instance_name: &str,
    joined: &[Player],
    left: &[Player],
) -> Option<NotificationDraft> {
    let names = |players: &[Player]| {
        players
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let title = match (joined.is_empty(), left.is_empty()) {
        (true, true) => return None,
        (false, true) => format!("{} joined {instance_name}", names(joined)),
        (true, false) => format!("{} left {instance_name}", names(left)),
        (false, false) => format!(
            "{} joined and {} left {instance_name}",
            names(joined),
            names(left)
        ),
    };
    Some(NotificationDraft::new(title, None))
}

fn user_draft(e: &UserEvent) -> Option<NotificationDraft> {
    let user = &e.user_id;
    let title = match &e.user_event_inner {
        UserEventInner::UserCreated => format!("User {user} created"),
        UserEventInner::UserDeleted => format!("User {user} deleted"),
        UserEventInner::UserLoggedIn => format!("User {user} logged in"),
        UserEventInner::UserLoggedOut => format!("User {user} logged out"),
        UserEventInner::UsernameChanged { new_username } => {
            format!("User {user} is now known as {new_username}")
        }
        UserEventInner::PermissionChanged => format!("Permissions of {user} changed"),
        UserEventInner::Unknown => return None,
    };
    Some(NotificationDraft::new(title, None))
}

fn macro_draft(e: &MacroEvent) -> Option<NotificationDraft> {
    let pid = e.macro_pid;
    let draft = match &e.macro_event_inner {
        MacroEventInner::Started => NotificationDraft::new(format!("Macro {pid} started"), None),
        MacroEventInner::Detach => NotificationDraft::new(format!("Macro {pid} detached"), None),
        MacroEventInner::Stopped { exit_status } => {
            let message = match exit_status {
                Some(MacroExitStatus::Success) => Some("exited successfully".to_string()),
                Some(MacroExitStatus::Killed) => Some("killed".to_string()),
                Some(MacroExitStatus::Error { error_msg }) => Some(error_msg.clone()),
                Some(MacroExitStatus::Unknown) | None => None,
            };
            NotificationDraft::new(format!("Macro {pid} stopped"), message)
        }
        MacroEventInner::Unknown => return None,
    };
    Some(draft)
}

fn fs_draft(e: &FsEvent) -> NotificationDraft {
    NotificationDraft::new(format!("File {}: {}", e.operation, e.target.path()), None)
}

fn progress_action(e: &ProgressionEvent, level: EventLevel) -> Option<ProgressAction> {
    let event_id = e.event_id;
    let action = match &e.progression_event_inner {
        ProgressionEventInner::ProgressionStart {
            progression_name,
            total,
            inner,
            ..
        } => ProgressAction::Start {
            event_id,
            progression_name: progression_name.clone(),
            total: *total,
            inner: inner.clone(),
        },
        ProgressionEventInner::ProgressionUpdate {
            progress_message,
            progress,
        } => ProgressAction::Update {
            event_id,
            progress_delta: *progress,
            message: progress_message.clone(),
            // Only an elevated level replaces the one set at start.
            level: (level != EventLevel::Info).then_some(level),
        },
        ProgressionEventInner::ProgressionEnd {
            success, message, ..
        } => ProgressAction::End {
            event_id,
            success: *success,
            message: message.clone(),
        },
        ProgressionEventInner::Unknown => return None,
    };
    Some(action)
}
