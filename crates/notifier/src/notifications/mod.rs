//! Notification state owned by the reconciliation pipeline.
//!
//! Two collections, each with exactly one writer:
//! - [`discrete::DiscreteNotifications`]: one-shot, immutable notification items
//! - [`ongoing::OngoingNotifications`]: in-flight progressions keyed by `event_id`

pub mod discrete;
pub mod ongoing;

use chrono::{DateTime, Utc};
use common::types::{EventLevel, ProgressionStartValue, Snowflake};
use serde::Serialize;
use std::fmt;

/// A terminal, displayable record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationItem {
    pub key: Snowflake,
    pub title: String,
    pub message: Option<String>,
    pub level: EventLevel,
    pub timestamp: DateTime<Utc>,
    /// Delivered live rather than replayed from the backlog.
    pub fresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OngoingState {
    Ongoing,
    Done,
    Error,
}

impl fmt::Display for OngoingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ongoing => write!(f, "ongoing"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A long-running operation reported through progression events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OngoingNotificationItem {
    pub event_id: Snowflake,
    pub state: OngoingState,
    pub progress: f64,
    pub total: Option<f64>,
    pub title: String,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub start_value: Option<ProgressionStartValue>,
}

/// Title and message the classifier derives for a discrete notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub title: String,
    pub message: Option<String>,
}

impl NotificationDraft {
    pub fn new(title: impl Into<String>, message: Option<String>) -> Self {
        Self {
            title: title.into(),
            message,
        }
    }
}
