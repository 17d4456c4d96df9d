//! Shared handle over the notification pipeline.
//!
//! # Session guard
//!
//! Every event is ingested on behalf of a [`SessionId`]. Beginning or ending a
//! session bumps the generation and resets both collections under the same
//! lock that `ingest` takes, so once `end_session` returns no event from the
//! old session can reach the reducers. A backlog fetch that resolves after
//! teardown is discarded rather than applied.
//!
//! # Fan-out
//!
//! - **`broadcast`** of every appended notification, for live consumers
//! - **`watch`** of the connection status, latest value wins
//! - side effects through [`SideEffectDispatcher`] for fresh events only

use crate::dispatcher::SideEffectDispatcher;
use crate::notifications::{NotificationDraft, NotificationItem, OngoingNotificationItem};
use crate::pipeline::NotificationPipeline;
use anyhow::Result;
use chrono::Utc;
use common::types::{Event, EventKind, EventLevel, Snowflake};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

/// Retries when a minted local key is already taken.
const LOCAL_KEY_ATTEMPTS: usize = 4;

/// Connection health reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No active session.
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Live connection dropped; reconnecting.
    Degraded,
    /// Last connection attempt failed.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Degraded => write!(f, "degraded"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct CenterState {
    session: SessionId,
    pipeline: NotificationPipeline,
}

struct Inner {
    state: Mutex<CenterState>,
    dispatcher: SideEffectDispatcher,
    status_tx: watch::Sender<ConnectionStatus>,
    notifications_tx: broadcast::Sender<NotificationItem>,
    local_sequence: AtomicU64,
}

/// Cheap-to-clone handle shared by the source, the API and side-effect owners.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    /// `capacity` bounds the broadcast buffer of new notifications.
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Idle);
        let (notifications_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CenterState {
                    session: SessionId(0),
                    pipeline: NotificationPipeline::new(),
                }),
                dispatcher: SideEffectDispatcher::new(),
                status_tx,
                notifications_tx,
                local_sequence: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CenterState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new session: previous state is cleared and earlier sessions go stale.
    pub fn begin_session(&self) -> SessionId {
        let session = {
            let mut state = self.lock();
            state.session = SessionId(state.session.0 + 1);
            state.pipeline.reset();
            state.session
        };
        info!(session = %session, "notification session started");
        session
    }

    /// Invalidate the current session and clear all state.
    pub fn end_session(&self) {
        let ended = {
            let mut state = self.lock();
            let ended = state.session;
            state.session = SessionId(ended.0 + 1);
            state.pipeline.reset();
            ended
        };
        self.set_status(ConnectionStatus::Idle);
        info!(session = %ended, "notification session ended");
    }

    pub fn is_current(&self, session: SessionId) -> bool {
        self.lock().session == session
    }

    /// Feed one event through the pipeline. Returns `false` when the session is stale.
    pub fn ingest(&self, session: SessionId, event: &Event, fresh: bool) -> bool {
        let ingested = {
            let mut state = self.lock();
            if state.session != session {
                debug!(
                    session = %session,
                    event_id = %event.id(),
                    "discarding event from stale session"
                );
                metrics::counter!("notifier_events_dropped_total", "reason" => "stale_session")
                    .increment(1);
                return false;
            }
            state.pipeline.ingest(event, fresh)
        };

        metrics::counter!(
            "notifier_events_received_total",
            "fresh" => if fresh { "true" } else { "false" }
        )
        .increment(1);

        for item in ingested.appended {
            let _ = self.inner.notifications_tx.send(item);
        }
        if ingested.duplicate {
            return true;
        }
        if ingested.side_effect.is_some() {
            self.inner.dispatcher.dispatch(event, fresh);
        }
        true
    }

    /// Manual add for flows that are not event driven (local validation errors
    /// and the like). The key is a snowflake from the local keyspace.
    pub fn add(
        &self,
        title: impl Into<String>,
        message: Option<String>,
        level: EventLevel,
    ) -> Option<NotificationItem> {
        let draft = NotificationDraft::new(title, message);
        let item = {
            let mut state = self.lock();
            let mut minted = None;
            for _ in 0..LOCAL_KEY_ATTEMPTS {
                let sequence = self.inner.local_sequence.fetch_add(1, Ordering::Relaxed);
                let key = Snowflake::local(Utc::now(), sequence);
                if let Some(item) = state.pipeline.add(draft.clone(), key, level, true) {
                    minted = Some(item);
                    break;
                }
            }
            minted
        }?;
        let _ = self.inner.notifications_tx.send(item.clone());
        Some(item)
    }

    /// Empty the discrete list. Ongoing progressions are kept.
    pub fn clear(&self) {
        self.lock().pipeline.clear();
        info!("notifications cleared");
    }

    pub fn notifications(&self) -> Vec<NotificationItem> {
        self.lock().pipeline.notifications().to_vec()
    }

    pub fn ongoing(&self) -> Vec<OngoingNotificationItem> {
        self.lock().pipeline.ongoing()
    }

    /// Register a side effect for live events of `kind`.
    pub fn register<F, Fut>(&self, kind: EventKind, name: &str, effect: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.inner.dispatcher.register(kind, name, effect);
    }

    /// Subscribe to notifications appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationItem> {
        self.inner.notifications_tx.subscribe()
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        self.inner.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Status update on behalf of `session`. Ignored once the session is
    /// stale, so a torn-down source cannot overwrite `Idle` or a newer
    /// session's status. Returns `false` when ignored.
    pub fn set_status_for(&self, session: SessionId, status: ConnectionStatus) -> bool {
        let state = self.lock();
        if state.session != session {
            debug!(session = %session, %status, "ignoring status from stale session");
            return false;
        }
        self.set_status(status);
        drop(state);
        true
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }
}
