//! Event source: backlog replay followed by the live WebSocket subscription.
//!
//! One session per credential. `start` fetches the buffered backlog
//! (`fresh = false`), feeds it in returned order, then subscribes to the live
//! stream (`fresh = true`). A dropped connection is retried after a fixed delay
//! with no resync across the gap. `stop` cancels the task and ends the session
//! synchronously.

use crate::center::{ConnectionStatus, NotificationCenter, SessionId};
use common::lodestone::{decode_event, LodestoneClient, LodestoneError};
use common::types::EventQuery;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub reconnect_delay: Duration,
    /// Filter applied to both the backlog and the stream; the token is filled in per session.
    pub filter: EventQuery,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            filter: EventQuery::default(),
        }
    }
}

struct ActiveStream {
    token: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the subscription lifecycle for one credential at a time.
pub struct EventSource {
    client: Arc<LodestoneClient>,
    center: NotificationCenter,
    settings: StreamSettings,
    active: Option<ActiveStream>,
}

impl EventSource {
    pub fn new(
        client: Arc<LodestoneClient>,
        center: NotificationCenter,
        settings: StreamSettings,
    ) -> Self {
        Self {
            client,
            center,
            settings,
            active: None,
        }
    }

    /// Begin a session for `token`, replacing any running one.
    pub fn start(&mut self, token: String) {
        self.stop();

        let session = self.center.begin_session();
        let cancel = CancellationToken::new();
        let query = EventQuery {
            bearer_token: Some(token.clone()),
            ..self.settings.filter.clone()
        };

        let handle = tokio::spawn(run_stream(
            Arc::clone(&self.client),
            self.center.clone(),
            query,
            self.settings.reconnect_delay,
            session,
            cancel.clone(),
        ));

        self.active = Some(ActiveStream {
            token,
            cancel,
            handle,
        });
    }

    /// Tear down the subscription and clear all downstream state. Once this
    /// returns, no further event reaches the reducers.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            self.center.end_session();
        }
    }

    /// React to a credential change: `None` stops, a new token restarts, the
    /// current token is a no-op.
    pub fn set_token(&mut self, token: Option<String>) {
        match token {
            None => self.stop(),
            Some(token) if self.active.as_ref().is_some_and(|a| a.token == token) => {
                debug!("session token unchanged");
            }
            Some(token) => self.start(token),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Stop and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            self.center.end_session();
            if let Err(e) = active.handle.await {
                warn!(error = %e, "event stream task did not shut down cleanly");
            }
        }
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

/// How a single live connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    SessionEnded,
    ConnectFailed,
    Dropped,
}

async fn run_stream(
    client: Arc<LodestoneClient>,
    center: NotificationCenter,
    query: EventQuery,
    reconnect_delay: Duration,
    session: SessionId,
    cancel: CancellationToken,
) {
    info!(session = %session, base_url = client.base_url(), "event source started");
    if cancel.is_cancelled() || !center.set_status_for(session, ConnectionStatus::Connecting) {
        return;
    }

    let backlog = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = client.fetch_backlog(&query) => result,
    };
    match backlog {
        Ok(events) => {
            let count = events.len();
            for event in &events {
                if !center.ingest(session, event, false) {
                    debug!(session = %session, "session ended during backlog replay");
                    return;
                }
            }
            info!(session = %session, count, "replayed event backlog");
        }
        Err(LodestoneError::Unauthorized) => {
            warn!(session = %session, "backlog fetch rejected the session token");
            center.set_status_for(session, ConnectionStatus::Error);
        }
        Err(e) => {
            warn!(session = %session, error = %e, "failed to fetch event backlog");
            center.set_status_for(session, ConnectionStatus::Error);
        }
    }

    let url = match client.stream_url(&query) {
        Ok(url) => url,
        Err(e) => {
            error!(session = %session, error = %e, "failed to build stream URL");
            center.set_status_for(session, ConnectionStatus::Error);
            return;
        }
    };

    loop {
        let end = stream_once(&url, &center, session, &cancel).await;
        if cancel.is_cancelled() {
            break;
        }
        let status = match end {
            StreamEnd::Cancelled | StreamEnd::SessionEnded => break,
            StreamEnd::ConnectFailed => ConnectionStatus::Error,
            StreamEnd::Dropped => ConnectionStatus::Degraded,
        };
        if !center.set_status_for(session, status) {
            break;
        }

        metrics::counter!("notifier_reconnects_total").increment(1);
        debug!(
            session = %session,
            delay_ms = reconnect_delay.as_millis() as u64,
            "reconnecting event stream"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    info!(session = %session, "event source stopped");
}

async fn stream_once(
    url: &str,
    center: &NotificationCenter,
    session: SessionId,
    cancel: &CancellationToken,
) -> StreamEnd {
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => return StreamEnd::Cancelled,
        result = tokio_tungstenite::connect_async(url) => result,
    };
    let (mut ws_stream, _response) = match connected {
        Ok(conn) => conn,
        Err(e) => {
            warn!(session = %session, error = %e, "failed to connect to event stream");
            return StreamEnd::ConnectFailed;
        }
    };

    center.set_status_for(session, ConnectionStatus::Connected);
    info!(session = %session, "subscribed to live events");

    let end = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break StreamEnd::Cancelled,
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_event(&text) {
                    Ok(event) => {
                        if !center.ingest(session, &event, true) {
                            break StreamEnd::SessionEnded;
                        }
                    }
                    Err(e) => {
                        warn!(session = %session, error = %e, "dropping malformed live event");
                        metrics::counter!("notifier_events_dropped_total", "reason" => "malformed")
                            .increment(1);
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    warn!(session = %session, "event stream closed by server");
                    break StreamEnd::Dropped;
                }
                Some(Err(e)) => {
                    warn!(session = %session, error = %e, "event stream error");
                    break StreamEnd::Dropped;
                }
                Some(Ok(_)) => {}
            },
        }
    };

    if end != StreamEnd::Dropped {
        let _ = ws_stream.close(None).await;
    }
    end
}
