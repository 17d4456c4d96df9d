use crate::types::{Event, EventQuery};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by the Lodestone core event endpoints.
#[derive(Debug, Error)]
pub enum LodestoneError {
    #[error("request to lodestone core failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("lodestone core rejected the session token")]
    Unauthorized,
    #[error("lodestone core returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode event payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for the Lodestone core's event buffer and stream.
pub struct LodestoneClient {
    base_url: String,
    client: reqwest::Client,
}

impl LodestoneClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, LodestoneError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn backlog_url(&self, query: &EventQuery) -> Result<String, LodestoneError> {
        let filter = query.to_filter_param()?;
        Ok(format!(
            "{}/events/all/buffer?filter={}",
            self.base_url,
            urlencoding::encode(&filter)
        ))
    }

    /// WebSocket URL of the live stream, derived from the HTTP base URL.
    pub fn stream_url(&self, query: &EventQuery) -> Result<String, LodestoneError> {
        let filter = query.to_filter_param()?;
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        Ok(format!(
            "{ws_base}/events/all/stream?filter={}",
            urlencoding::encode(&filter)
        ))
    }

    /// Fetch the bounded backlog of past events, in the order the core returns them.
    ///
    /// Elements that fail to decode are dropped individually.
    pub async fn fetch_backlog(&self, query: &EventQuery) -> Result<Vec<Event>, LodestoneError> {
        let url = self.backlog_url(query)?;
        debug!(url = %url, "fetching event backlog");

        let mut request = self.client.get(&url);
        if let Some(token) = &query.bearer_token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LodestoneError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LodestoneError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Vec<serde_json::Value> = resp.json().await?;
        let total = raw.len();
        let events: Vec<Event> = raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Event>(value) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "dropping malformed backlog event");
                    metrics::counter!("notifier_events_dropped_total", "reason" => "malformed")
                        .increment(1);
                    None
                }
            })
            .collect();

        debug!(total, decoded = events.len(), "fetched event backlog");
        Ok(events)
    }
}

/// Decode a single live stream message.
pub fn decode_event(text: &str) -> Result<Event, LodestoneError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventLevel;

    fn client(base: &str) -> LodestoneClient {
        LodestoneClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_stream_url_switches_scheme() {
        let query = EventQuery::with_token("abc");
        let url = client("http://localhost:16662/api/v1/").stream_url(&query).unwrap();
        assert!(url.starts_with("ws://localhost:16662/api/v1/events/all/stream?filter="));

        let url = client("https://core.example.com").stream_url(&query).unwrap();
        assert!(url.starts_with("wss://core.example.com/events/all/stream?filter="));
    }

    #[test]
    fn test_backlog_url_percent_encodes_filter() {
        let query = EventQuery::with_token("abc").levels(vec![EventLevel::Error]);
        let url = client("http://localhost:16662").backlog_url(&query).unwrap();
        assert!(url.starts_with("http://localhost:16662/events/all/buffer?filter=%7B"));
        assert!(!url.contains('"'));
        assert!(url.contains("bearer_token"));
    }

    #[test]
    fn test_decode_event_rejects_garbage() {
        assert!(matches!(
            decode_event("not json"),
            Err(LodestoneError::Decode(_))
        ));
    }
}
