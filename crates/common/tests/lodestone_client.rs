use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use common::lodestone::{LodestoneClient, LodestoneError};
use common::types::{EventKind, EventQuery};
use std::collections::HashMap;
use std::time::Duration;

async fn buffer(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer good-token");
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }
    // The filter must arrive as decodable JSON.
    let filter = params.get("filter").ok_or(StatusCode::BAD_REQUEST)?;
    let parsed: EventQuery = serde_json::from_str(filter).map_err(|_| StatusCode::BAD_REQUEST)?;
    assert_eq!(parsed.bearer_token.as_deref(), Some("good-token"));

    Ok(Json(serde_json::json!([
        {
            "snowflake": "100",
            "event_inner": {"type": "UserEvent", "user_id": "u1", "user_event_inner": {"type": "UserCreated"}}
        },
        {"snowflake": "this is not an event"},
        {
            "snowflake": "101",
            "level": "Warning",
            "event_inner": {
                "type": "InstanceEvent",
                "instance_uuid": "i1",
                "instance_name": "Survival",
                "instance_event_inner": {"type": "InstanceWarning", "message": "low memory"}
            }
        }
    ])))
}

async fn spawn_core() -> String {
    let app = Router::new().route("/events/all/buffer", get(buffer));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fetch_backlog_keeps_order_and_skips_malformed_entries() {
    let base = spawn_core().await;
    let client = LodestoneClient::new(&base, Duration::from_secs(5)).unwrap();

    let events = client
        .fetch_backlog(&EventQuery::with_token("good-token"))
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id().as_u64(), 100);
    assert_eq!(events[0].kind(), EventKind::UserCreated);
    assert_eq!(events[1].id().as_u64(), 101);
    assert_eq!(events[1].kind(), EventKind::InstanceWarning);
}

#[tokio::test]
async fn fetch_backlog_maps_401_to_unauthorized() {
    let base = spawn_core().await;
    let client = LodestoneClient::new(&base, Duration::from_secs(5)).unwrap();

    let result = client
        .fetch_backlog(&EventQuery::with_token("stale-token"))
        .await;

    assert!(matches!(result, Err(LodestoneError::Unauthorized)));
}

#[tokio::test]
async fn fetch_backlog_reports_other_statuses() {
    let base = spawn_core().await;
    let client = LodestoneClient::new(&format!("{base}/missing"), Duration::from_secs(5)).unwrap();

    let result = client
        .fetch_backlog(&EventQuery::with_token("good-token"))
        .await;

    match result {
        Err(LodestoneError::Status { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected Status error, got {other:?}"),
    }
}
