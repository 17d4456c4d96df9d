pub mod instances;
pub mod notifications;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::center::{ConnectionStatus, NotificationCenter};
use crate::registry::InstanceRegistry;

/// Shared application state available to all handlers.
pub struct AppState {
    pub center: NotificationCenter,
    pub registry: InstanceRegistry,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub api_key: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    // Health endpoint is always public (no auth)
    let public = Router::new().route("/api/health", get(health));

    let protected = Router::new()
        .route("/api/status", get(status))
        .route(
            "/api/notifications",
            get(notifications::list_notifications)
                .post(notifications::add_notification)
                .delete(notifications::clear_notifications),
        )
        .route("/api/ongoing", get(notifications::list_ongoing))
        .route("/api/instances", get(instances::list_instances))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bearer token auth middleware. Skipped when no api_key is configured.
async fn auth_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(api_key) = &state.api_key else {
        return next.run(req).await;
    };

    let token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    match token {
        Some(token) if constant_time_eq(token.as_bytes(), api_key.as_bytes()) => {
            next.run(req).await
        }
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn uptime_secs(state: &AppState) -> i64 {
    chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime_secs(&state),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    connection: ConnectionStatus,
    notifications: usize,
    ongoing: usize,
    instances: usize,
    uptime_secs: i64,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connection: state.center.status(),
        notifications: state.center.notifications().len(),
        ongoing: state.center.ongoing().len(),
        instances: state.registry.len(),
        uptime_secs: uptime_secs(&state),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    pub(crate) fn test_state(api_key: Option<&str>) -> Arc<AppState> {
        Arc::new(AppState {
            center: NotificationCenter::new(16),
            registry: InstanceRegistry::new(),
            started_at: chrono::Utc::now(),
            api_key: api_key.map(str::to_string),
        })
    }

    pub(crate) async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(test_state(None));
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn test_status_endpoint_idle() {
        let state = test_state(None);
        state.center.set_status(ConnectionStatus::Degraded);
        let app = router(state);
        let req = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["connection"], "degraded");
        assert_eq!(json["notifications"], 0);
        assert_eq!(json["ongoing"], 0);
        assert_eq!(json["instances"], 0);
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let app = router(test_state(Some("secret")));

        let req = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/api/status")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/api/status")
            .header("authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Health stays public.
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
