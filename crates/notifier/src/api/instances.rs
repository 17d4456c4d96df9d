use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::AppState;
use crate::registry::InstanceEntry;

pub async fn list_instances(State(state): State<Arc<AppState>>) -> Json<Vec<InstanceEntry>> {
    Json(state.registry.list())
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::tests::{body_json, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::types::{
        CausedBy, Event, EventInner, EventLevel, InstanceEvent, InstanceEventInner, InstanceState,
        Snowflake,
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_list_instances() {
        let state = test_state(None);
        state.registry.apply(&Event {
            snowflake: Snowflake::new(3),
            level: EventLevel::Info,
            event_inner: EventInner::InstanceEvent(InstanceEvent {
                instance_uuid: "inst-1".to_string(),
                instance_name: "Survival".to_string(),
                instance_event_inner: InstanceEventInner::StateTransition {
                    to: InstanceState::Running,
                },
            }),
            details: String::new(),
            caused_by: CausedBy::System,
        });

        let req = Request::builder()
            .uri("/api/instances")
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json[0]["uuid"], "inst-1");
        assert_eq!(json[0]["name"], "Survival");
        assert_eq!(json[0]["state"], "Running");
    }
}
