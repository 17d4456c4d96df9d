use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::types::EventLevel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::AppState;
use crate::notifications::{NotificationItem, OngoingNotificationItem};

#[derive(Deserialize)]
pub struct AddNotificationRequest {
    pub title: String,
    pub message: Option<String>,
    pub level: Option<EventLevel>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list_notifications(State(state): State<Arc<AppState>>) -> Json<Vec<NotificationItem>> {
    Json(state.center.notifications())
}

pub async fn add_notification(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddNotificationRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<MessageResponse>)> {
    if req.title.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "title must not be empty".to_string(),
            }),
        ));
    }

    let level = req.level.unwrap_or_default();
    match state.center.add(req.title, req.message, level) {
        Some(item) => Ok((StatusCode::CREATED, Json(item))),
        None => Err((
            StatusCode::CONFLICT,
            Json(MessageResponse {
                message: "notification key already present".to_string(),
            }),
        )),
    }
}

pub async fn clear_notifications(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.center.clear();
    Json(MessageResponse {
        message: "notifications cleared".to_string(),
    })
}

pub async fn list_ongoing(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<OngoingNotificationItem>> {
    Json(state.center.ongoing())
}
