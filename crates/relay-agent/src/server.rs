//! HTTP surface: health check, metrics exposition, alert webhook.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus::{Registry, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::alert::{AlertClient, GrafanaAlertData};

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub exposition: Registry,
    pub alert: Option<AlertClient>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/metrics", get(metrics))
        .route("/alert", post(alert_webhook))
        .with_state(state)
}

async fn ping() -> impl IntoResponse {
    Json(json!({"message": "pong"}))
}

/// Text exposition of every registered series.
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&state.exposition.gather()) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "failed to encode metrics"})),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct AlertParams {
    #[serde(default)]
    chat_bot_id: String,
}

async fn alert_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertParams>,
    body: String,
) -> impl IntoResponse {
    if params.chat_bot_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "chat_bot_id is required"})),
        );
    }

    let Some(alert) = &state.alert else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "alert notifier is not configured"})),
        );
    };

    let data: GrafanaAlertData = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, "alert webhook body rejected");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "failed to unmarshal request body"})),
            );
        }
    };

    if let Err(e) = alert.notify(&params.chat_bot_id, &data).await {
        error!(error = %e, "alert forwarding failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "failed to send alert"})),
        );
    }

    (StatusCode::OK, Json(json!({"message": "success"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            exposition: Registry::new(),
            alert: None,
        })
    }

    #[tokio::test]
    async fn ping_pongs() {
        let response = create_router(test_state())
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_serves_registered_series() {
        let state = test_state();
        let counter =
            prometheus::IntCounter::new("relay_test_total", "test counter").unwrap();
        state.exposition.register(Box::new(counter.clone())).unwrap();
        counter.inc();

        let response = create_router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("relay_test_total 1"));
    }

    #[tokio::test]
    async fn alert_requires_chat_bot_id() {
        let response = create_router(test_state())
            .oneshot(
                Request::post("/alert")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
