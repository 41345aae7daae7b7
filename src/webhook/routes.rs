//! Webhook HTTP routes
//!
//! ## Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/` | GET | Uptime text |
//! | `/chat` | POST | Fulfillment webhook |

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use super::{WebhookRequest, WebhookResponse, WebhookService};

/// Shared state for the webhook routes
#[derive(Clone)]
pub struct AppState {
    pub webhook: Arc<WebhookService>,
    pub started: Instant,
}

impl AppState {
    pub fn new(webhook: Arc<WebhookService>) -> Self {
        Self {
            webhook,
            started: Instant::now(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(uptime))
        .route("/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn uptime(State(state): State<AppState>) -> String {
    format!(
        "This server has been up for {} seconds!",
        state.started.elapsed().as_secs_f64()
    )
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> Json<WebhookResponse> {
    Json(state.webhook.fulfill(request).await)
}
