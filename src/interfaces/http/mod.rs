pub mod auth;
pub mod handlers;
pub mod response;

use crate::application::data_collector::DataCollector;
use crate::application::hybrid_provider::HybridHistoricalProvider;
use crate::application::position_monitor::PositionMonitor;
use crate::application::signal_generator::SignalGenerator;
use crate::application::subscription_registry::SubscriptionRegistry;
use crate::domain::repositories::{PositionRepository, SignalRepository};
use crate::infrastructure::observability::HeartbeatRegistry;
use auth::AuthState;
use axum::extract::FromRef;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handles wired into every handler, grounded in the same
/// dependency-construction shape as the scheduler's component graph.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthState>,
    pub commands: Arc<crate::interfaces::commands::Commands>,
    pub hhp: Arc<HybridHistoricalProvider>,
    pub signal_generator: Arc<SignalGenerator>,
    pub data_collector: Arc<DataCollector>,
    pub position_monitor: Arc<PositionMonitor>,
    pub registry: Arc<SubscriptionRegistry>,
    pub signals: Arc<dyn SignalRepository>,
    pub positions: Arc<dyn PositionRepository>,
    pub heartbeats: Arc<HeartbeatRegistry>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        AuthState {
            jwt_secret: state.auth.jwt_secret.clone(),
            api_key: state.auth.api_key.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .route("/trading/signal", get(handlers::trading::get_signal))
                .route("/trading/analyze", post(handlers::trading::analyze))
                .route("/market/realtime/:pair", get(handlers::market::realtime))
                .route("/market/history/:pair", get(handlers::market::history))
                .route("/market/data/bulk", post(handlers::market::bulk_ingest))
                .route("/positions/open", post(handlers::positions::open))
                .route("/positions/close", post(handlers::positions::close))
                .route("/positions/:id/adjust", put(handlers::positions::adjust))
                .route("/positions/:id", get(handlers::positions::get_one))
                .route("/positions/user/:id", get(handlers::positions::list_for_user))
                .route("/subscriptions", post(handlers::subscriptions::create))
                .route("/subscriptions/:id", delete(handlers::subscriptions::remove))
                .route("/subscriptions/user/:id", get(handlers::subscriptions::list_for_user)),
        )
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Agent liveness endpoint: 200 with each heartbeat's age when every tracked
/// agent has beaten within its window, 503 otherwise.
const HEALTH_MAX_AGE_SECS: i64 = 180;
const TRACKED_AGENTS: &[&str] = &["signal_tick", "position_tick", "data_collector"];

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    let agents = state.heartbeats.snapshot();
    let healthy = state.heartbeats.is_healthy(TRACKED_AGENTS, HEALTH_MAX_AGE_SECS);
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, axum::Json(serde_json::json!({ "healthy": healthy, "agents": agents }))).into_response()
}
