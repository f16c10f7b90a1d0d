use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{FromRequestParts, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

mod auth;
mod badges;
mod chains;
mod faucet;
mod ws;

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    // Configure CORS for web wallet access
    let cors = CorsLayer::new()
        // Allow requests from any origin (for development)
        // In production, restrict to specific domains
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let auth_router = auth::router().with_state(state.clone());
    let chains_router = chains::router().with_state(state.clone());
    let faucet_router = faucet::router().with_state(state.clone());
    let badges_router = badges::router().with_state(state.clone());
    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/ws", get(ws::websocket))
        .nest("/auth", auth_router)
        .nest("/chains", chains_router)
        .nest("/faucet", faucet_router)
        .nest("/badges", badges_router)
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    assert!(
        uptime <= 31_536_000,
        "Uptime exceeds one year without restart"
    );
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let supported_chains = state.chains.supported_chains().len();
    assert!(supported_chains > 0, "Chain registry emptied at runtime");

    let response = ReadyResponse {
        status: "ready",
        supported_chains,
        cache_entries: CacheSummary {
            chain_statistics: state.cache.chain_statistics.entry_count(),
            contributions: state.cache.contributions.entry_count(),
            leaderboards: state.cache.leaderboards.entry_count(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    supported_chains: usize,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    chain_statistics: u64,
    contributions: u64,
    leaderboards: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self { status, message }
    }

    /// Deliberately uniform: callers cannot distinguish a bad signature from
    /// a malformed or replayed challenge.
    pub fn authentication_failed() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Authentication failed".to_string(),
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Bearer-token guard for mutating faucet endpoints.
pub struct AuthUser {
    pub user_id: i64,
    pub address: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let token = header.strip_prefix("Bearer ").unwrap_or_default();
        if token.is_empty() {
            return Err(HttpError::authentication_failed());
        }
        let claims = state
            .auth
            .verify(token)
            .map_err(|_| HttpError::authentication_failed())?;
        Ok(Self {
            user_id: claims.sub,
            address: claims.address,
        })
    }
}
