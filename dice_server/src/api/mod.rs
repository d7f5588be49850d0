//! HTTP control surface for dice baccarat rooms.
//!
//! Every route maps onto one [`RoomManager`] operation. Room ids are the chat
//! ids of the rooms, so they are usually negative for group chats.
//!
//! # Endpoints
//!
//! ```text
//! GET  /health
//! GET  /api/v1/rooms/{room_id}
//! POST /api/v1/rooms/{room_id}/start
//! POST /api/v1/rooms/{room_id}/bets          {participant, display_name, class, amount}
//! POST /api/v1/rooms/{room_id}/close
//! POST /api/v1/rooms/{room_id}/stop
//! POST /api/v1/rooms/{room_id}/auto-repeat   {enabled}
//! ```
//!
//! Failures carry a JSON body `{"error": "...", "kind": "..."}` where `kind`
//! is `validation` (400), `state_conflict` (409) or `internal` (500).
//!
//! # CORS
//!
//! CORS is configured permissively. Put the server behind a proxy that
//! restricts origins before exposing it.

pub mod request_id;
pub mod rooms;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use dice_baccarat::{ErrorKind, GameError, RoomManager, db::Database};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RoomManager>,
    /// Present when rounds are persisted in PostgreSQL
    pub database: Option<Arc<Database>>,
}

/// Errors returned by handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Game(#[from] GameError),

    /// Request is well-formed JSON but unusable
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Game(err) => err.kind(),
            Self::BadRequest(_) => ErrorKind::Validation,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(body)).into_response()
    }
}

/// Create the API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use dice_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let rooms = Router::new()
        .route("/rooms/{room_id}", get(rooms::get_room))
        .route("/rooms/{room_id}/start", post(rooms::start_game))
        .route("/rooms/{room_id}/bets", post(rooms::place_bet))
        .route("/rooms/{room_id}/close", post(rooms::close_betting))
        .route("/rooms/{room_id}/stop", post(rooms::force_stop))
        .route("/rooms/{room_id}/auto-repeat", post(rooms::set_auto_repeat));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", rooms)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database (if any) answers, `503` otherwise.
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","database":"ok","active_rooms":2,"timestamp":"2026-10-19T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.database {
        Some(db) => match db.health_check().await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                "unreachable"
            }
        },
        None => "in_memory",
    };
    let healthy = database != "unreachable";

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "active_rooms": state.manager.active_room_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_follows_kind() {
        assert_eq!(
            ApiError::from(GameError::InvalidAmount(0)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(GameError::BettingClosed).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(GameError::RoomUnavailable).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("empty name".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
