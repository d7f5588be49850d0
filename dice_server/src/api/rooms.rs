//! Room control handlers.
//!
//! Start a round and place a bet:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/rooms/-1001/start
//! curl -X POST http://localhost:6969/api/v1/rooms/-1001/bets \
//!   -H "Content-Type: application/json" \
//!   -d '{"participant": 7, "display_name": "alice", "class": "banker", "amount": 100}'
//! ```

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dice_baccarat::{
    RoomId, RoomStatus, RoundId,
    game::{ParticipantId, Points},
    room::BetReceipt,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};

/// Longest display name echoed into chat narration
pub const MAX_DISPLAY_NAME: usize = 64;

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub participant: ParticipantId,
    pub display_name: String,
    /// `banker`, `player` or `tie`
    pub class: String,
    pub amount: Points,
}

#[derive(Debug, Deserialize)]
pub struct AutoRepeatRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct StartGameResponse {
    pub round_id: RoundId,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Whether a round was running
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct AutoRepeatResponse {
    pub auto_repeat: bool,
    /// Round opened because the room was idle
    pub started: Option<RoundId>,
}

/// Current phase, bets and timers of a room.
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomStatus>, ApiError> {
    Ok(Json(state.manager.get_status(room_id).await?))
}

/// Open a betting window.
///
/// # Errors
///
/// - `409 Conflict`: a round is already betting or dealing
pub async fn start_game(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<(StatusCode, Json<StartGameResponse>), ApiError> {
    let round_id = state.manager.start_game(room_id).await?;
    Ok((StatusCode::CREATED, Json(StartGameResponse { round_id })))
}

/// Stake points on a bet class.
///
/// # Errors
///
/// - `400 Bad Request`: unknown class, non-positive amount, ceiling exceeded
/// - `409 Conflict`: no round, or betting already closed
pub async fn place_bet(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<PlaceBetRequest>,
) -> Result<Json<BetReceipt>, ApiError> {
    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::BadRequest(
            "display_name must not be empty".to_string(),
        ));
    }
    let display_name: String = display_name.chars().take(MAX_DISPLAY_NAME).collect();

    let receipt = state
        .manager
        .place_bet(
            room_id,
            request.participant,
            display_name,
            request.class,
            request.amount,
        )
        .await?;

    Ok(Json(receipt))
}

/// Close betting ahead of the deadline and start the deal.
///
/// Returns `202 Accepted`; the result is announced in the room.
pub async fn close_betting(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, ApiError> {
    state.manager.close_betting(room_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Discard the room's round without settling it.
pub async fn force_stop(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<StopResponse>, ApiError> {
    let stopped = state.manager.force_stop(room_id).await?;
    Ok(Json(StopResponse { stopped }))
}

/// Turn automatic round chaining on or off.
pub async fn set_auto_repeat(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(request): Json<AutoRepeatRequest>,
) -> Result<Json<AutoRepeatResponse>, ApiError> {
    let started = if request.enabled {
        state.manager.enable_auto_repeat(room_id).await?
    } else {
        state.manager.disable_auto_repeat(room_id).await?;
        None
    };

    Ok(Json(AutoRepeatResponse {
        auto_repeat: request.enabled,
        started,
    }))
}
