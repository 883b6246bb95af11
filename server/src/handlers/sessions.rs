use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    models::{
        rating::RatingValues, CreateSessionRequest, SessionView, SetPlayerNameRequest,
        SubmitGuessRequest,
    },
    services::{round_engine::RoundEngine, AppState},
};

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Validation error: {}", e)))?;

    let player_name = req
        .player_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    tracing::info!(
        "Creating session for player {}",
        player_name.as_deref().unwrap_or("anonymous")
    );

    let session = state.sessions.create(player_name).await;
    let engine = RoundEngine::new(
        state.puzzles.clone(),
        state.ratings.clone(),
        state.config.game.clone(),
    );

    let mut guard = session.lock().await;
    engine.start_round(&mut guard).await;
    Ok((StatusCode::CREATED, Json(SessionView::render(&mut guard))))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    let mut guard = session.lock().await;
    Ok((StatusCode::OK, Json(SessionView::render(&mut guard))))
}

pub async fn set_player_name(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<SetPlayerNameRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Validation error: {}", e)))?;

    let name = req.player_name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Player name must not be blank".to_string(),
        ));
    }

    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    tracing::info!("Session {} is now played by {}", session_id, name);

    let mut guard = session.lock().await;
    guard.player_name = Some(name.to_string());
    Ok((StatusCode::OK, Json(SessionView::render(&mut guard))))
}

pub async fn submit_guess(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitGuessRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Guess submitted for session {}", session_id);

    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    let engine = RoundEngine::new(
        state.puzzles.clone(),
        state.ratings.clone(),
        state.config.game.clone(),
    );

    let mut guard = session.lock().await;
    engine.submit_guess(&mut guard, &req.guess).await;
    Ok((StatusCode::OK, Json(SessionView::render(&mut guard))))
}

pub async fn reveal_hints(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Hints requested for session {}", session_id);

    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    let engine = RoundEngine::new(
        state.puzzles.clone(),
        state.ratings.clone(),
        state.config.game.clone(),
    );

    let mut guard = session.lock().await;
    engine.reveal_hints(&mut guard);
    Ok((StatusCode::OK, Json(SessionView::render(&mut guard))))
}

pub async fn skip_puzzle(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Skip requested for session {}", session_id);

    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    let engine = RoundEngine::new(
        state.puzzles.clone(),
        state.ratings.clone(),
        state.config.game.clone(),
    );

    let mut guard = session.lock().await;
    engine.skip_puzzle(&mut guard).await;
    Ok((StatusCode::OK, Json(SessionView::render(&mut guard))))
}

pub async fn submit_rating(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(values): Json<RatingValues>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Rating submitted for session {}", session_id);

    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    let engine = RoundEngine::new(
        state.puzzles.clone(),
        state.ratings.clone(),
        state.config.game.clone(),
    );

    let mut guard = session.lock().await;
    engine.submit_rating(&mut guard, values).await;
    Ok((StatusCode::OK, Json(SessionView::render(&mut guard))))
}

/// Reloads a puzzle on demand. The client uses this when a round ended up
/// without one or the player wants to re-roll the current round.
pub async fn retry_puzzle(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Puzzle retry requested for session {}", session_id);

    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    let engine = RoundEngine::new(
        state.puzzles.clone(),
        state.ratings.clone(),
        state.config.game.clone(),
    );

    let mut guard = session.lock().await;
    engine.start_round(&mut guard).await;
    Ok((StatusCode::OK, Json(SessionView::render(&mut guard))))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Ending session {}", session_id);

    if state.sessions.remove(&session_id).await {
        Ok((StatusCode::NO_CONTENT, ()))
    } else {
        Err((StatusCode::NOT_FOUND, "Session not found".to_string()))
    }
}
