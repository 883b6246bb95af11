use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::GameSettings;
use crate::metrics::{GUESSES_TOTAL, HINTS_REVEALED_TOTAL};
use crate::models::rating::{RatingSubmission, RatingValues};
use crate::models::{
    FeedbackKind, FinishedRound, RoundOutcome, RoundPhase, RoundRecord, SessionState,
};
use crate::services::puzzle_store::PuzzleStore;
use crate::services::rating_service::RatingAggregator;

const BASE_SCORE: i64 = 100;
const SPEED_BONUS_MAX: f64 = 50.0;
const SOLVE_WINDOW_SECONDS: f64 = 120.0;
const HINT_PENALTY: i64 = 30;
const MIN_SCORE: i64 = 10;

/// Points for a solved round: base plus a speed bonus that decays linearly
/// over the first two minutes, minus a flat penalty if hints were shown.
/// Clamped below so a solve always pays something.
pub fn calculate_score(elapsed_seconds: f64, hints_used: bool) -> i64 {
    let time_factor = (1.0 - elapsed_seconds / SOLVE_WINDOW_SECONDS).clamp(0.0, 1.0);
    let speed_bonus = (SPEED_BONUS_MAX * time_factor).round() as i64;
    let hint_penalty = if hints_used { HINT_PENALTY } else { 0 };
    (BASE_SCORE + speed_bonus - hint_penalty).max(MIN_SCORE)
}

/// Drives a session through its round lifecycle: awaiting a guess, showing
/// the rating step, and loading the next puzzle. All player-visible outcomes
/// are communicated through session feedback; storage trouble shows up in
/// logs, never as an error to the player.
pub struct RoundEngine {
    puzzles: Arc<PuzzleStore>,
    ratings: Arc<RatingAggregator>,
    settings: GameSettings,
}

impl RoundEngine {
    pub fn new(
        puzzles: Arc<PuzzleStore>,
        ratings: Arc<RatingAggregator>,
        settings: GameSettings,
    ) -> Self {
        Self {
            puzzles,
            ratings,
            settings,
        }
    }

    /// Loads a puzzle into the session. Used for the first round and for
    /// explicit retries; from any phase it rolls the session forward onto a
    /// fresh round.
    pub async fn start_round(&self, state: &mut SessionState) {
        self.advance(state).await;
    }

    pub async fn submit_guess(&self, state: &mut SessionState, raw_guess: &str) {
        if state.phase == RoundPhase::ShowingRating {
            state.set_feedback(
                FeedbackKind::Error,
                "Please rate the last puzzle before continuing!",
            );
            return;
        }
        let Some(puzzle_id) = state.current_puzzle.as_ref().map(|p| p.id.clone()) else {
            state.set_feedback(
                FeedbackKind::Error,
                "No puzzle is loaded. Try loading a new one!",
            );
            return;
        };

        let guess = raw_guess.trim();
        if guess.is_empty() {
            state.set_feedback(FeedbackKind::Error, "Please enter a guess!");
            return;
        }

        if !self.puzzles.validate_answer(&puzzle_id, guess).await {
            GUESSES_TOTAL.with_label_values(&["false"]).inc();
            debug!(
                "Incorrect guess for puzzle {} in session {}",
                puzzle_id, state.id
            );
            state.set_feedback(
                FeedbackKind::Error,
                format!("'{}' is not correct. Try again!", guess),
            );
            return;
        }

        GUESSES_TOTAL.with_label_values(&["true"]).inc();
        let now = Utc::now();
        let elapsed = state.round_elapsed_seconds(now);
        let delta = calculate_score(elapsed, state.show_hints);

        state.score += delta;
        state.puzzles_solved += 1;
        state.history.push(RoundRecord {
            puzzle_id: puzzle_id.clone(),
            outcome: RoundOutcome::Solved,
            elapsed_seconds: elapsed,
            score_delta: Some(delta),
            hints_used: state.show_hints,
            rating: None,
            recorded_at: now,
        });
        state.last_finished = Some(FinishedRound {
            puzzle_id: puzzle_id.clone(),
            target_word: guess.to_string(),
            elapsed_seconds: elapsed,
            hints_used: state.show_hints,
            was_skipped: false,
        });
        state.phase = RoundPhase::ShowingRating;

        info!(
            "Session {} solved puzzle {} in {:.1}s (+{} points)",
            state.id, puzzle_id, elapsed, delta
        );
        state.set_feedback(
            FeedbackKind::Success,
            format!("Correct! The word was '{}'. +{} points", guess, delta),
        );
    }

    /// Marks the hints as revealed for this round. Repeat reveals within a
    /// round keep the flag set (the penalty applies once) while the session
    /// counter keeps counting.
    pub fn reveal_hints(&self, state: &mut SessionState) {
        if state.phase != RoundPhase::AwaitingGuess || state.current_puzzle.is_none() {
            debug!(
                "Ignoring hint request outside an active round for session {}",
                state.id
            );
            return;
        }
        state.show_hints = true;
        state.hints_used += 1;
        HINTS_REVEALED_TOTAL.inc();
    }

    /// Gives up on the current puzzle, revealing its solution. Depending on
    /// configuration the player then rates the skipped puzzle or goes
    /// straight to the next one.
    pub async fn skip_puzzle(&self, state: &mut SessionState) {
        if state.phase == RoundPhase::ShowingRating {
            state.set_feedback(
                FeedbackKind::Error,
                "Please rate the last puzzle before continuing!",
            );
            return;
        }
        let Some(puzzle_id) = state.current_puzzle.as_ref().map(|p| p.id.clone()) else {
            state.set_feedback(
                FeedbackKind::Error,
                "No puzzle is loaded. Try loading a new one!",
            );
            return;
        };

        let solution = self.puzzles.solution(&puzzle_id).await;
        let now = Utc::now();
        let elapsed = state.round_elapsed_seconds(now);

        state.puzzles_skipped += 1;
        state.history.push(RoundRecord {
            puzzle_id: puzzle_id.clone(),
            outcome: RoundOutcome::Skipped,
            elapsed_seconds: elapsed,
            score_delta: None,
            hints_used: state.show_hints,
            rating: None,
            recorded_at: now,
        });
        state.last_finished = Some(FinishedRound {
            puzzle_id: puzzle_id.clone(),
            target_word: solution.clone(),
            elapsed_seconds: elapsed,
            hints_used: state.show_hints,
            was_skipped: true,
        });

        info!(
            "Session {} skipped puzzle {} after {:.1}s",
            state.id, puzzle_id, elapsed
        );
        state.set_feedback(
            FeedbackKind::Info,
            format!("The word was '{}'. Better luck next time!", solution),
        );

        if self.settings.rate_on_skip {
            state.phase = RoundPhase::ShowingRating;
        } else {
            self.advance(state).await;
        }
    }

    /// Accepts the player's rating for the round summarized in
    /// `last_finished`, persists it, pins it to the matching history entry,
    /// and moves on to the next puzzle.
    pub async fn submit_rating(&self, state: &mut SessionState, values: RatingValues) {
        if state.phase != RoundPhase::ShowingRating {
            state.set_feedback(FeedbackKind::Error, "There is no finished puzzle to rate!");
            return;
        }
        let Some(finished) = state.last_finished.clone() else {
            state.set_feedback(FeedbackKind::Error, "There is no finished puzzle to rate!");
            return;
        };
        if !values.matches_scheme(self.ratings.scheme()) {
            state.set_feedback(
                FeedbackKind::Error,
                "Please select both difficulty and fun ratings!",
            );
            return;
        }

        let submission = RatingSubmission {
            puzzle_id: finished.puzzle_id.clone(),
            target_word: finished.target_word.clone(),
            session_id: state.id.clone(),
            player_name: state.player_name.clone(),
            values,
            time_to_solve: finished.elapsed_seconds,
            hints_used: finished.hints_used,
            was_skipped: finished.was_skipped,
        };
        let persisted = self.ratings.record_rating(submission).await;
        if !persisted {
            debug!(
                "Rating for puzzle {} went to the local fallback",
                finished.puzzle_id
            );
        }

        // Pin the rating to the round it belongs to; each record takes at
        // most one.
        if let Some(record) = state
            .history
            .iter_mut()
            .rev()
            .find(|r| r.puzzle_id == finished.puzzle_id && r.rating.is_none())
        {
            record.rating = Some(values);
        }

        state.set_feedback(FeedbackKind::Success, "Thank you for your ratings!");
        self.advance(state).await;
    }

    async fn advance(&self, state: &mut SessionState) {
        let puzzle = self.puzzles.random_puzzle().await;
        let ratings = self.puzzles.aggregate_ratings(&puzzle.id).await;
        debug!("Loaded puzzle {} for session {}", puzzle.id, state.id);
        state.install_puzzle(puzzle, ratings, Utc::now());
    }
}
