use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::rating::{AggregateRating, RatingValues};

pub mod rating;

/// The four image slots every puzzle has, in display order.
pub const PUZZLE_SLOTS: [&str; 4] = ["1", "2", "3", "4"];

/// A fully resolved puzzle: stable id plus per-slot image URLs and
/// descriptions. URLs may be empty strings when an image could not be
/// resolved; the descriptions then carry the clue on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Puzzle {
    pub id: String,
    pub image_urls: BTreeMap<String, String>,
    pub descriptions: BTreeMap<String, String>,
}

/// Raw puzzle document as stored under `puzzles/{id}.json`. Image values are
/// object names inside the bucket, not URLs.
#[derive(Debug, Clone, Deserialize)]
pub struct PuzzleDocument {
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

/// Solution document stored under `solutions_by_id/{id}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionDocument {
    pub target_word: String,
}

/// Bundled fallback puzzle file. Unlike remote documents, its image values
/// are complete URLs (or empty strings) since no bucket is reachable when
/// this tier is used.
#[derive(Debug, Clone, Deserialize)]
pub struct ExamplePuzzleFile {
    #[serde(default)]
    pub id: Option<String>,
    pub target_word: String,
    #[serde(default)]
    pub image_urls: BTreeMap<String, String>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    AwaitingGuess,
    ShowingRating,
    NoPuzzleAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Solved,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Success,
    Info,
    Error,
}

/// One-shot message for the player. Rendered at most once: the next view of
/// the session clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub message: String,
}

/// Append-only entry in a session's play history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub puzzle_id: String,
    pub outcome: RoundOutcome,
    pub elapsed_seconds: f64,
    pub score_delta: Option<i64>,
    pub hints_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingValues>,
    pub recorded_at: DateTime<Utc>,
}

/// Summary of the most recently finished round, kept around so the rating
/// step knows what it is rating even after the next puzzle loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedRound {
    pub puzzle_id: String,
    pub target_word: String,
    pub elapsed_seconds: f64,
    pub hints_used: bool,
    pub was_skipped: bool,
}

/// All mutable state for one player's session. Owned exclusively by the
/// session registry; handlers mutate it under the per-session lock.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub id: String,
    pub player_name: Option<String>,
    pub phase: RoundPhase,
    pub current_puzzle: Option<Puzzle>,
    pub current_ratings: Option<AggregateRating>,
    pub score: i64,
    pub puzzles_solved: u32,
    pub puzzles_skipped: u32,
    pub hints_used: u32,
    pub show_hints: bool,
    pub history: Vec<RoundRecord>,
    pub last_finished: Option<FinishedRound>,
    pub started_at: DateTime<Utc>,
    pub round_started_at: DateTime<Utc>,
    #[serde(skip)]
    feedback: Option<Feedback>,
}

impl SessionState {
    pub fn new(id: String, player_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            player_name,
            phase: RoundPhase::NoPuzzleAvailable,
            current_puzzle: None,
            current_ratings: None,
            score: 0,
            puzzles_solved: 0,
            puzzles_skipped: 0,
            hints_used: 0,
            show_hints: false,
            history: Vec::new(),
            last_finished: None,
            started_at: now,
            round_started_at: now,
            feedback: None,
        }
    }

    /// Installs a freshly loaded puzzle and resets all per-round state.
    pub fn install_puzzle(
        &mut self,
        puzzle: Puzzle,
        ratings: Option<AggregateRating>,
        now: DateTime<Utc>,
    ) {
        self.current_puzzle = Some(puzzle);
        self.current_ratings = ratings;
        self.phase = RoundPhase::AwaitingGuess;
        self.show_hints = false;
        self.round_started_at = now;
    }

    pub fn round_elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.round_started_at).num_milliseconds() as f64 / 1000.0;
        elapsed.max(0.0)
    }

    pub fn set_feedback(&mut self, kind: FeedbackKind, message: impl Into<String>) {
        self.feedback = Some(Feedback {
            kind,
            message: message.into(),
        });
    }

    /// Takes the pending feedback, leaving nothing behind. Display-once
    /// semantics live here.
    pub fn take_feedback(&mut self) -> Option<Feedback> {
        self.feedback.take()
    }

    #[cfg(test)]
    pub fn peek_feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), None)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(max = 64, message = "Player name is too long"))]
    pub player_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPlayerNameRequest {
    #[validate(length(min = 1, max = 64, message = "Player name must be 1-64 characters"))]
    pub player_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitGuessRequest {
    pub guess: String,
}

/// Snapshot returned by every session endpoint. Building one consumes the
/// pending feedback, so each message is delivered exactly once.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub player_name: Option<String>,
    pub phase: RoundPhase,
    pub puzzle: Option<Puzzle>,
    pub show_hints: bool,
    pub score: i64,
    pub puzzles_solved: u32,
    pub puzzles_skipped: u32,
    pub hints_used: u32,
    pub feedback: Option<Feedback>,
    pub last_finished: Option<FinishedRound>,
    pub current_ratings: Option<AggregateRating>,
    pub history: Vec<RoundRecord>,
    pub started_at: DateTime<Utc>,
}

impl SessionView {
    pub fn render(state: &mut SessionState) -> Self {
        Self {
            session_id: state.id.clone(),
            player_name: state.player_name.clone(),
            phase: state.phase,
            puzzle: state.current_puzzle.clone(),
            show_hints: state.show_hints,
            score: state.score,
            puzzles_solved: state.puzzles_solved,
            puzzles_skipped: state.puzzles_skipped,
            hints_used: state.hints_used,
            feedback: state.take_feedback(),
            last_finished: state.last_finished.clone(),
            current_ratings: state.current_ratings.clone(),
            history: state.history.clone(),
            started_at: state.started_at,
        }
    }
}
