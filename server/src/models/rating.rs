use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which vocabulary players rate puzzles in. Both dimensions (difficulty and
/// fun) always use the same scheme; a deployment picks one and sticks to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingScheme {
    #[default]
    FiveStar,
    Categorical,
}

impl FromStr for RatingScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "five_star" | "fivestar" | "stars" => Ok(RatingScheme::FiveStar),
            "categorical" | "labels" => Ok(RatingScheme::Categorical),
            other => Err(format!("unknown rating scheme: {}", other)),
        }
    }
}

impl fmt::Display for RatingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingScheme::FiveStar => write!(f, "five_star"),
            RatingScheme::Categorical => write!(f, "categorical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLabel {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLabel {
    BadImages,
    BadPuzzle,
    NoIssues,
}

/// One player's answers to the two rating questions. Numbers mean the
/// five-star scheme, strings mean the categorical one; serde's untagged
/// representation keeps the wire format flat either way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RatingValues {
    Stars { difficulty: u8, fun: u8 },
    Labels {
        difficulty: DifficultyLabel,
        fun: IssueLabel,
    },
}

impl RatingValues {
    /// Checks the values against the configured scheme, including the 1-5
    /// range for stars.
    pub fn matches_scheme(&self, scheme: RatingScheme) -> bool {
        match (self, scheme) {
            (RatingValues::Stars { difficulty, fun }, RatingScheme::FiveStar) => {
                (1..=5).contains(difficulty) && (1..=5).contains(fun)
            }
            (RatingValues::Labels { .. }, RatingScheme::Categorical) => true,
            _ => false,
        }
    }
}

/// Running average plus sample count for one numeric dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionAverage {
    pub average: f64,
    pub count: u64,
}

impl DimensionAverage {
    pub fn merge(self, value: u8) -> Self {
        let count = self.count + 1;
        let average = (self.average * self.count as f64 + f64::from(value)) / count as f64;
        Self { average, count }
    }

    pub fn seed(value: u8) -> Self {
        Self {
            average: f64::from(value),
            count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyTally {
    pub easy: u64,
    pub medium: u64,
    pub hard: u64,
}

impl DifficultyTally {
    pub fn bump(&mut self, label: DifficultyLabel) {
        match label {
            DifficultyLabel::Easy => self.easy += 1,
            DifficultyLabel::Medium => self.medium += 1,
            DifficultyLabel::Hard => self.hard += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTally {
    pub bad_images: u64,
    pub bad_puzzle: u64,
    pub no_issues: u64,
}

impl IssueTally {
    pub fn bump(&mut self, label: IssueLabel) {
        match label {
            IssueLabel::BadImages => self.bad_images += 1,
            IssueLabel::BadPuzzle => self.bad_puzzle += 1,
            IssueLabel::NoIssues => self.no_issues += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericAggregate {
    pub puzzle_id: String,
    pub target_word: String,
    pub difficulty: DimensionAverage,
    pub fun: DimensionAverage,
    pub total_ratings: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalAggregate {
    pub puzzle_id: String,
    pub target_word: String,
    pub difficulty: DifficultyTally,
    pub fun: IssueTally,
    pub total_ratings: u64,
    pub last_updated: DateTime<Utc>,
}

/// Per-puzzle rating aggregate as stored under `ratings/{puzzle_id}.json`.
/// Shape depends on the scheme it was collected with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregateRating {
    Numeric(NumericAggregate),
    Categorical(CategoricalAggregate),
}

impl AggregateRating {
    pub fn total_ratings(&self) -> u64 {
        match self {
            AggregateRating::Numeric(agg) => agg.total_ratings,
            AggregateRating::Categorical(agg) => agg.total_ratings,
        }
    }

    pub fn puzzle_id(&self) -> &str {
        match self {
            AggregateRating::Numeric(agg) => &agg.puzzle_id,
            AggregateRating::Categorical(agg) => &agg.puzzle_id,
        }
    }
}

/// Everything the aggregator needs to persist one rating.
#[derive(Debug, Clone)]
pub struct RatingSubmission {
    pub puzzle_id: String,
    pub target_word: String,
    pub session_id: String,
    pub player_name: Option<String>,
    pub values: RatingValues,
    pub time_to_solve: f64,
    pub hints_used: bool,
    pub was_skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingMetadata {
    pub time_to_solve: f64,
    pub hints_used: bool,
    pub was_skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

/// Immutable audit entry appended to the hour bucket it falls into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingLogEntry {
    pub log_id: String,
    pub puzzle_id: String,
    pub target_word: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub ratings: RatingValues,
    pub metadata: RatingMetadata,
}

impl RatingLogEntry {
    pub fn from_submission(submission: &RatingSubmission, now: DateTime<Utc>) -> Self {
        Self {
            log_id: uuid::Uuid::new_v4().to_string(),
            puzzle_id: submission.puzzle_id.clone(),
            target_word: submission.target_word.clone(),
            session_id: submission.session_id.clone(),
            timestamp: now,
            ratings: submission.values,
            metadata: RatingMetadata {
                time_to_solve: submission.time_to_solve,
                hints_used: submission.hints_used,
                was_skipped: submission.was_skipped,
                player_name: submission.player_name.clone(),
            },
        }
    }
}

/// Key of the hour bucket a timestamp falls into. All ratings recorded in
/// the same UTC hour share one object.
pub fn log_bucket_key(at: DateTime<Utc>) -> String {
    format!("rating_logs/{}.json", at.format("%Y-%m-%d-%H"))
}
