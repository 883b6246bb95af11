use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::metrics::{track_storage_operation, RATINGS_RECORDED_TOTAL};
use crate::models::rating::{
    log_bucket_key, AggregateRating, CategoricalAggregate, DimensionAverage, NumericAggregate,
    RatingLogEntry, RatingScheme, RatingSubmission, RatingValues,
};
use crate::services::puzzle_store::RATINGS_PREFIX;
use crate::storage::{LocalObjectStore, ObjectStore, StoreError};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Persists player ratings: an aggregate per puzzle plus an append-only log
/// bucketed by hour. Remote writes that fail land in a local fallback
/// directory instead; the player is never shown a storage error.
pub struct RatingAggregator {
    remote: Option<Arc<dyn ObjectStore>>,
    fallback: LocalObjectStore,
    scheme: RatingScheme,
}

impl RatingAggregator {
    pub fn new(
        remote: Option<Arc<dyn ObjectStore>>,
        fallback: LocalObjectStore,
        scheme: RatingScheme,
    ) -> Self {
        Self {
            remote,
            fallback,
            scheme,
        }
    }

    pub fn scheme(&self) -> RatingScheme {
        self.scheme
    }

    /// Records one rating. Returns whether it reached the remote bucket;
    /// `false` means it went to (or was lost by) the local fallback, which
    /// callers may log but must not surface to the player.
    pub async fn record_rating(&self, submission: RatingSubmission) -> bool {
        if !submission.values.matches_scheme(self.scheme) {
            error!(
                "Rating for puzzle {} does not match configured scheme {}; dropping it",
                submission.puzzle_id, self.scheme
            );
            return false;
        }

        let now = Utc::now();
        let entry = RatingLogEntry::from_submission(&submission, now);

        match self.record_remote(&submission, &entry, now).await {
            Ok(()) => {
                info!(
                    "Recorded rating for puzzle {} from session {}",
                    submission.puzzle_id, submission.session_id
                );
                RATINGS_RECORDED_TOTAL.with_label_values(&["remote"]).inc();
                true
            }
            Err(e) => {
                warn!(
                    "Failed to persist rating for puzzle {} remotely: {:#}; using local fallback",
                    submission.puzzle_id, e
                );
                self.record_fallback(&submission, &entry, now).await;
                RATINGS_RECORDED_TOTAL
                    .with_label_values(&["fallback"])
                    .inc();
                false
            }
        }
    }

    async fn record_remote(
        &self,
        submission: &RatingSubmission,
        entry: &RatingLogEntry,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let store = self
            .remote
            .as_ref()
            .ok_or_else(|| anyhow!("no remote ratings store configured"))?;

        // Append the entry to its hour bucket. Plain read-append-write; the
        // bucket is small (one hour of ratings) and rewritten whole. The log
        // is the source of truth for every rating, so its write retries
        // aggressively.
        let log_key = log_bucket_key(now);
        let mut entries = self.read_log_bucket(store.as_ref(), &log_key).await?;
        entries.push(entry.clone());
        let log_bytes =
            serde_json::to_vec(&entries).context("Failed to serialize rating log bucket")?;
        retry_async_with_config(RetryConfig::aggressive(), || {
            track_storage_operation(
                "put",
                store.put(&log_key, log_bytes.clone(), "application/json"),
            )
        })
        .await
        .with_context(|| format!("Failed to write rating log {}", log_key))?;

        // Read-modify-write the aggregate. Two concurrent writers can read
        // the same snapshot and the later write wins, losing an increment;
        // the log bucket keeps every individual rating, so the aggregate is
        // always rebuildable.
        let agg_key = format!("{}{}.json", RATINGS_PREFIX, submission.puzzle_id);
        let existing = self.read_aggregate(store.as_ref(), &agg_key).await?;
        let merged = merge_aggregate(existing, submission, self.scheme, now)?;
        let agg_bytes =
            serde_json::to_vec(&merged).context("Failed to serialize rating aggregate")?;
        retry_async_with_config(RetryConfig::default(), || {
            track_storage_operation(
                "put",
                store.put(&agg_key, agg_bytes.clone(), "application/json"),
            )
        })
        .await
        .with_context(|| format!("Failed to write rating aggregate {}", agg_key))?;

        Ok(())
    }

    async fn read_log_bucket(
        &self,
        store: &dyn ObjectStore,
        key: &str,
    ) -> Result<Vec<RatingLogEntry>> {
        match track_storage_operation("get", store.get(key)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Rating log {} is unreadable", key)),
            Err(StoreError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_aggregate(
        &self,
        store: &dyn ObjectStore,
        key: &str,
    ) -> Result<Option<AggregateRating>> {
        match track_storage_operation("get", store.get(key)).await {
            Ok(bytes) => match serde_json::from_slice::<AggregateRating>(&bytes) {
                Ok(aggregate) => Ok(Some(aggregate)),
                Err(e) => {
                    // The aggregate is derived data; a damaged one gets
                    // rebuilt starting from this rating.
                    warn!("Existing aggregate {} is unreadable ({}); reseeding", key, e);
                    Ok(None)
                }
            },
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_fallback(
        &self,
        submission: &RatingSubmission,
        entry: &RatingLogEntry,
        now: DateTime<Utc>,
    ) {
        match self.write_fallback(submission, entry, now).await {
            Ok(()) => info!(
                "Rating for puzzle {} stored in local fallback under {}",
                submission.puzzle_id,
                self.fallback.root().display()
            ),
            Err(e) => error!(
                "Local fallback write for puzzle {} failed as well; rating lost: {:#}",
                submission.puzzle_id, e
            ),
        }
    }

    async fn write_fallback(
        &self,
        submission: &RatingSubmission,
        entry: &RatingLogEntry,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let log_key = log_bucket_key(now);
        let mut entries: Vec<RatingLogEntry> = match self.fallback.get(&log_key).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                // Last resort storage; salvage what we can and keep this
                // rating over unreadable bytes.
                warn!("Fallback log {} is unreadable ({}); starting fresh", log_key, e);
                Vec::new()
            }),
            Err(StoreError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        entries.push(entry.clone());
        self.fallback
            .put(&log_key, serde_json::to_vec(&entries)?, "application/json")
            .await?;

        let agg_key = format!("{}{}.json", RATINGS_PREFIX, submission.puzzle_id);
        let existing = match self.fallback.get(&agg_key).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(_) => None,
        };
        let merged = merge_aggregate(existing, submission, self.scheme, now)?;
        self.fallback
            .put(&agg_key, serde_json::to_vec(&merged)?, "application/json")
            .await?;

        Ok(())
    }
}

/// Pure merge step of the read-modify-write cycle: folds one rating into an
/// aggregate snapshot. Public so tests can reproduce the lost-update
/// interleaving (two merges from one snapshot) deterministically.
pub fn merge_aggregate(
    existing: Option<AggregateRating>,
    submission: &RatingSubmission,
    scheme: RatingScheme,
    now: DateTime<Utc>,
) -> Result<AggregateRating> {
    match (scheme, submission.values) {
        (RatingScheme::FiveStar, RatingValues::Stars { difficulty, fun }) => {
            let base = match existing {
                Some(AggregateRating::Numeric(agg)) => Some(agg),
                Some(AggregateRating::Categorical(_)) => {
                    warn!(
                        "Aggregate for puzzle {} was collected under a different scheme; reseeding",
                        submission.puzzle_id
                    );
                    None
                }
                None => None,
            };

            let merged = match base {
                Some(mut agg) => {
                    agg.difficulty = agg.difficulty.merge(difficulty);
                    agg.fun = agg.fun.merge(fun);
                    agg.total_ratings += 1;
                    agg.target_word = submission.target_word.clone();
                    agg.last_updated = now;
                    agg
                }
                None => NumericAggregate {
                    puzzle_id: submission.puzzle_id.clone(),
                    target_word: submission.target_word.clone(),
                    difficulty: DimensionAverage::seed(difficulty),
                    fun: DimensionAverage::seed(fun),
                    total_ratings: 1,
                    last_updated: now,
                },
            };
            Ok(AggregateRating::Numeric(merged))
        }
        (RatingScheme::Categorical, RatingValues::Labels { difficulty, fun }) => {
            let base = match existing {
                Some(AggregateRating::Categorical(agg)) => Some(agg),
                Some(AggregateRating::Numeric(_)) => {
                    warn!(
                        "Aggregate for puzzle {} was collected under a different scheme; reseeding",
                        submission.puzzle_id
                    );
                    None
                }
                None => None,
            };

            let merged = match base {
                Some(mut agg) => {
                    agg.difficulty.bump(difficulty);
                    agg.fun.bump(fun);
                    agg.total_ratings += 1;
                    agg.target_word = submission.target_word.clone();
                    agg.last_updated = now;
                    agg
                }
                None => {
                    let mut agg = CategoricalAggregate {
                        puzzle_id: submission.puzzle_id.clone(),
                        target_word: submission.target_word.clone(),
                        difficulty: Default::default(),
                        fun: Default::default(),
                        total_ratings: 1,
                        last_updated: now,
                    };
                    agg.difficulty.bump(difficulty);
                    agg.fun.bump(fun);
                    agg
                }
            };
            Ok(AggregateRating::Categorical(merged))
        }
        _ => bail!(
            "rating values for puzzle {} do not match scheme {}",
            submission.puzzle_id,
            scheme
        ),
    }
}
