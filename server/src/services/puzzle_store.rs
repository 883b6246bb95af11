use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::metrics::{track_storage_operation, PUZZLES_SERVED_TOTAL};
use crate::models::rating::AggregateRating;
use crate::models::{ExamplePuzzleFile, Puzzle, PuzzleDocument, SolutionDocument, PUZZLE_SLOTS};
use crate::storage::{ObjectStore, StoreError};

pub const PUZZLE_PREFIX: &str = "puzzles/";
pub const SOLUTION_PREFIX: &str = "solutions_by_id/";
pub const IMAGE_PREFIX: &str = "images/";
pub const RATINGS_PREFIX: &str = "ratings/";

pub const BUILTIN_PUZZLE_ID: &str = "builtin-apple";
pub const EXAMPLE_PUZZLE_ID: &str = "example";
const BUILTIN_TARGET: &str = "apple";
const UNKNOWN_SOLUTION: &str = "unknown";

lazy_static! {
    // Only accept flat `puzzles/<id>.json` keys; anything nested or oddly
    // named in the bucket is ignored rather than turned into a broken round.
    static ref PUZZLE_KEY_RE: Regex = Regex::new(r"^puzzles/([A-Za-z0-9._-]+)\.json$").unwrap();
}

/// Read-side access to puzzle content with a three-tier fallback: the remote
/// bucket, then the bundled example puzzle, then a built-in puzzle. Every
/// degradation is logged and absorbed here; callers always get something
/// playable.
pub struct PuzzleStore {
    content: Option<Arc<dyn ObjectStore>>,
    ratings: Option<Arc<dyn ObjectStore>>,
    url_ttl: Duration,
    example_path: PathBuf,
}

impl PuzzleStore {
    pub fn new(
        content: Option<Arc<dyn ObjectStore>>,
        ratings: Option<Arc<dyn ObjectStore>>,
        url_ttl: Duration,
        example_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            content,
            ratings,
            url_ttl,
            example_path: example_path.into(),
        }
    }

    pub fn has_remote(&self) -> bool {
        self.content.is_some()
    }

    /// Counts remote puzzles, surfacing storage errors. Used by the health
    /// endpoint; gameplay paths go through the degrading accessors instead.
    pub async fn probe_content(&self) -> Result<usize, StoreError> {
        match &self.content {
            Some(store) => Ok(store.list(PUZZLE_PREFIX).await?.len()),
            None => Err(StoreError::Unconfigured),
        }
    }

    /// All puzzle ids currently in the remote bucket. Listing failures and
    /// offline mode both collapse to an empty list.
    pub async fn list_puzzle_ids(&self) -> Vec<String> {
        let Some(store) = &self.content else {
            debug!("No remote content store configured; skipping puzzle listing");
            return Vec::new();
        };

        match track_storage_operation("list", store.list(PUZZLE_PREFIX)).await {
            Ok(keys) => keys
                .iter()
                .filter_map(|key| puzzle_id_from_key(key))
                .collect(),
            Err(e) => {
                warn!("Failed to list puzzles: {}", e);
                Vec::new()
            }
        }
    }

    /// Loads one puzzle from the remote bucket and resolves its image URLs.
    /// `None` covers both "missing" and "unreadable"; the caller decides
    /// which fallback tier comes next.
    pub async fn puzzle_by_id(&self, puzzle_id: &str) -> Option<Puzzle> {
        let store = self.content.as_ref()?;
        match self.fetch_puzzle(store.as_ref(), puzzle_id).await {
            Ok(puzzle) => Some(puzzle),
            Err(e) => {
                warn!("Failed to load puzzle {}: {:#}", puzzle_id, e);
                None
            }
        }
    }

    /// Chooses a puzzle uniformly from the remote bucket, falling back to
    /// the bundled example and finally the built-in puzzle. Always yields a
    /// playable puzzle, with or without connectivity.
    pub async fn random_puzzle(&self) -> Puzzle {
        let ids = self.list_puzzle_ids().await;
        if !ids.is_empty() {
            let id = &ids[rand::random_range(0..ids.len())];
            match self.puzzle_by_id(id).await {
                Some(puzzle) => {
                    PUZZLES_SERVED_TOTAL.with_label_values(&["remote"]).inc();
                    return puzzle;
                }
                None => warn!(
                    "Randomly chosen puzzle {} failed to load; using fallback content",
                    id
                ),
            }
        }

        if let Some(puzzle) = self.example_puzzle().await {
            PUZZLES_SERVED_TOTAL.with_label_values(&["example"]).inc();
            info!("Serving bundled example puzzle '{}'", puzzle.id);
            return puzzle;
        }

        PUZZLES_SERVED_TOTAL.with_label_values(&["builtin"]).inc();
        info!("Serving built-in fallback puzzle");
        Self::builtin_puzzle()
    }

    /// Case-insensitive guess check against the stored solution. Any failure
    /// to reach the solution is logged and treated as "not correct" so a
    /// broken bucket can never hand out free points.
    pub async fn validate_answer(&self, puzzle_id: &str, guess: &str) -> bool {
        let guess = guess.trim();
        if guess.is_empty() {
            return false;
        }

        match self.lookup_solution(puzzle_id).await {
            Ok(target) => guess.to_lowercase() == target.trim().to_lowercase(),
            Err(e) => {
                warn!(
                    "Could not validate guess for puzzle {}: {:#}",
                    puzzle_id, e
                );
                false
            }
        }
    }

    /// The target word for a puzzle, or a placeholder when it cannot be
    /// resolved. Used on skip, where the player is owed an answer even if
    /// storage is down.
    pub async fn solution(&self, puzzle_id: &str) -> String {
        match self.lookup_solution(puzzle_id).await {
            Ok(word) => word,
            Err(e) => {
                warn!(
                    "Falling back to placeholder solution for puzzle {}: {:#}",
                    puzzle_id, e
                );
                UNKNOWN_SOLUTION.to_string()
            }
        }
    }

    /// Aggregate ratings for a puzzle. `None` means "no ratings yet" or "not
    /// reachable right now"; the distinction only matters in the logs.
    pub async fn aggregate_ratings(&self, puzzle_id: &str) -> Option<AggregateRating> {
        let store = self.ratings.as_ref()?;
        let key = format!("{}{}.json", RATINGS_PREFIX, puzzle_id);

        match track_storage_operation("get", store.get(&key)).await {
            Ok(bytes) => match serde_json::from_slice::<AggregateRating>(&bytes) {
                Ok(aggregate) => Some(aggregate),
                Err(e) => {
                    warn!("Stored ratings for puzzle {} are unreadable: {}", puzzle_id, e);
                    None
                }
            },
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                warn!("Failed to fetch ratings for puzzle {}: {}", puzzle_id, e);
                None
            }
        }
    }

    pub async fn example_puzzle(&self) -> Option<Puzzle> {
        let file = self.load_example_file().await?;
        let mut image_urls = BTreeMap::new();
        let mut descriptions = BTreeMap::new();
        for slot in PUZZLE_SLOTS {
            image_urls.insert(
                slot.to_string(),
                file.image_urls.get(slot).cloned().unwrap_or_default(),
            );
            descriptions.insert(
                slot.to_string(),
                file.descriptions.get(slot).cloned().unwrap_or_default(),
            );
        }
        Some(Puzzle {
            id: file
                .id
                .clone()
                .unwrap_or_else(|| EXAMPLE_PUZZLE_ID.to_string()),
            image_urls,
            descriptions,
        })
    }

    /// The last-resort puzzle. Ships with the binary, needs no storage, no
    /// images; the descriptions carry the clues.
    pub fn builtin_puzzle() -> Puzzle {
        let mut image_urls = BTreeMap::new();
        let mut descriptions = BTreeMap::new();
        let clues = [
            "A fruit that famously keeps the doctor away",
            "What fell on Isaac Newton's head",
            "New York City's nickname is 'The Big' one of these",
            "The record label founded by The Beatles",
        ];
        for (slot, clue) in PUZZLE_SLOTS.iter().zip(clues) {
            image_urls.insert(slot.to_string(), String::new());
            descriptions.insert(slot.to_string(), clue.to_string());
        }
        Puzzle {
            id: BUILTIN_PUZZLE_ID.to_string(),
            image_urls,
            descriptions,
        }
    }

    async fn fetch_puzzle(&self, store: &dyn ObjectStore, puzzle_id: &str) -> Result<Puzzle> {
        let key = format!("{}{}.json", PUZZLE_PREFIX, puzzle_id);
        let bytes = track_storage_operation("get", store.get(&key))
            .await
            .with_context(|| format!("Failed to fetch puzzle document {}", key))?;
        let doc: PuzzleDocument = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid puzzle document {}", key))?;
        Ok(self.resolve_images(store, puzzle_id, doc))
    }

    /// Turns stored image names into presigned URLs. A slot whose image
    /// cannot be presigned gets an empty URL and the round goes on; the
    /// description still identifies the slot.
    fn resolve_images(
        &self,
        store: &dyn ObjectStore,
        puzzle_id: &str,
        doc: PuzzleDocument,
    ) -> Puzzle {
        let mut image_urls = BTreeMap::new();
        let mut descriptions = BTreeMap::new();

        for slot in PUZZLE_SLOTS {
            let url = doc
                .images
                .get(slot)
                .map(|name| {
                    let key = format!("{}{}", IMAGE_PREFIX, name);
                    match store.presign_get(&key, self.url_ttl) {
                        Ok(url) => url,
                        Err(e) => {
                            warn!(
                                "Failed to presign image {} for puzzle {}: {}",
                                name, puzzle_id, e
                            );
                            String::new()
                        }
                    }
                })
                .unwrap_or_default();

            image_urls.insert(slot.to_string(), url);
            descriptions.insert(
                slot.to_string(),
                doc.descriptions.get(slot).cloned().unwrap_or_default(),
            );
        }

        Puzzle {
            id: puzzle_id.to_string(),
            image_urls,
            descriptions,
        }
    }

    async fn lookup_solution(&self, puzzle_id: &str) -> Result<String> {
        if puzzle_id == BUILTIN_PUZZLE_ID {
            return Ok(BUILTIN_TARGET.to_string());
        }

        let remote_err = match &self.content {
            Some(store) => match self.fetch_solution(store.as_ref(), puzzle_id).await {
                Ok(word) => return Ok(word),
                Err(e) => Some(e),
            },
            None => None,
        };

        if let Some(example) = self.load_example_file().await {
            let example_id = example.id.as_deref().unwrap_or(EXAMPLE_PUZZLE_ID);
            if example_id == puzzle_id {
                return Ok(example.target_word);
            }
        }

        Err(remote_err.unwrap_or_else(|| {
            anyhow!("no solution source available for puzzle {}", puzzle_id)
        }))
    }

    async fn fetch_solution(&self, store: &dyn ObjectStore, puzzle_id: &str) -> Result<String> {
        let key = format!("{}{}.json", SOLUTION_PREFIX, puzzle_id);
        let bytes = track_storage_operation("get", store.get(&key))
            .await
            .with_context(|| format!("Failed to fetch solution document {}", key))?;
        let doc: SolutionDocument = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid solution document {}", key))?;
        Ok(doc.target_word)
    }

    async fn load_example_file(&self) -> Option<ExamplePuzzleFile> {
        let bytes = match tokio::fs::read(&self.example_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(
                    "Example puzzle file {} unavailable: {}",
                    self.example_path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_slice::<ExamplePuzzleFile>(&bytes) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(
                    "Example puzzle file {} is invalid: {}",
                    self.example_path.display(),
                    e
                );
                None
            }
        }
    }
}

fn puzzle_id_from_key(key: &str) -> Option<String> {
    PUZZLE_KEY_RE
        .captures(key)
        .map(|caps| caps[1].to_string())
}
