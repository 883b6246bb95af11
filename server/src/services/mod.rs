use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::storage::{LocalObjectStore, ObjectStore, S3ObjectStore};

use self::puzzle_store::PuzzleStore;
use self::rating_service::RatingAggregator;
use self::session_registry::SessionRegistry;

pub struct AppState {
    pub config: Config,
    pub puzzles: Arc<PuzzleStore>,
    pub ratings: Arc<RatingAggregator>,
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Wires the service graph from configuration. A missing or broken
    /// storage setup degrades the instance to bundled content instead of
    /// failing startup.
    pub fn new(config: Config) -> Self {
        let content = match S3ObjectStore::new(&config.storage, &config.storage.content_bucket) {
            Ok(store) => {
                tracing::info!(
                    "Content storage ready (bucket {})",
                    config.storage.content_bucket
                );
                Some(Arc::new(store) as Arc<dyn ObjectStore>)
            }
            Err(err) => {
                tracing::warn!(
                    "Content storage unavailable, serving fallback content only: {:#}",
                    err
                );
                None
            }
        };

        let ratings_remote =
            match S3ObjectStore::new(&config.storage, config.storage.ratings_bucket_name()) {
                Ok(store) => {
                    tracing::info!(
                        "Ratings storage ready (bucket {})",
                        config.storage.ratings_bucket_name()
                    );
                    Some(Arc::new(store) as Arc<dyn ObjectStore>)
                }
                Err(err) => {
                    tracing::warn!(
                        "Ratings storage unavailable, ratings go to the local fallback: {:#}",
                        err
                    );
                    None
                }
            };

        Self::with_stores(config, content, ratings_remote)
    }

    /// Builds the state over explicit stores so tests can substitute
    /// in-memory storage for the S3 client.
    pub fn with_stores(
        config: Config,
        content: Option<Arc<dyn ObjectStore>>,
        ratings_remote: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let puzzles = Arc::new(PuzzleStore::new(
            content,
            ratings_remote.clone(),
            Duration::from_secs(config.storage.url_ttl_seconds),
            config.storage.example_puzzle_path.clone(),
        ));
        let ratings = Arc::new(RatingAggregator::new(
            ratings_remote,
            LocalObjectStore::new(&config.storage.fallback_dir),
            config.game.rating_scheme,
        ));

        Self {
            config,
            puzzles,
            ratings,
            sessions: SessionRegistry::new(),
        }
    }
}

pub mod puzzle_store;
pub mod rating_service;
pub mod round_engine;
pub mod session_registry;
