use std::env;

use serde::Deserialize;

use crate::models::rating::RatingScheme;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub storage: StorageSettings,
    pub game: GameSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// S3-compatible endpoint. `None` means the regional AWS endpoint.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Bucket holding puzzles, solutions and images.
    pub content_bucket: String,
    /// Bucket for rating aggregates and logs. Defaults to the content bucket.
    pub ratings_bucket: Option<String>,
    pub url_ttl_seconds: u64,
    /// Directory ratings are written to when the remote bucket is down.
    pub fallback_dir: String,
    /// Bundled puzzle served when remote content is unreachable.
    pub example_puzzle_path: String,
}

impl StorageSettings {
    pub fn has_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }

    pub fn ratings_bucket_name(&self) -> &str {
        self.ratings_bucket.as_deref().unwrap_or(&self.content_bucket)
    }
}

#[derive(Debug, Clone)]
pub struct GameSettings {
    /// Whether skipping a puzzle also goes through the rating step.
    pub rate_on_skip: bool,
    pub rating_scheme: RatingScheme,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from the workspace root .env, falling
        // back to a local one.
        if dotenvy::from_path("../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env_name)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        // Extract values with fallbacks to the AWS-style ENV names the
        // original deployment used, then to defaults.
        let region = settings
            .get_string("storage.region")
            .or_else(|_| env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());

        let endpoint = settings
            .get_string("storage.endpoint")
            .ok()
            .or_else(|| env::var("STORAGE_ENDPOINT").ok());

        let access_key = settings
            .get_string("storage.access_key")
            .ok()
            .or_else(|| env::var("AWS_ACCESS_KEY_ID").ok());

        let secret_key = settings
            .get_string("storage.secret_key")
            .ok()
            .or_else(|| env::var("AWS_SECRET_ACCESS_KEY").ok());

        let content_bucket = settings
            .get_string("storage.content_bucket")
            .or_else(|_| env::var("S3_BUCKET_NAME"))
            .unwrap_or_else(|_| "word-puzzle-421".to_string());

        let ratings_bucket = settings
            .get_string("storage.ratings_bucket")
            .ok()
            .or_else(|| env::var("RATINGS_BUCKET_NAME").ok());

        let url_ttl_seconds = settings
            .get_int("storage.url_ttl_seconds")
            .ok()
            .map(|v| v.max(0) as u64)
            .or_else(|| {
                env::var("URL_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
            })
            .unwrap_or(3600);

        let fallback_dir = settings
            .get_string("storage.fallback_dir")
            .or_else(|_| env::var("FALLBACK_DIR"))
            .unwrap_or_else(|_| "fallback_storage".to_string());

        let example_puzzle_path = settings
            .get_string("storage.example_puzzle_path")
            .or_else(|_| env::var("EXAMPLE_PUZZLE_PATH"))
            .unwrap_or_else(|_| "assets/example_puzzle.json".to_string());

        let rate_on_skip = settings
            .get_bool("game.rate_on_skip")
            .ok()
            .or_else(|| {
                env::var("RATE_ON_SKIP")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok())
            })
            .unwrap_or(true);

        let rating_scheme = settings
            .get_string("game.rating_scheme")
            .ok()
            .or_else(|| env::var("RATING_SCHEME").ok())
            .map(|raw| {
                raw.parse::<RatingScheme>().unwrap_or_else(|e| {
                    eprintln!("WARNING: {}; falling back to five_star", e);
                    RatingScheme::default()
                })
            })
            .unwrap_or_default();

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        Ok(Config {
            bind_addr,
            storage: StorageSettings {
                endpoint,
                region,
                access_key,
                secret_key,
                content_bucket,
                ratings_bucket,
                url_ttl_seconds,
                fallback_dir,
                example_puzzle_path,
            },
            game: GameSettings {
                rate_on_skip,
                rating_scheme,
            },
        })
    }
}
