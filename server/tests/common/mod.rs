#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use quadword_api::config::{Config, GameSettings, StorageSettings};
use quadword_api::create_router;
use quadword_api::models::rating::RatingScheme;
use quadword_api::services::AppState;
use quadword_api::storage::{MemoryObjectStore, ObjectStore};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryObjectStore>,
    pub fallback_dir: PathBuf,
}

impl TestApp {
    /// Removes the scratch fallback directory, if any rating landed there.
    pub fn cleanup(&self) {
        std::fs::remove_dir_all(&self.fallback_dir).ok();
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(seeded_store().await, true, RatingScheme::FiveStar).await
}

pub async fn create_test_app_with(
    store: Arc<MemoryObjectStore>,
    rate_on_skip: bool,
    rating_scheme: RatingScheme,
) -> TestApp {
    init_tracing();

    let fallback_dir = scratch_dir();
    let config = test_config(rate_on_skip, rating_scheme, &fallback_dir);

    let content: Option<Arc<dyn ObjectStore>> = Some(store.clone() as _);
    let app_state = Arc::new(AppState::with_stores(config, content.clone(), content));

    TestApp {
        router: create_router(app_state),
        store,
        fallback_dir,
    }
}

/// An app with no remote storage at all; only fallback content is served.
pub async fn create_offline_app(example_puzzle_path: &str) -> TestApp {
    init_tracing();

    let fallback_dir = scratch_dir();
    let mut config = test_config(true, RatingScheme::FiveStar, &fallback_dir);
    config.storage.example_puzzle_path = example_puzzle_path.to_string();

    let app_state = Arc::new(AppState::with_stores(config, None, None));

    TestApp {
        router: create_router(app_state),
        store: Arc::new(MemoryObjectStore::new()),
        fallback_dir,
    }
}

/// One puzzle with a known solution so guesses are deterministic.
pub async fn seeded_store() -> Arc<MemoryObjectStore> {
    let store = Arc::new(MemoryObjectStore::new());
    store
        .insert_json(
            "puzzles/garden-01.json",
            &json!({
                "images": {
                    "1": "flower-bed.png",
                    "2": "vegetables.png",
                    "3": "watering-can.png",
                    "4": "fence.png"
                },
                "descriptions": {
                    "1": "Flowers growing in neat rows",
                    "2": "Vegetables you grow at home",
                    "3": "It needs watering every evening",
                    "4": "A green space behind the house"
                }
            }),
        )
        .await;
    store
        .insert_json(
            "solutions_by_id/garden-01.json",
            &json!({ "target_word": "garden" }),
        )
        .await;
    for name in [
        "flower-bed.png",
        "vegetables.png",
        "watering-can.png",
        "fence.png",
    ] {
        store
            .insert(&format!("images/{}", name), vec![0u8; 16])
            .await;
    }
    store
}

fn test_config(rate_on_skip: bool, rating_scheme: RatingScheme, fallback_dir: &PathBuf) -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        storage: StorageSettings {
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            content_bucket: "word-puzzle-421".to_string(),
            ratings_bucket: None,
            url_ttl_seconds: 3600,
            fallback_dir: fallback_dir.display().to_string(),
            example_puzzle_path: "assets/example_puzzle.json".to_string(),
        },
        game: GameSettings {
            rate_on_skip,
            rating_scheme,
        },
    }
}

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("quadword-tests-{}", Uuid::new_v4()))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    split_response(response).await
}

pub async fn post_empty(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    split_response(response).await
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    split_response(response).await
}

pub async fn delete_request(app: &Router, uri: &str) -> StatusCode {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    response.status()
}

async fn split_response(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Creates a session over HTTP and returns the initial session view.
pub async fn start_session(app: &Router, player_name: Option<&str>) -> serde_json::Value {
    let body = match player_name {
        Some(name) => json!({ "player_name": name }),
        None => json!({}),
    };
    let (status, view) = post_json(app, "/api/v1/sessions", body).await;
    assert_eq!(
        status,
        StatusCode::CREATED,
        "create session failed: {}",
        view
    );
    view
}

pub fn session_path(view: &serde_json::Value, suffix: &str) -> String {
    format!(
        "/api/v1/sessions/{}{}",
        view["session_id"].as_str().expect("session_id in view"),
        suffix
    )
}
