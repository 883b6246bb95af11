use axum::http::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn create_session_serves_a_puzzle_with_presigned_images() {
    let app = common::create_test_app().await;

    let view = common::start_session(&app.router, Some("Ada")).await;

    assert_eq!(view["phase"], "awaiting_guess");
    assert_eq!(view["player_name"], "Ada");
    assert_eq!(view["score"], 0);
    assert_eq!(view["puzzles_solved"], 0);
    assert_eq!(view["puzzle"]["id"], "garden-01");
    assert_eq!(
        view["puzzle"]["image_urls"]["1"],
        "memory://images/flower-bed.png"
    );
    assert_eq!(
        view["puzzle"]["descriptions"]["4"],
        "A green space behind the house"
    );
    assert!(view["feedback"].is_null());
    assert!(view["last_finished"].is_null());
    app.cleanup();
}

#[tokio::test]
async fn anonymous_sessions_are_allowed() {
    let app = common::create_test_app().await;

    let view = common::start_session(&app.router, None).await;

    assert!(view["player_name"].is_null());
    assert_eq!(view["phase"], "awaiting_guess");
    app.cleanup();
}

#[tokio::test]
async fn overlong_player_name_is_rejected() {
    let app = common::create_test_app().await;

    let (status, _) = common::post_json(
        &app.router,
        "/api/v1/sessions",
        json!({ "player_name": "x".repeat(65) }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.cleanup();
}

#[tokio::test]
async fn session_view_is_retrievable_by_id() {
    let app = common::create_test_app().await;
    let view = common::start_session(&app.router, None).await;

    let (status, fetched) =
        common::get_json(&app.router, &common::session_path(&view, "")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["session_id"], view["session_id"]);
    assert_eq!(fetched["phase"], "awaiting_guess");
    app.cleanup();
}

#[tokio::test]
async fn player_name_can_be_set_later() {
    let app = common::create_test_app().await;
    let view = common::start_session(&app.router, None).await;

    let (status, updated) = common::post_json(
        &app.router,
        &common::session_path(&view, "/name"),
        json!({ "player_name": "  Grace  " }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["player_name"], "Grace");
    app.cleanup();
}

#[tokio::test]
async fn blank_player_name_is_rejected() {
    let app = common::create_test_app().await;
    let view = common::start_session(&app.router, None).await;

    let (status, _) = common::post_json(
        &app.router,
        &common::session_path(&view, "/name"),
        json!({ "player_name": "   " }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.cleanup();
}

#[tokio::test]
async fn unknown_session_ids_return_404() {
    let app = common::create_test_app().await;

    let (status, _) = common::get_json(&app.router, "/api/v1/sessions/no-such-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = common::post_json(
        &app.router,
        "/api/v1/sessions/no-such-id/guess",
        json!({ "guess": "garden" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.cleanup();
}

#[tokio::test]
async fn ended_sessions_are_gone() {
    let app = common::create_test_app().await;
    let view = common::start_session(&app.router, None).await;
    let path = common::session_path(&view, "");

    assert_eq!(
        common::delete_request(&app.router, &path).await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        common::delete_request(&app.router, &path).await,
        StatusCode::NOT_FOUND
    );

    let (status, _) = common::get_json(&app.router, &path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.cleanup();
}

#[tokio::test]
async fn sessions_do_not_leak_state_into_each_other() {
    let app = common::create_test_app().await;
    let first = common::start_session(&app.router, None).await;
    let second = common::start_session(&app.router, None).await;

    let (_, solved) = common::post_json(
        &app.router,
        &common::session_path(&first, "/guess"),
        json!({ "guess": "garden" }),
    )
    .await;
    assert_eq!(solved["puzzles_solved"], 1);

    let (_, other) = common::get_json(&app.router, &common::session_path(&second, "")).await;
    assert_eq!(other["puzzles_solved"], 0);
    assert_eq!(other["score"], 0);
    assert_eq!(other["phase"], "awaiting_guess");
    app.cleanup();
}
