//! Integration tests for track downloads and the download ledger.

mod common;

use axum::http::StatusCode;
use common::{TestApp, TEST_BUCKET};
use soundvault::config::StorageConfig;

#[tokio::test]
async fn test_download_requires_authentication() {
    let app = TestApp::new().await;
    let track_id = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/sinnerman.mp3")
        .await;
    app.write_media("tracks/sinnerman.mp3", b"audio");

    let response = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .await;

    response.assert_status_unauthorized();
    assert_eq!(app.download_count(track_id).await, 0);
}

#[tokio::test]
async fn test_download_unknown_track() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let (name, value) = app.auth_header(&token);

    let response = app
        .server()
        .get("/api/music/tracks/999/download")
        .add_header(name, value)
        .await;

    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Track not found");
}

#[tokio::test]
async fn test_download_streams_local_file() {
    let app = TestApp::new().await;
    let (user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/sinnerman.mp3")
        .await;
    app.write_media("tracks/sinnerman.mp3", b"ID3 fake audio payload");

    let (name, value) = app.auth_header(&token);
    let response = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"ID3 fake audio payload");
    assert_eq!(response.header("content-type"), "audio/mpeg");
    assert_eq!(response.header("content-length"), "22");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"Nina Simone - Sinnerman.mp3\"; \
         filename*=UTF-8''Nina%20Simone%20-%20Sinnerman.mp3"
    );

    let db = app.db().lock().await;
    let logged_user: i64 = db
        .query_row(
            "SELECT user_id FROM download_logs WHERE track_id = ?1",
            [track_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(logged_user, user_id);
}

#[tokio::test]
async fn test_download_non_ascii_filename() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Björk", "Homogenic", "Jóga", "tracks/joga.mp3")
        .await;
    app.write_media("tracks/joga.mp3", b"audio");

    let (name, value) = app.auth_header(&token);
    let response = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let disposition = response.header("content-disposition");
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"Bj_rk - J_ga.mp3\""));
    assert!(disposition.ends_with("filename*=UTF-8''Bj%C3%B6rk%20-%20J%C3%B3ga.mp3"));
}

#[tokio::test]
async fn test_download_path_separators_in_names() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("AC/DC", "Back in Black", "Hells Bells", "tracks/bells.flac")
        .await;
    app.write_media("tracks/bells.flac", b"audio");

    let (name, value) = app.auth_header(&token);
    let response = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let disposition = response.header("content-disposition");
    assert!(disposition
        .to_str()
        .unwrap()
        .contains("filename=\"AC_DC - Hells Bells.flac\""));
}

#[tokio::test]
async fn test_download_without_file_is_logged() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app.seed_track("Miles Davis", "Kind of Blue", "So What", "").await;

    let (name, value) = app.auth_header(&token);
    let response = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .add_header(name, value)
        .await;

    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "No file associated with this track");
    assert_eq!(app.download_count(track_id).await, 1);
}

#[tokio::test]
async fn test_download_missing_file_is_logged() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Miles Davis", "Kind of Blue", "So What", "tracks/missing.mp3")
        .await;

    let (name, value) = app.auth_header(&token);
    let response = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .add_header(name, value)
        .await;

    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "File not found on server");
    assert_eq!(app.download_count(track_id).await, 1);
}

#[tokio::test]
async fn test_repeated_downloads_are_each_logged() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/sinnerman.mp3")
        .await;
    app.write_media("tracks/sinnerman.mp3", b"audio");

    for _ in 0..3 {
        let (name, value) = app.auth_header(&token);
        app.server()
            .get(&format!("/api/music/tracks/{}/download", track_id))
            .add_header(name, value)
            .await
            .assert_status_ok();
    }

    assert_eq!(app.download_count(track_id).await, 3);

    let detail: serde_json::Value = app
        .server()
        .get(&format!("/api/music/tracks/{}", track_id))
        .await
        .json();
    assert_eq!(detail["download_count"], 3);
}

#[tokio::test]
async fn test_download_returns_signed_url_for_object_storage() {
    let app = TestApp::with_object_storage().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/sinnerman.mp3")
        .await;

    let (name, value) = app.auth_header(&token);
    let response = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["filename"], "Nina Simone - Sinnerman.mp3");

    let url = body["download_url"].as_str().unwrap();
    assert!(url.starts_with(&format!(
        "http://localhost:9000/{}/tracks/sinnerman.mp3?",
        TEST_BUCKET
    )));
    assert!(url.contains("X-Amz-Signature="));
    assert!(url.contains("X-Amz-Expires=3600"));
    assert!(url.contains("response-content-disposition="));

    assert_eq!(app.download_count(track_id).await, 1);
}

#[tokio::test]
async fn test_signed_url_never_outlives_an_hour() {
    let app = TestApp::with_object_storage_config(StorageConfig {
        signed_url_ttl_secs: 86_400,
        ..Default::default()
    })
    .await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/sinnerman.mp3")
        .await;

    let (name, value) = app.auth_header(&token);
    let body: serde_json::Value = app
        .server()
        .get(&format!("/api/music/tracks/{}/download", track_id))
        .add_header(name, value)
        .await
        .json();

    let url = body["download_url"].as_str().unwrap();
    assert!(url.contains("X-Amz-Expires=3600"));
    assert!(!url.contains("X-Amz-Expires=86400"));
}

#[tokio::test]
async fn test_log_download_only() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/sinnerman.mp3")
        .await;

    let (name, value) = app.auth_header(&token);
    let response = app
        .server()
        .post(&format!("/api/music/tracks/{}/log-download", track_id))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Download logged successfully");
    assert_eq!(app.download_count(track_id).await, 1);
}

#[tokio::test]
async fn test_log_download_rejects_anonymous_and_unknown() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let track_id = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/sinnerman.mp3")
        .await;

    app.server()
        .post(&format!("/api/music/tracks/{}/log-download", track_id))
        .await
        .assert_status_unauthorized();

    let (name, value) = app.auth_header(&token);
    app.server()
        .post("/api/music/tracks/999/log-download")
        .add_header(name, value)
        .await
        .assert_status_not_found();

    assert_eq!(app.download_count(track_id).await, 0);
}

#[tokio::test]
async fn test_download_history_is_per_user() {
    let app = TestApp::new().await;
    let (_user_id, token) = app.create_user().await;
    let other_id = app
        .create_test_user("other", "otherpass", soundvault::db::models::UserRole::User)
        .await;
    let other_token = app.get_auth_token(other_id, soundvault::db::models::UserRole::User);

    let first = app
        .seed_track("Nina Simone", "Pastel Blues", "Sinnerman", "tracks/a.mp3")
        .await;
    let second = app
        .seed_track("Nina Simone", "Pastel Blues", "Tell Me More", "tracks/b.mp3")
        .await;

    for track_id in [first, second] {
        let (name, value) = app.auth_header(&token);
        app.server()
            .post(&format!("/api/music/tracks/{}/log-download", track_id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::CREATED);
    }

    let (name, value) = app.auth_header(&token);
    let history: serde_json::Value = app
        .server()
        .get("/api/music/downloads")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(history["total"], 2);
    // Newest first
    assert_eq!(history["items"][0]["track"]["title"], "Tell Me More");
    assert_eq!(history["items"][1]["track"]["title"], "Sinnerman");

    let (name, value) = app.auth_header(&other_token);
    let history: serde_json::Value = app
        .server()
        .get("/api/music/downloads")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(history["total"], 0);

    app.server()
        .get("/api/music/downloads")
        .await
        .assert_status_unauthorized();
}
