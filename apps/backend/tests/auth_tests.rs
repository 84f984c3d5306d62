//! Integration tests for authentication endpoints.

mod common;

use common::TestApp;
use soundvault::db::models::UserRole;

#[tokio::test]
async fn test_login_success() {
    let app = TestApp::new().await;

    // Create a test user
    let _user_id = app
        .create_test_user("testuser", "password123", UserRole::User)
        .await;

    // Attempt login
    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "username": "testuser",
            "password": "password123"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.get("token").is_some());
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new().await;

    // Create a test user
    let _user_id = app
        .create_test_user("testuser", "password123", UserRole::User)
        .await;

    // Attempt login with wrong password
    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "username": "testuser",
            "password": "wrongpassword"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_login_nonexistent_user() {
    let app = TestApp::new().await;

    // Attempt login with nonexistent user
    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "username": "nonexistent",
            "password": "password123"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_me_endpoint_authenticated() {
    let app = TestApp::new().await;

    // Create user and get token
    let (user_id, token) = app.create_user().await;
    let (name, value) = app.auth_header(&token);

    // Access /me endpoint
    let response = app
        .server()
        .get("/api/auth/me")
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["id"], user_id);
    assert_eq!(body["username"], "testuser");
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn test_me_endpoint_unauthenticated() {
    let app = TestApp::new().await;

    // Attempt to access /me without token
    let response = app.server().get("/api/auth/me").await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_me_endpoint_invalid_token() {
    let app = TestApp::new().await;

    // Attempt to access /me with invalid token
    let (name, value) = app.auth_header("invalid-token-xyz");
    let response = app
        .server()
        .get("/api/auth/me")
        .add_header(name, value)
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_logout_success() {
    let app = TestApp::new().await;

    // Create user and get token
    let (_user_id, token) = app.create_user().await;
    let (name, value) = app.auth_header(&token);

    // Logout
    let response = app
        .server()
        .post("/api/auth/logout")
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Logged out successfully");
}

#[tokio::test]
async fn test_logout_unauthenticated() {
    let app = TestApp::new().await;

    // Attempt to logout without token
    let response = app.server().post("/api/auth/logout").await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_login_returns_role() {
    let app = TestApp::new().await;

    app.create_test_user("curator", "password123", UserRole::Admin)
        .await;

    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "username": "curator",
            "password": "password123"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["username"], "curator");
    assert_eq!(body["user"]["role"], "admin");
}

#[tokio::test]
async fn test_register_creates_user() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "username": "listener",
            "password": "longenough"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["role"], "user");

    // The returned token works immediately
    let token = body["token"].as_str().unwrap();
    let (name, value) = app.auth_header(token);
    let me = app.server().get("/api/auth/me").add_header(name, value).await;
    me.assert_status_ok();
    assert_eq!(me.json::<serde_json::Value>()["username"], "listener");
}

#[tokio::test]
async fn test_register_duplicate_username() {
    let app = TestApp::new().await;
    app.create_user().await;

    let response = app
        .server()
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "username": "testuser",
            "password": "longenough"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Username already exists");
}

#[tokio::test]
async fn test_register_short_password() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "username": "listener",
            "password": "short"
        }))
        .await;

    response.assert_status_bad_request();
}
