//! Integration tests for access key lifecycle and authentication.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::TestApp;
use registry_service::{
    db,
    services::{
        access_keys::{self, CreateAccessKey},
        context::authenticate,
    },
};
use serde_json::json;
use service_core::error::AppError;

fn key_id(raw: &str) -> &str {
    raw.split('.').next().unwrap()
}

async fn set_column(app: &TestApp, raw: &str, column: &str, value: chrono::DateTime<Utc>) {
    sqlx::query(&format!("UPDATE access_keys SET {} = ? WHERE key_id = ?", column))
        .bind(value)
        .bind(key_id(raw))
        .execute(app.db().pool())
        .await
        .unwrap();
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_fresh_key_authenticates() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app.issue_key(user.id, &[]).await;

    let principal = authenticate(app.db(), &raw).await.unwrap();
    assert_eq!(principal.identity_id(), user.id);
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app.issue_key(user.id, &[]).await;
    let forged = format!("{}.{}", key_id(&raw), "x".repeat(24));

    let err = authenticate(app.db(), &forged).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let (status, body) = app
        .request(Method::GET, "/api/identities/self", Some(&forged), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid access key");
}

#[tokio::test]
async fn test_expired_key_looks_like_unknown_key() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app.issue_key(user.id, &[]).await;
    set_column(&app, &raw, "expires_at", Utc::now() - Duration::seconds(1)).await;

    let (status, body) = app
        .request(Method::GET, "/api/identities/self", Some(&raw), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid access key");
}

#[tokio::test]
async fn test_missed_extension_deadline_rejects_key() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app
        .issue_key_with(CreateAccessKey {
            issued_for: user.id,
            ttl: Some(Duration::hours(2)),
            extension: Some(Duration::minutes(10)),
            ..Default::default()
        })
        .await;
    set_column(&app, &raw, "extension_deadline", Utc::now() - Duration::seconds(1)).await;

    let err = authenticate(app.db(), &raw).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn test_use_pushes_extension_deadline_but_not_past_expiry() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app
        .issue_key_with(CreateAccessKey {
            issued_for: user.id,
            ttl: Some(Duration::minutes(30)),
            extension: Some(Duration::hours(1)),
            ..Default::default()
        })
        .await;

    let near = Utc::now() + Duration::minutes(1);
    set_column(&app, &raw, "extension_deadline", near).await;

    let principal = authenticate(app.db(), &raw).await.unwrap();
    let key = principal.access_key.unwrap();
    let deadline = key.extension_deadline.unwrap();
    assert!(deadline > near);
    assert_eq!(deadline, key.expires_at);
}

#[tokio::test]
async fn test_oversized_extension_still_authenticates() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app
        .issue_key_with(CreateAccessKey {
            issued_for: user.id,
            ttl: Some(Duration::hours(1)),
            extension: Some(Duration::seconds(9_000_000_000_000_000)),
            ..Default::default()
        })
        .await;

    for _ in 0..2 {
        let principal = authenticate(app.db(), &raw).await.unwrap();
        let key = principal.access_key.unwrap();
        assert_eq!(key.extension_deadline, Some(key.expires_at));
    }
}

#[tokio::test]
async fn test_key_of_deleted_identity_is_rejected() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app.issue_key(user.id, &[]).await;

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/identities/{}", user.id),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(authenticate(app.db(), &raw).await.is_err());
}

// ============================================================================
// Management
// ============================================================================

#[tokio::test]
async fn test_create_key_over_http_returns_secret_once() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app.issue_key(user.id, &[]).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/access-keys",
            Some(&raw),
            Some(json!({ "name": "laptop", "ttlSeconds": 3600 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "laptop");
    assert_eq!(body["issuedFor"], user.id);
    let new_key = body["accessKey"].as_str().unwrap().to_string();
    assert!(authenticate(app.db(), &new_key).await.is_ok());

    let (status, body) = app
        .request(Method::GET, "/api/access-keys", Some(&raw), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|k| k.get("accessKey").is_none()));
}

#[tokio::test]
async fn test_out_of_range_durations_are_rejected() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app.issue_key(user.id, &[]).await;

    for body in [
        json!({ "ttlSeconds": i64::MAX }),
        json!({ "ttlSeconds": 3600, "extensionSeconds": 9_000_000_000_000_000i64 }),
        json!({ "ttlSeconds": 0 }),
    ] {
        let (status, body) = app
            .request(Method::POST, "/api/access-keys", Some(&raw), Some(body))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);
    }

    assert!(authenticate(app.db(), &raw).await.is_ok());
}

#[tokio::test]
async fn test_user_cannot_manage_other_users_keys() {
    let app = TestApp::spawn().await;
    let (alice, _) = app.create_user("alice").await;
    let (bob, _) = app.create_user("bob").await;
    let alice_key = app.issue_key(alice.id, &[]).await;
    app.issue_key(bob.id, &[]).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/access-keys",
            Some(&alice_key),
            Some(json!({ "identityId": bob.id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::GET,
            &format!("/api/access-keys?identityId={}", bob.id),
            Some(&alice_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, "/api/access-keys?all=true", Some(&alice_key), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_everyone_and_hides_expired() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let raw = app.issue_key(user.id, &[]).await;
    set_column(&app, &raw, "expires_at", Utc::now() - Duration::seconds(1)).await;

    let admin = app.admin().await;
    let live = access_keys::list_access_keys(&admin, None, false).await.unwrap();
    assert!(live.iter().all(|k| k.issued_for != user.id));

    let all = access_keys::list_access_keys(&admin, None, true).await.unwrap();
    assert!(all.iter().any(|k| k.issued_for == user.id));
}

#[tokio::test]
async fn test_delete_key() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let keep = app.issue_key(user.id, &[]).await;
    let doomed = app.issue_key(user.id, &[]).await;

    let id = {
        let mut conn = app.db().pool().acquire().await.unwrap();
        db::access_keys::find_by_key_id(&mut conn, key_id(&doomed))
            .await
            .unwrap()
            .unwrap()
            .id
    };

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/access-keys/{}", id),
            Some(&keep),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(authenticate(app.db(), &doomed).await.is_err());
    assert!(authenticate(app.db(), &keep).await.is_ok());
}

#[tokio::test]
async fn test_logout_revokes_every_key() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;
    let first = app.issue_key(user.id, &[]).await;
    let second = app.issue_key(user.id, &[]).await;

    let (status, body) = app
        .request(Method::POST, "/api/logout", Some(&first), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    assert!(authenticate(app.db(), &first).await.is_err());
    assert!(authenticate(app.db(), &second).await.is_err());
    assert!(authenticate(app.db(), &app.admin_key).await.is_ok());
}

#[tokio::test]
async fn test_anonymous_cannot_create_keys() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .request(Method::POST, "/api/access-keys", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
