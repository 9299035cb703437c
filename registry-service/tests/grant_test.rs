//! Integration tests for grants, groups and role checks.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use registry_service::{
    db,
    models::Subject,
    services::{
        authz::{self, Role},
        grants, identities,
    },
};
use serde_json::json;
use service_core::error::AppError;

async fn holds(app: &TestApp, identity_id: i64, role: Role) -> bool {
    let mut conn = app.db().pool().acquire().await.unwrap();
    let identity = db::identities::get(&mut conn, identity_id).await.unwrap();
    authz::has_role(&mut conn, &identity, role).await.unwrap()
}

// ============================================================================
// Roles
// ============================================================================

#[tokio::test]
async fn test_setup_admin_holds_every_role() {
    let app = TestApp::spawn().await;
    let admin_id = app.admin().await.principal().unwrap().identity_id();

    assert!(holds(&app, admin_id, Role::Admin).await);
    assert!(holds(&app, admin_id, Role::Connector).await);
    assert!(holds(&app, admin_id, Role::View).await);
}

#[tokio::test]
async fn test_view_role_reads_but_does_not_write() {
    let app = TestApp::spawn().await;
    let (viewer, _) = app.create_user("viewer").await;
    let key = app.issue_key(viewer.id, &[]).await;

    let (status, _) = app
        .request(Method::GET, "/api/identities", Some(&key), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    grants::create_grant(
        &app.admin().await,
        Subject::Identity(viewer.id),
        "infra",
        "view",
    )
    .await
    .unwrap();

    let (status, body) = app
        .request(Method::GET, "/api/identities", Some(&key), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().len() >= 2);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/identities",
            Some(&key),
            Some(json!({ "name": "mallory", "kind": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_connector_role_does_not_imply_view() {
    let app = TestApp::spawn().await;
    let (machine, _) = app.create_user("connector").await;
    grants::create_grant(
        &app.admin().await,
        Subject::Identity(machine.id),
        "infra",
        "connector",
    )
    .await
    .unwrap();

    assert!(holds(&app, machine.id, Role::Connector).await);
    assert!(!holds(&app, machine.id, Role::View).await);
    assert!(!holds(&app, machine.id, Role::Admin).await);
}

// ============================================================================
// Groups
// ============================================================================

#[tokio::test]
async fn test_group_grant_follows_membership() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let (user, _) = app.create_user("alice").await;

    let group = identities::create_group(&admin, "operators").await.unwrap();
    grants::create_grant(&admin, Subject::Group(group.id), "infra", "admin")
        .await
        .unwrap();
    assert!(!holds(&app, user.id, Role::Admin).await);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/groups/{}/members/{}", group.id, user.id),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(holds(&app, user.id, Role::Admin).await);
    assert!(holds(&app, user.id, Role::View).await);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/groups/{}/members/{}", group.id, user.id),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!holds(&app, user.id, Role::Admin).await);
}

#[tokio::test]
async fn test_removing_absent_member_is_not_found() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let (user, _) = app.create_user("alice").await;
    let group = identities::create_group(&admin, "operators").await.unwrap();

    let err = identities::remove_member(&admin, group.id, user.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Grant management
// ============================================================================

#[tokio::test]
async fn test_duplicate_grant_returns_existing() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;

    let body = json!({ "subject": format!("i:{}", user.id), "resource": "infra", "privilege": "view" });
    let (status, first) = app
        .request(Method::POST, "/api/grants", Some(&app.admin_key), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, second) = app
        .request(Method::POST, "/api/grants", Some(&app.admin_key), Some(body))
        .await;
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn test_unknown_infra_privilege_is_rejected() {
    let app = TestApp::spawn().await;
    let (user, _) = app.create_user("alice").await;

    let err = grants::create_grant(
        &app.admin().await,
        Subject::Identity(user.id),
        "infra",
        "superuser",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_grant_for_missing_subject_is_not_found() {
    let app = TestApp::spawn().await;

    let err = grants::create_grant(&app.admin().await, Subject::Identity(9999), "infra", "view")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_user_lists_own_grants_only() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let (alice, _) = app.create_user("alice").await;
    let (bob, _) = app.create_user("bob").await;
    grants::create_grant(&admin, Subject::Identity(alice.id), "infra", "connector")
        .await
        .unwrap();
    let key = app.issue_key(alice.id, &[]).await;

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/grants?subject=i:{}", alice.id),
            Some(&key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["privilege"], "connector");

    let (status, _) = app
        .request(
            Method::GET,
            &format!("/api/grants?subject=i:{}", bob.id),
            Some(&key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deleted_grant_revokes_role() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let (user, _) = app.create_user("alice").await;
    let grant = grants::create_grant(&admin, Subject::Identity(user.id), "infra", "view")
        .await
        .unwrap();
    assert!(holds(&app, user.id, Role::View).await);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/grants/{}", grant.id),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!holds(&app, user.id, Role::View).await);
}
