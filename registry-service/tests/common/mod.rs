//! Shared harness: an in-memory registry with setup already completed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use registry_service::{
    build_router,
    config::{DatabaseConfig, EncryptionConfig, Environment, RegistryConfig, SessionConfig},
    db::Database,
    models::{Identity, IdentityKind, PasswordPolicy},
    services::{
        access_keys::{self, CreateAccessKey},
        context::{authenticate, RequestContext},
        identities,
        settings::init_settings,
        setup, DataKey,
    },
    AppState,
};
use std::path::PathBuf;
use tower::util::ServiceExt;

pub fn test_config(policy: PasswordPolicy, bad_passwords_file: Option<PathBuf>) -> RegistryConfig {
    RegistryConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "registry-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        encryption: EncryptionConfig {
            root_key_id: "dbkey.root".to_string(),
            provider: "native".to_string(),
            key_directory: std::env::temp_dir(),
        },
        bad_passwords_file,
        session: SessionConfig {
            duration_hours: 24,
            extension_hours: 1,
        },
        token_expiry_minutes: 5,
        password_policy: policy,
    }
}

pub fn default_policy() -> PasswordPolicy {
    PasswordPolicy {
        length_min: 8,
        lowercase_min: 0,
        uppercase_min: 1,
        number_min: 1,
        symbol_min: 0,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub admin_key: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(default_policy(), None).await
    }

    pub async fn spawn_with(policy: PasswordPolicy, bad_passwords_file: Option<PathBuf>) -> Self {
        let state = Self::spawn_without_setup(policy, bad_passwords_file).await;
        let response = setup::setup(&RequestContext::anonymous(state.db.clone()))
            .await
            .expect("setup");

        Self {
            router: build_router(state.clone()),
            state,
            admin_key: response.access_key,
        }
    }

    /// State with settings initialised but setup not yet run.
    pub async fn spawn_without_setup(
        policy: PasswordPolicy,
        bad_passwords_file: Option<PathBuf>,
    ) -> AppState {
        let config = test_config(policy, bad_passwords_file);
        let db = Database::connect(&config.database).await.expect("connect");
        db.run_migrations().await.expect("migrations");

        let data_key = DataKey::generate();
        init_settings(&db, &data_key, &config.password_policy)
            .await
            .expect("settings");

        AppState::new(config, db, data_key)
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn anonymous(&self) -> RequestContext {
        RequestContext::anonymous(self.state.db.clone())
    }

    /// Context authenticated by `raw_key`, as the middleware would build it.
    pub async fn ctx(&self, raw_key: &str) -> RequestContext {
        let principal = authenticate(&self.state.db, raw_key)
            .await
            .expect("authenticate");
        RequestContext::authenticated(self.state.db.clone(), principal)
    }

    pub async fn admin(&self) -> RequestContext {
        self.ctx(&self.admin_key).await
    }

    /// Create a user through the admin API. Returns it and its one-time password.
    pub async fn create_user(&self, name: &str) -> (Identity, String) {
        let created = identities::create_identity(
            &self.admin().await,
            name,
            IdentityKind::User,
        )
        .await
        .expect("create user");
        let password = created.one_time_password.expect("one-time password");
        (created.identity, password)
    }

    /// Issue a key for `identity_id` directly, bypassing authorization.
    pub async fn issue_key(&self, identity_id: i64, scopes: &[&str]) -> String {
        self.issue_key_with(CreateAccessKey {
            issued_for: identity_id,
            ttl: Some(Duration::hours(1)),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
        .await
    }

    pub async fn issue_key_with(&self, req: CreateAccessKey) -> String {
        let mut tx = self.state.db.begin().await.expect("begin");
        let issued = access_keys::issue(&mut tx, &req).await.expect("issue key");
        tx.commit().await.expect("commit");
        issued.raw
    }

    /// Send a request through the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}
