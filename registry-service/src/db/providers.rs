use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::SqliteConnection;

use crate::models::{Provider, ProviderToken};

pub async fn insert(
    conn: &mut SqliteConnection,
    name: &str,
    url: &str,
    client_id: &str,
    sealed_client_secret: &str,
) -> Result<Provider, AppError> {
    let id = sqlx::query(
        r#"
        INSERT INTO providers (name, url, client_id, client_secret, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(url)
    .bind(client_id)
    .bind(sealed_client_secret)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    get(conn, id).await
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Provider, AppError> {
    sqlx::query_as::<_, Provider>("SELECT * FROM providers WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("provider"))
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Provider>, AppError> {
    Ok(sqlx::query_as::<_, Provider>("SELECT * FROM providers ORDER BY name")
        .fetch_all(conn)
        .await?)
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM provider_tokens WHERE provider_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("DELETE FROM providers WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("provider"));
    }
    Ok(())
}

/// Insert or replace the token material an identity holds for a provider.
pub async fn upsert_token(
    conn: &mut SqliteConnection,
    identity_id: i64,
    provider_id: i64,
    sealed_access_token: &str,
    sealed_refresh_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO provider_tokens (identity_id, provider_id, access_token, refresh_token, expires_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (identity_id, provider_id) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(identity_id)
    .bind(provider_id)
    .bind(sealed_access_token)
    .bind(sealed_refresh_token)
    .bind(expires_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_token(
    conn: &mut SqliteConnection,
    identity_id: i64,
    provider_id: i64,
) -> Result<Option<ProviderToken>, AppError> {
    Ok(sqlx::query_as::<_, ProviderToken>(
        "SELECT * FROM provider_tokens WHERE identity_id = ? AND provider_id = ?",
    )
    .bind(identity_id)
    .bind(provider_id)
    .fetch_optional(conn)
    .await?)
}
