use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::SqliteConnection;

use crate::models::AccessKey;

/// Columns of a key about to be stored. The raw secret is not among them.
#[derive(Debug, Clone)]
pub struct NewAccessKey<'a> {
    pub key_id: &'a str,
    pub secret_hash: &'a [u8],
    pub name: &'a str,
    pub issued_for: i64,
    pub scopes: &'a str,
    pub expires_at: DateTime<Utc>,
    pub extension_deadline: Option<DateTime<Utc>>,
    pub extension_seconds: Option<i64>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    key: &NewAccessKey<'_>,
) -> Result<AccessKey, AppError> {
    let id = sqlx::query(
        r#"
        INSERT INTO access_keys
            (key_id, secret_hash, name, issued_for, scopes, expires_at,
             extension_deadline, extension_seconds, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(key.key_id)
    .bind(key.secret_hash)
    .bind(key.name)
    .bind(key.issued_for)
    .bind(key.scopes)
    .bind(key.expires_at)
    .bind(key.extension_deadline)
    .bind(key.extension_seconds)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    get(conn, id).await
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<AccessKey, AppError> {
    sqlx::query_as::<_, AccessKey>("SELECT * FROM access_keys WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("access key"))
}

pub async fn find_by_key_id(
    conn: &mut SqliteConnection,
    key_id: &str,
) -> Result<Option<AccessKey>, AppError> {
    Ok(
        sqlx::query_as::<_, AccessKey>("SELECT * FROM access_keys WHERE key_id = ?")
            .bind(key_id)
            .fetch_optional(conn)
            .await?,
    )
}

/// Keys owned by `issued_for`, or every key when `None`.
pub async fn list(
    conn: &mut SqliteConnection,
    issued_for: Option<i64>,
) -> Result<Vec<AccessKey>, AppError> {
    let keys = match issued_for {
        Some(owner) => {
            sqlx::query_as::<_, AccessKey>(
                "SELECT * FROM access_keys WHERE issued_for = ? ORDER BY id",
            )
            .bind(owner)
            .fetch_all(conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, AccessKey>("SELECT * FROM access_keys ORDER BY id")
                .fetch_all(conn)
                .await?
        }
    };
    Ok(keys)
}

pub async fn update_scopes(
    conn: &mut SqliteConnection,
    id: i64,
    scopes: &str,
) -> Result<(), AppError> {
    sqlx::query("UPDATE access_keys SET scopes = ? WHERE id = ?")
        .bind(scopes)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_extension_deadline(
    conn: &mut SqliteConnection,
    id: i64,
    deadline: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query("UPDATE access_keys SET extension_deadline = ? WHERE id = ?")
        .bind(deadline)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM access_keys WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("access key"));
    }
    Ok(())
}

/// Remove every key issued for the identity in one statement.
pub async fn delete_all_for(conn: &mut SqliteConnection, issued_for: i64) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM access_keys WHERE issued_for = ?")
        .bind(issued_for)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
