use chrono::Utc;
use service_core::error::AppError;
use sqlx::SqliteConnection;

use crate::models::{Identity, IdentityKind};

pub async fn insert(
    conn: &mut SqliteConnection,
    name: &str,
    kind: IdentityKind,
    permissions: &str,
) -> Result<Identity, AppError> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO identities (name, kind, permissions, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(kind.as_str())
    .bind(permissions)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    get(conn, id).await
}

/// Live identity by id.
pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Identity, AppError> {
    find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("identity"))
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Identity>, AppError> {
    Ok(sqlx::query_as::<_, Identity>(
        "SELECT * FROM identities WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?)
}

pub async fn find_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Identity>, AppError> {
    Ok(sqlx::query_as::<_, Identity>(
        "SELECT * FROM identities WHERE name = ? AND deleted_at IS NULL",
    )
    .bind(name)
    .fetch_optional(conn)
    .await?)
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Identity>, AppError> {
    Ok(
        sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(conn)
        .await?,
    )
}

/// Mark the identity removed and drop everything that authenticates or
/// authorizes it.
pub async fn soft_delete(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE identities SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("identity"));
    }

    sqlx::query("DELETE FROM access_keys WHERE issued_for = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM credentials WHERE identity_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM grants WHERE subject = ?")
        .bind(format!("i:{}", id))
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM identity_groups WHERE identity_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM provider_tokens WHERE identity_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Names of every group the identity belongs to.
pub async fn group_names(conn: &mut SqliteConnection, id: i64) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT g.name FROM access_groups g
        JOIN identity_groups ig ON ig.group_id = g.id
        WHERE ig.identity_id = ?
        ORDER BY g.name
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}
