use chrono::Utc;
use service_core::error::AppError;
use sqlx::SqliteConnection;

use crate::models::Group;

pub async fn insert(conn: &mut SqliteConnection, name: &str) -> Result<Group, AppError> {
    let id = sqlx::query("INSERT INTO access_groups (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    get(conn, id).await
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Group, AppError> {
    sqlx::query_as::<_, Group>("SELECT * FROM access_groups WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("group"))
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Group>, AppError> {
    Ok(
        sqlx::query_as::<_, Group>("SELECT * FROM access_groups ORDER BY name")
            .fetch_all(conn)
            .await?,
    )
}

pub async fn add_member(
    conn: &mut SqliteConnection,
    group_id: i64,
    identity_id: i64,
) -> Result<(), AppError> {
    sqlx::query("INSERT OR IGNORE INTO identity_groups (identity_id, group_id) VALUES (?, ?)")
        .bind(identity_id)
        .bind(group_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn remove_member(
    conn: &mut SqliteConnection,
    group_id: i64,
    identity_id: i64,
) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM identity_groups WHERE identity_id = ? AND group_id = ?")
        .bind(identity_id)
        .bind(group_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn member_ids(conn: &mut SqliteConnection, group_id: i64) -> Result<Vec<i64>, AppError> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT identity_id FROM identity_groups WHERE group_id = ? ORDER BY identity_id")
            .bind(group_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
