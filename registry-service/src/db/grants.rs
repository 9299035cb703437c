use chrono::Utc;
use service_core::error::AppError;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::models::{Grant, Subject};

/// Optional equality filters for listing grants.
#[derive(Debug, Clone, Default)]
pub struct GrantFilter {
    pub subject: Option<Subject>,
    pub resource: Option<String>,
    pub privilege: Option<String>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    subject: Subject,
    resource: &str,
    privilege: &str,
    created_by: Option<i64>,
) -> Result<Grant, AppError> {
    let id = sqlx::query(
        r#"
        INSERT INTO grants (subject, resource, privilege, created_by, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(subject.to_string())
    .bind(resource)
    .bind(privilege)
    .bind(created_by)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    get(conn, id).await
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Grant, AppError> {
    sqlx::query_as::<_, Grant>("SELECT * FROM grants WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("grant"))
}

/// First grant matching the exact triple, if any.
pub async fn find_exact(
    conn: &mut SqliteConnection,
    subject: Subject,
    resource: &str,
    privilege: &str,
) -> Result<Option<Grant>, AppError> {
    Ok(sqlx::query_as::<_, Grant>(
        "SELECT * FROM grants WHERE subject = ? AND resource = ? AND privilege = ? ORDER BY id LIMIT 1",
    )
    .bind(subject.to_string())
    .bind(resource)
    .bind(privilege)
    .fetch_optional(conn)
    .await?)
}

pub async fn list(conn: &mut SqliteConnection, filter: &GrantFilter) -> Result<Vec<Grant>, AppError> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM grants WHERE 1 = 1");
    if let Some(subject) = filter.subject {
        query.push(" AND subject = ").push_bind(subject.to_string());
    }
    if let Some(resource) = &filter.resource {
        query.push(" AND resource = ").push_bind(resource.clone());
    }
    if let Some(privilege) = &filter.privilege {
        query.push(" AND privilege = ").push_bind(privilege.clone());
    }
    query.push(" ORDER BY id");

    Ok(query.build_query_as::<Grant>().fetch_all(conn).await?)
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM grants WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("grant"));
    }
    Ok(())
}

/// Privileges on `resource` held by the identity directly or through any
/// group it currently belongs to. Membership is read on every call.
pub async fn effective_privileges(
    conn: &mut SqliteConnection,
    identity_id: i64,
    resource: &str,
) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT privilege FROM grants
        WHERE resource = ?
          AND (subject = ?
               OR subject IN (SELECT 'g:' || group_id FROM identity_groups WHERE identity_id = ?))
        "#,
    )
    .bind(resource)
    .bind(Subject::Identity(identity_id).to_string())
    .bind(identity_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(p,)| p).collect())
}
