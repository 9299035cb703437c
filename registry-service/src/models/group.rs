use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::Subject;

/// A named set of identities. Groups are grant subjects in their own right.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn subject(&self) -> Subject {
        Subject::Group(self.id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
}

impl From<Group> for GroupResponse {
    fn from(g: Group) -> Self {
        Self {
            id: g.id,
            name: g.name,
            created: g.created_at,
        }
    }
}
