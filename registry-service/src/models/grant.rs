//! Grant model - (subject, resource, privilege) tuples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Grant subject, stored as `i:<id>` for identities and `g:<id>` for groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Identity(i64),
    Group(i64),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Identity(id) => write!(f, "i:{}", id),
            Subject::Group(id) => write!(f, "g:{}", id),
        }
    }
}

impl std::str::FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid subject: {}", s))?;
        let id: i64 = id.parse().map_err(|_| format!("invalid subject: {}", s))?;
        match kind {
            "i" => Ok(Subject::Identity(id)),
            "g" => Ok(Subject::Group(id)),
            _ => Err(format!("invalid subject: {}", s)),
        }
    }
}

impl Serialize for Subject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Subject {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Grant entity. Immutable once created; deletion is the only mutation.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Grant {
    pub id: i64,
    pub subject: String,
    pub resource: String,
    pub privilege: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    pub fn subject(&self) -> Option<Subject> {
        self.subject.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
    pub id: i64,
    pub subject: String,
    pub resource: String,
    pub privilege: String,
    pub created_by: Option<i64>,
    pub created: DateTime<Utc>,
}

impl From<Grant> for GrantResponse {
    fn from(g: Grant) -> Self {
        Self {
            id: g.id,
            subject: g.subject,
            resource: g.resource,
            privilege: g.privilege,
            created_by: g.created_by,
            created: g.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_round_trips_through_text() {
        assert_eq!("i:42".parse::<Subject>(), Ok(Subject::Identity(42)));
        assert_eq!("g:7".parse::<Subject>(), Ok(Subject::Group(7)));
        assert_eq!(Subject::Group(7).to_string(), "g:7");
    }

    #[test]
    fn malformed_subjects_are_rejected() {
        assert!("42".parse::<Subject>().is_err());
        assert!("x:1".parse::<Subject>().is_err());
        assert!("i:abc".parse::<Subject>().is_err());
    }
}
