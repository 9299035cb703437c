//! Password shape rules and the common-password deny-list.

use service_core::error::{AppError, FieldErrors};
use std::path::{Path, PathBuf};

use crate::models::PasswordPolicy;

pub const PASSWORD_FIELD: &str = "password";

/// Printable ASCII punctuation, including space.
pub fn is_symbol(c: char) -> bool {
    matches!(c, '\u{20}'..='\u{2F}' | '\u{3A}'..='\u{40}' | '\u{5B}'..='\u{60}' | '\u{7B}'..='\u{7E}')
}

fn requirement(min: u32, singular: &str, plural: &str) -> String {
    if min == 1 {
        format!("{} {}", min, singular)
    } else {
        format!("{} {}", min, plural)
    }
}

/// One message per character class that falls short of its minimum.
/// Classes with a zero minimum never appear.
pub fn unmet_requirements(policy: &PasswordPolicy, candidate: &str) -> Vec<String> {
    let count = |pred: fn(char) -> bool| candidate.chars().filter(|c| pred(*c)).count() as u32;

    let checks: [(u32, u32, &str, &str); 5] = [
        (policy.length_min, candidate.chars().count() as u32, "character", "characters"),
        (policy.lowercase_min, count(char::is_lowercase), "lowercase letter", "lowercase letters"),
        (policy.uppercase_min, count(char::is_uppercase), "uppercase letter", "uppercase letters"),
        (policy.number_min, count(|c| c.is_ascii_digit()), "number", "numbers"),
        (policy.symbol_min, count(is_symbol), "symbol", "symbols"),
    ];

    checks
        .iter()
        .filter(|(min, actual, _, _)| *min > 0 && actual < min)
        .map(|(min, _, singular, plural)| requirement(*min, singular, plural))
        .collect()
}

/// Validate `candidate` against the policy, collecting every failure under
/// the `password` field.
pub fn check_password(policy: &PasswordPolicy, candidate: &str) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    for message in unmet_requirements(policy, candidate) {
        errors.add(PASSWORD_FIELD, message);
    }
    errors.into_result()
}

/// Deny-list of widely reused passwords, one per line.
#[derive(Debug, Clone, Default)]
pub struct BadPasswordList {
    path: Option<PathBuf>,
}

impl BadPasswordList {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reject `candidate` when it matches a line verbatim. Without a
    /// configured file the check passes; an unreadable file is an error.
    pub async fn check(&self, candidate: &str) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "failed to read bad password file {}: {}",
                path.display(),
                e
            ))
        })?;

        if contents.lines().any(|line| line == candidate) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "cannot use a common password"
            )));
        }
        Ok(())
    }
}
