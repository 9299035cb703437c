use serde::Deserialize;
use service_core::config::{self as core_config, get_env, parse_env};
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;

use crate::models::PasswordPolicy;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub encryption: EncryptionConfig,
    pub bad_passwords_file: Option<PathBuf>,
    pub session: SessionConfig,
    pub token_expiry_minutes: i64,
    /// Applied when settings are first created.
    pub password_policy: PasswordPolicy,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    /// Root key used to wrap the database data key.
    pub root_key_id: String,
    pub provider: String,
    /// Where the native provider keeps root key files.
    pub key_directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub duration_hours: i64,
    pub extension_hours: i64,
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let optional = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        let config = RegistryConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("registry-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: optional("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    if is_prod { None } else { Some("sqlite://registry.db") },
                    is_prod,
                )?,
                max_connections: parse_env(
                    "DATABASE_MAX_CONNECTIONS",
                    &get_env("DATABASE_MAX_CONNECTIONS", Some("5"), is_prod)?,
                )?,
            },
            encryption: EncryptionConfig {
                root_key_id: get_env("DB_ENCRYPTION_KEY", Some("dbkey.root"), is_prod)?,
                provider: get_env("DB_ENCRYPTION_KEY_PROVIDER", Some("native"), is_prod)?,
                key_directory: PathBuf::from(get_env(
                    "KEY_DIRECTORY",
                    if is_prod { None } else { Some("./keys") },
                    is_prod,
                )?),
            },
            bad_passwords_file: optional("BAD_PASSWORDS_FILE").map(PathBuf::from),
            session: SessionConfig {
                duration_hours: parse_env(
                    "SESSION_DURATION_HOURS",
                    &get_env("SESSION_DURATION_HOURS", Some("720"), is_prod)?,
                )?,
                extension_hours: parse_env(
                    "SESSION_EXTENSION_HOURS",
                    &get_env("SESSION_EXTENSION_HOURS", Some("12"), is_prod)?,
                )?,
            },
            token_expiry_minutes: parse_env(
                "TOKEN_EXPIRY_MINUTES",
                &get_env("TOKEN_EXPIRY_MINUTES", Some("5"), is_prod)?,
            )?,
            password_policy: PasswordPolicy {
                length_min: parse_env(
                    "PASSWORD_MIN_LENGTH",
                    &get_env("PASSWORD_MIN_LENGTH", Some("8"), is_prod)?,
                )?,
                lowercase_min: parse_env(
                    "PASSWORD_MIN_LOWERCASE",
                    &get_env("PASSWORD_MIN_LOWERCASE", Some("0"), is_prod)?,
                )?,
                uppercase_min: parse_env(
                    "PASSWORD_MIN_UPPERCASE",
                    &get_env("PASSWORD_MIN_UPPERCASE", Some("0"), is_prod)?,
                )?,
                number_min: parse_env(
                    "PASSWORD_MIN_NUMBER",
                    &get_env("PASSWORD_MIN_NUMBER", Some("0"), is_prod)?,
                )?,
                symbol_min: parse_env(
                    "PASSWORD_MIN_SYMBOL",
                    &get_env("PASSWORD_MIN_SYMBOL", Some("0"), is_prod)?,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.encryption.provider != "native" {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "unsupported DB_ENCRYPTION_KEY_PROVIDER: {}",
                self.encryption.provider
            )));
        }
        if self.session.duration_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_DURATION_HOURS must be positive"
            )));
        }
        if self.session.extension_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_EXTENSION_HOURS must be positive"
            )));
        }
        if self.token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be at least 1"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistryConfig {
        RegistryConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "registry-service".to_string(),
            service_version: "0.1.0".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            encryption: EncryptionConfig {
                root_key_id: "dbkey.root".to_string(),
                provider: "native".to_string(),
                key_directory: PathBuf::from("/tmp"),
            },
            bad_passwords_file: None,
            session: SessionConfig {
                duration_hours: 1,
                extension_hours: 1,
            },
            token_expiry_minutes: 5,
            password_policy: PasswordPolicy::default(),
        }
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Prod));
        assert_eq!("DEV".parse::<Environment>(), Ok(Environment::Dev));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn validate_rejects_unknown_provider() {
        let mut config = sample();
        assert!(config.validate().is_ok());
        config.encryption.provider = "vault".to_string();
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn validate_rejects_non_positive_durations() {
        let mut config = sample();
        config.session.duration_hours = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.token_expiry_minutes = -1;
        assert!(config.validate().is_err());
    }
}
