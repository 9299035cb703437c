use service_core::config::{self as core_config, get_env, parse_env};
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Base url of the registry, used to fetch its JWKS.
    pub registry_url: String,
    pub ca_cert_path: PathBuf,
    pub ca_key_path: PathBuf,
    /// Hosts provisioned into the certificate cache at boot.
    pub hostnames: Vec<String>,
    /// Backend that receives verified, impersonated requests.
    pub upstream_url: String,
    pub jwks_cache_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
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

/// Split a comma-separated host list, dropping blanks.
pub fn parse_hostnames(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

impl ConnectorConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = ConnectorConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("connector-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
            registry_url: get_env(
                "REGISTRY_URL",
                if is_prod { None } else { Some("http://localhost:8080") },
                is_prod,
            )?,
            ca_cert_path: PathBuf::from(get_env("CA_CERT_PATH", None, is_prod)?),
            ca_key_path: PathBuf::from(get_env("CA_KEY_PATH", None, is_prod)?),
            hostnames: parse_hostnames(&get_env("CONNECTOR_HOSTNAMES", Some(""), is_prod)?),
            upstream_url: get_env("UPSTREAM_URL", None, is_prod)?,
            jwks_cache_seconds: parse_env(
                "JWKS_CACHE_SECONDS",
                &get_env("JWKS_CACHE_SECONDS", Some("300"), is_prod)?,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (key, url) in [("REGISTRY_URL", &self.registry_url), ("UPSTREAM_URL", &self.upstream_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be an http(s) url",
                    key
                )));
            }
        }
        if self.jwks_cache_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWKS_CACHE_SECONDS must be positive"
            )));
        }
        Ok(())
    }

    pub fn jwks_url(&self) -> String {
        format!(
            "{}/.well-known/jwks.json",
            self.registry_url.trim_end_matches('/')
        )
    }

    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectorConfig {
        ConnectorConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "connector-service".to_string(),
            service_version: "0.1.0".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            registry_url: "http://registry:8080/".to_string(),
            ca_cert_path: PathBuf::from("ca.pem"),
            ca_key_path: PathBuf::from("ca-key.pem"),
            hostnames: vec![],
            upstream_url: "https://kubernetes.default.svc".to_string(),
            jwks_cache_seconds: 300,
        }
    }

    #[test]
    fn hostnames_are_trimmed_and_lowercased() {
        assert_eq!(
            parse_hostnames(" Cluster.Local, ,api.internal,"),
            vec!["cluster.local".to_string(), "api.internal".to_string()]
        );
        assert!(parse_hostnames("").is_empty());
    }

    #[test]
    fn jwks_url_joins_registry_url() {
        assert_eq!(
            sample().jwks_url(),
            "http://registry:8080/.well-known/jwks.json"
        );
    }

    #[test]
    fn validate_rejects_bad_urls_and_zero_ttl() {
        assert!(sample().validate().is_ok());

        let mut config = sample();
        config.upstream_url = "kubernetes".to_string();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.jwks_cache_seconds = 0;
        assert!(config.validate().is_err());
    }
}
