use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets shipped in sample env files; refused at startup.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// `None` means any origin is allowed.
    pub cors_origins: Option<Vec<String>>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("TETHER_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .context("TETHER_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TETHER_JWT_SECRET is still a placeholder value; generate a real secret");
        }

        let port = match lookup("TETHER_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("TETHER_PORT is not a valid port: {raw}"))?,
            None => 3000,
        };

        let cors_origins = lookup("TETHER_CORS_ORIGINS").map(|raw| {
            raw.split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect()
        });

        Ok(Self {
            jwt_secret,
            db_path: lookup("TETHER_DB_PATH")
                .unwrap_or_else(|| "tether.db".into())
                .into(),
            host: lookup("TETHER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cors_origins,
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = config(&[("TETHER_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("tether.db"));
        assert_eq!(cfg.port, 3000);
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.bind_addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn secret_is_required_and_placeholders_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("TETHER_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("TETHER_JWT_SECRET", "change-me-to-a-random-string")]).is_err());
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let cfg = config(&[
            ("TETHER_JWT_SECRET", "s3cr3t"),
            ("TETHER_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ])
        .unwrap();
        assert_eq!(
            cfg.cors_origins.unwrap(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("TETHER_JWT_SECRET", "s3cr3t"), ("TETHER_PORT", "http")]).is_err());
    }
}
