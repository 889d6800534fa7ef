use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is not a valid number: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read once at startup and shared as `web::Data<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mongo_uri: String,
    pub mongo_connect_attempts: u32,
    pub jwt_secret: String,
    pub jwt_expire_hours: i64,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub minecraft_server_key: String,
    pub link_code_ttl_minutes: i64,
    pub cors_origin: String,
    pub sse_heartbeat: Duration,
}

pub const MIN_LINK_CODE_TTL_MINUTES: i64 = 15;
pub const MAX_LINK_CODE_TTL_MINUTES: i64 = 30;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mongo_uri = get("MONGO_URI")
            .or_else(|| get("DATABASE_URL"))
            .ok_or(ConfigError::Missing("MONGO_URI"))?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let minecraft_server_key =
            get("MINECRAFT_SERVER_KEY").ok_or(ConfigError::Missing("MINECRAFT_SERVER_KEY"))?;

        let ttl: i64 = parse_or(get("LINK_CODE_TTL_MINUTES"), "LINK_CODE_TTL_MINUTES", 30)?;
        let heartbeat_secs: u64 = parse_or(get("SSE_HEARTBEAT_SECS"), "SSE_HEARTBEAT_SECS", 30)?;

        Ok(Config {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            mongo_uri,
            mongo_connect_attempts: parse_or(
                get("MONGO_CONNECT_ATTEMPTS"),
                "MONGO_CONNECT_ATTEMPTS",
                12,
            )?,
            jwt_secret,
            jwt_expire_hours: parse_or(get("JWT_EXPIRE_HOURS"), "JWT_EXPIRE_HOURS", 24)?,
            jwt_issuer: get("JWT_ISSUER").unwrap_or_else(|| "bizzylink".to_string()),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| "bizzylink-web".to_string()),
            minecraft_server_key,
            link_code_ttl_minutes: ttl.clamp(MIN_LINK_CODE_TTL_MINUTES, MAX_LINK_CODE_TTL_MINUTES),
            cors_origin: get("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),
            sse_heartbeat: Duration::from_secs(heartbeat_secs.max(1)),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 8080,
        mongo_uri: "mongodb://localhost:27017/bizzylink_test".into(),
        mongo_connect_attempts: 1,
        jwt_secret: "test-secret".into(),
        jwt_expire_hours: 24,
        jwt_issuer: "bizzylink".into(),
        jwt_audience: "bizzylink-web".into(),
        minecraft_server_key: "server-key".into(),
        link_code_ttl_minutes: 30,
        cors_origin: "http://localhost:3000".into(),
        sse_heartbeat: Duration::from_secs(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("MONGO_URI", "mongodb://localhost/bizzylink"),
        ("JWT_SECRET", "secret"),
        ("MINECRAFT_SERVER_KEY", "key"),
    ];

    #[test]
    fn defaults_are_applied() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.link_code_ttl_minutes, 30);
        assert_eq!(config.mongo_connect_attempts, 12);
        assert_eq!(config.sse_heartbeat, Duration::from_secs(30));
        assert_eq!(config.jwt_audience, "bizzylink-web");
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = Config::from_lookup(lookup(&[
            ("MONGO_URI", "mongodb://localhost/bizzylink"),
            ("MINECRAFT_SERVER_KEY", "key"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn database_url_is_accepted_as_fallback() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "mongodb://db/other"),
            ("JWT_SECRET", "secret"),
            ("MINECRAFT_SERVER_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(config.mongo_uri, "mongodb://db/other");
    }

    #[test]
    fn link_code_ttl_is_clamped() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("LINK_CODE_TTL_MINUTES", "5"));
        assert_eq!(Config::from_lookup(lookup(&pairs)).unwrap().link_code_ttl_minutes, 15);

        pairs.pop();
        pairs.push(("LINK_CODE_TTL_MINUTES", "120"));
        assert_eq!(Config::from_lookup(lookup(&pairs)).unwrap().link_code_ttl_minutes, 30);
    }

    #[test]
    fn bad_port_is_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
