//! Configuration loader and validator for the post URL repair job.
//!
//! Values come from built-in defaults, an optional YAML file, and the process
//! environment, in increasing precedence. The result is built once at startup
//! and handed to the pipelines by reference.
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub database: Database,
    pub search: Search,
    pub repair: Repair,
}

/// Relational store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Database {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub query_timeout_seconds: u64,
}

/// Search index connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Search {
    pub host: String,
    pub username: String,
    pub password: String,
    pub post_index: String,
    pub author_index: String,
    pub accept_invalid_certs: bool,
}

/// Batch behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Repair {
    pub chunk_size: i64,
    pub publisher: String,
    pub run_deadline_seconds: u64,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            name: String::new(),
            query_timeout_seconds: 10,
        }
    }
}

impl Default for Search {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            post_index: String::new(),
            author_index: "one-author-index".into(),
            accept_invalid_certs: false,
        }
    }
}

impl Default for Repair {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            publisher: "popmama".into(),
            run_deadline_seconds: 30,
        }
    }
}

impl Database {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(PgSslMode::Disable)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

impl Repair {
    /// Whole-run limit, or `None` when disabled.
    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run_deadline_seconds > 0).then(|| Duration::from_secs(self.run_deadline_seconds))
    }
}

/// Load configuration: optional YAML file, then `.env`, then the environment.
/// - If `path` is None, starts from defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        }
        None => Config::default(),
    };
    dotenvy::dotenv().ok();
    apply_env(&mut cfg, |key| std::env::var(key).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Overlay environment values onto `cfg`. `lookup` returns the value for a key, if set.
pub fn apply_env<F>(cfg: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let set_str = |target: &mut String, key: &str| {
        if let Some(v) = lookup(key) {
            *target = v;
        }
    };
    set_str(&mut cfg.database.host, "DB_HOST");
    set_str(&mut cfg.database.user, "DB_USERNAME");
    set_str(&mut cfg.database.password, "DB_PASS");
    set_str(&mut cfg.database.name, "DB_NAME");
    set_str(&mut cfg.search.host, "OS_HOST");
    set_str(&mut cfg.search.username, "OS_USERNAME");
    set_str(&mut cfg.search.password, "OS_PASSWORD");
    set_str(&mut cfg.search.post_index, "POST_INDEX");
    set_str(&mut cfg.search.author_index, "AUTHOR_INDEX");
    set_str(&mut cfg.repair.publisher, "POST_PUBLISHER");

    if let Some(v) = parse_env(&lookup, "DB_PORT")? {
        cfg.database.port = v;
    }
    if let Some(v) = parse_env(&lookup, "QUERY_TIMEOUT_SECONDS")? {
        cfg.database.query_timeout_seconds = v;
    }
    if let Some(v) = parse_env(&lookup, "POST_CHUNK_SIZE")? {
        cfg.repair.chunk_size = v;
    }
    if let Some(v) = parse_env(&lookup, "RUN_DEADLINE_SECONDS")? {
        cfg.repair.run_deadline_seconds = v;
    }
    if let Some(v) = parse_env(&lookup, "OS_INSECURE")? {
        cfg.search.accept_invalid_certs = v;
    }
    Ok(())
}

fn parse_env<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { key, value: raw }),
    }
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.database.host.trim().is_empty() {
        return Err(ConfigError::Invalid("database.host must be non-empty"));
    }
    if cfg.database.port == 0 {
        return Err(ConfigError::Invalid("database.port must be > 0"));
    }
    if cfg.database.user.trim().is_empty() {
        return Err(ConfigError::Invalid("database.user must be non-empty"));
    }
    if cfg.database.name.trim().is_empty() {
        return Err(ConfigError::Invalid("database.name must be non-empty"));
    }
    if cfg.database.query_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("database.query_timeout_seconds must be > 0"));
    }

    if cfg.search.host.trim().is_empty() {
        return Err(ConfigError::Invalid("search.host must be non-empty"));
    }
    if cfg.search.post_index.trim().is_empty() {
        return Err(ConfigError::Invalid("search.post_index must be non-empty"));
    }
    if cfg.search.author_index.trim().is_empty() {
        return Err(ConfigError::Invalid("search.author_index must be non-empty"));
    }

    // chunk_size may be non-positive; the chunker coerces it to 1.
    if cfg.repair.publisher.trim().is_empty() {
        return Err(ConfigError::Invalid("repair.publisher must be non-empty"));
    }

    Ok(())
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"database:
  host: "localhost"
  port: 5432
  user: "onecms"
  password: "secret"
  name: "onecms"
  query_timeout_seconds: 10

search:
  host: "https://localhost:9200"
  username: "admin"
  password: "admin"
  post_index: "one-post-index"
  author_index: "one-author-index"
  accept_invalid_certs: true

repair:
  chunk_size: 50
  publisher: "popmama"
  run_deadline_seconds: 30
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.repair.chunk_size, 50);
        assert!(cfg.search.accept_invalid_certs);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: Config = serde_yaml::from_str("database:\n  host: db\n").unwrap();
        assert_eq!(cfg.database.host, "db");
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.query_timeout_seconds, 10);
        assert_eq!(cfg.search.author_index, "one-author-index");
        assert_eq!(cfg.repair.publisher, "popmama");
        assert_eq!(cfg.repair.run_deadline(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        apply_env(
            &mut cfg,
            env(&[
                ("DB_HOST", "db.internal"),
                ("DB_PORT", "6543"),
                ("OS_HOST", "https://search:9200"),
                ("POST_INDEX", "posts-v2"),
                ("POST_CHUNK_SIZE", "7"),
                ("OS_INSECURE", "false"),
                ("RUN_DEADLINE_SECONDS", "0"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.database.host, "db.internal");
        assert_eq!(cfg.database.port, 6543);
        assert_eq!(cfg.database.user, "onecms");
        assert_eq!(cfg.search.host, "https://search:9200");
        assert_eq!(cfg.search.post_index, "posts-v2");
        assert_eq!(cfg.repair.chunk_size, 7);
        assert!(!cfg.search.accept_invalid_certs);
        assert_eq!(cfg.repair.run_deadline(), None);
        validate(&cfg).unwrap();
    }

    #[test]
    fn negative_chunk_size_is_accepted() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        apply_env(&mut cfg, env(&[("POST_CHUNK_SIZE", "-3")])).unwrap();
        assert_eq!(cfg.repair.chunk_size, -3);
        validate(&cfg).unwrap();
    }

    #[test]
    fn bad_numeric_env_is_rejected() {
        let mut cfg = Config::default();
        let err = apply_env(&mut cfg, env(&[("DB_PORT", "not-a-port")])).unwrap_err();
        match err {
            ConfigError::Env { key, value } => {
                assert_eq!(key, "DB_PORT");
                assert_eq!(value, "not-a-port");
            }
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn env_only_configuration() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            env(&[
                ("DB_HOST", "localhost"),
                ("DB_USERNAME", "u"),
                ("DB_PASS", "p"),
                ("DB_NAME", "cms"),
                ("OS_HOST", "http://localhost:9200"),
                ("POST_INDEX", "posts"),
            ]),
        )
        .unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_required_fields() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.database.host = " ".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("database.host")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.search.post_index = "".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("post_index")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.database.query_timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.repair.publisher = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        assert!(matches!(validate(&Config::default()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let mut cfg: Config = serde_yaml::from_str(&fs::read_to_string(&p).unwrap()).unwrap();
        apply_env(&mut cfg, env(&[])).unwrap();
        assert_eq!(cfg.search.post_index, "one-post-index");
        assert_eq!(cfg.database.query_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn load_reports_missing_file() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
