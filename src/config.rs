use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_db_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_secs() -> u64 {
    5
}
fn default_db_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyzerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    // The analyzer is the dominant-latency step; its timeout is independent
    // of (and much longer than) any database timeout.
    #[serde(default = "default_analyzer_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_analyzer_max_retries")]
    pub max_retries: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_analyzer_timeout_secs() -> u64 {
    120
}
fn default_analyzer_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
        }
    }
}

fn default_ttl_days() -> i64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl AnalyzerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    if config.cache.ttl_days < 1 {
        anyhow::bail!("cache.ttl_days must be >= 1");
    }

    if config.analyzer.is_enabled() && config.analyzer.model.is_none() {
        anyhow::bail!(
            "analyzer.model must be specified when provider is '{}'",
            config.analyzer.provider
        );
    }

    match config.analyzer.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown analyzer provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("senti.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
[db]
path = "data/senti.sqlite"

[server]
bind = "127.0.0.1:7431"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.max_connections, 5);
        assert_eq!(cfg.db.max_retries, 3);
        assert_eq!(cfg.cache.ttl_days, 30);
        assert_eq!(cfg.analyzer.provider, "disabled");
        assert!(!cfg.analyzer.is_enabled());
    }

    #[test]
    fn enabled_analyzer_requires_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
[db]
path = "data/senti.sqlite"

[analyzer]
provider = "openai"

[server]
bind = "127.0.0.1:7431"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("analyzer.model"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
[db]
path = "data/senti.sqlite"

[analyzer]
provider = "magic"
model = "m"

[server]
bind = "127.0.0.1:7431"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_ttl_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
[db]
path = "data/senti.sqlite"

[cache]
ttl_days = 0

[server]
bind = "127.0.0.1:7431"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
