use serde::Deserialize;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub server: ServerCfg,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub cache: CacheCfg,
    pub summarizer: Option<SummarizerCfg>,
    #[serde(default)]
    pub cors: CorsCfg,
    #[serde(default)]
    pub extraction: ExtractionCfg,
}

#[derive(Debug, Deserialize)]
pub struct ServerCfg {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheCfg {
    pub redis_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummarizerCfg {
    pub kind: String, // openai_compat | anthropic | stub
    pub base_url: Option<String>,
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub max_input_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CorsCfg {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractionCfg {
    pub timeout_secs: u64,
}

impl Default for ExtractionCfg {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// `REDIS_URL` 优先于配置文件
    pub fn redis_url(&self) -> Option<String> {
        std::env::var("REDIS_URL")
            .ok()
            .or_else(|| self.cache.redis_url.clone())
            .filter(|u| !u.trim().is_empty())
    }
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    let path = std::env::var("DOCSUM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let s = std::fs::read_to_string(&path)?;
    let cfg = parse_config(&s)?;
    info!(path = %path, "load_config: {:?}", cfg);
    Ok(cfg)
}

pub fn parse_config(s: &str) -> anyhow::Result<AppConfig> {
    Ok(serde_yaml::from_str(s)?)
}

pub fn read_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("server:\n  host: 127.0.0.1\n  port: 5001\n").unwrap();
        assert!(!cfg.is_production());
        assert!(cfg.summarizer.is_none());
        assert!(cfg.cors.allowed_origins.is_empty());
        assert_eq!(cfg.extraction.timeout_secs, 30);
        assert_eq!(cfg.server.max_upload_bytes, 25 * 1024 * 1024);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
server: { host: 0.0.0.0, port: 8080, max_upload_bytes: 1024 }
environment: production
cache: { redis_url: "redis://cache:6379/" }
summarizer:
  kind: anthropic
  api_key_env: ANTHROPIC_API_KEY
  model: claude-3-5-haiku-latest
cors:
  allowed_origins: ["https://app.example.com"]
extraction: { timeout_secs: 5 }
"#;
        let cfg = parse_config(yaml).unwrap();
        assert!(cfg.is_production());
        assert_eq!(cfg.cache.redis_url.as_deref(), Some("redis://cache:6379/"));
        assert_eq!(cfg.summarizer.unwrap().kind, "anthropic");
        assert_eq!(cfg.cors.allowed_origins, vec!["https://app.example.com"]);
        assert_eq!(cfg.extraction.timeout_secs, 5);
    }

    #[test]
    fn test_shipped_config_parses() {
        let s = include_str!("../../../configs/default.yaml");
        let cfg = parse_config(s).unwrap();
        assert_eq!(cfg.server.port, 5001);
    }
}
