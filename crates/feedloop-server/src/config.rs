use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use feedloop_core::RelayConfig;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub datastore: DatastoreSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub relay: RelaySettings,
    pub rate_limit_per_minute: Option<u64>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Default)]
pub struct DatastoreSettings {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub top_k: usize,
    pub idle_timeout_secs: u64,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    datastore: DatastoreSection,
    #[serde(default)]
    llm: LlmSection,
    #[serde(default)]
    embedding: EmbeddingSection,
    #[serde(default)]
    relay: RelaySection,
    #[serde(default)]
    rate_limit: RateLimitSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_allowed_origins")]
    allowed_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct DatastoreSection {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LlmSection {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EmbeddingSection {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelaySection {
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_idle_timeout_secs")]
    idle_timeout_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    keep_alive_secs: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            idle_timeout_secs: default_idle_timeout_secs(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RateLimitSection {
    #[serde(default)]
    requests_per_minute: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LogSection {
    #[serde(default)]
    format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let lookup = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        let config = match config_path() {
            Some(path) => Self::from_file(&path, lookup)?,
            None => Self::from_lookup(lookup),
        };

        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file; secrets it leaves out come from `lookup`.
    pub fn from_file(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path.display(), err))?;
        let parsed: FileConfig = toml::from_str(&contents)
            .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), err))?;
        Ok(Self::from_parts(parsed, lookup))
    }

    /// Build the config from environment-style key lookups only.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut file = FileConfig::default();

        if let Some(host) = lookup("FEEDLOOP_SERVER_HOST") {
            file.server.host = host;
        }
        if let Some(port) = lookup("FEEDLOOP_SERVER_PORT").and_then(|v| v.parse::<u16>().ok()) {
            file.server.port = port;
        }
        if let Some(origins) = lookup("FEEDLOOP_ALLOWED_ORIGINS") {
            file.server.allowed_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        file.llm.model = lookup("FEEDLOOP_LLM_MODEL");
        file.embedding.model = lookup("FEEDLOOP_EMBEDDING_MODEL");
        file.rate_limit.requests_per_minute =
            lookup("FEEDLOOP_RATE_LIMIT_RPM").and_then(|v| v.parse::<u64>().ok());
        if lookup("FEEDLOOP_LOG_FORMAT").as_deref() == Some("json") {
            file.log.format = LogFormat::Json;
        }

        Self::from_parts(file, lookup)
    }

    fn from_parts(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let llm_api_key = file
            .llm
            .api_key
            .or_else(|| lookup("OPENAI_API_KEY"))
            .unwrap_or_default();
        let llm_base_url = file
            .llm
            .base_url
            .or_else(|| lookup("OPENAI_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());

        let embedding = EmbeddingSettings {
            api_key: file
                .embedding
                .api_key
                .unwrap_or_else(|| llm_api_key.clone()),
            base_url: file
                .embedding
                .base_url
                .unwrap_or_else(|| llm_base_url.clone()),
            model: file.embedding.model.unwrap_or_else(default_embedding_model),
        };

        Self {
            host: file.server.host,
            port: file.server.port,
            allowed_origins: file.server.allowed_origins,
            datastore: DatastoreSettings {
                url: file
                    .datastore
                    .url
                    .or_else(|| lookup("FEEDLOOP_DATASTORE_URL"))
                    .unwrap_or_default(),
                api_key: file
                    .datastore
                    .api_key
                    .or_else(|| lookup("FEEDLOOP_DATASTORE_KEY"))
                    .unwrap_or_default(),
            },
            llm: LlmSettings {
                api_key: llm_api_key,
                base_url: llm_base_url,
                model: file.llm.model.unwrap_or_else(default_llm_model),
                temperature: file.llm.temperature,
                max_tokens: file.llm.max_tokens,
            },
            embedding,
            relay: RelaySettings {
                top_k: file.relay.top_k,
                idle_timeout_secs: file.relay.idle_timeout_secs,
                keep_alive_secs: file.relay.keep_alive_secs,
            },
            rate_limit_per_minute: file.rate_limit.requests_per_minute,
            log_format: file.log.format,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.datastore.url.trim().is_empty() {
            anyhow::bail!("Datastore URL is not configured (datastore.url or FEEDLOOP_DATASTORE_URL)");
        }
        if self.datastore.api_key.trim().is_empty() {
            anyhow::bail!("Datastore key is not configured (datastore.api_key or FEEDLOOP_DATASTORE_KEY)");
        }
        if self.llm.api_key.trim().is_empty() {
            anyhow::bail!("LLM API key is not configured (llm.api_key or OPENAI_API_KEY)");
        }
        if self.relay.idle_timeout_secs == 0 {
            anyhow::bail!("relay.idle_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            top_k: self.relay.top_k,
            idle_timeout: Duration::from_secs(self.relay.idle_timeout_secs),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.relay.keep_alive_secs.max(1))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("FEEDLOOP_SERVER_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let local = Path::new("server.toml");
    local.exists().then(|| local.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_only_config() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("FEEDLOOP_SERVER_PORT", "9090"),
            ("FEEDLOOP_DATASTORE_URL", "https://db.example.co"),
            ("FEEDLOOP_DATASTORE_KEY", "service-key"),
            ("OPENAI_API_KEY", "sk-env"),
            ("FEEDLOOP_RATE_LIMIT_RPM", "30"),
            ("FEEDLOOP_ALLOWED_ORIGINS", "https://app.example.com, https://widget.example.com"),
        ]));

        assert_eq!(config.bind_address(), "0.0.0.0:9090");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.embedding.api_key, "sk-env");
        assert_eq!(config.embedding.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.rate_limit_per_minute, Some(30));
        assert_eq!(
            config.allowed_origins,
            vec!["https://app.example.com", "https://widget.example.com"]
        );
        assert_eq!(config.relay_config().top_k, 5);
        assert_eq!(config.relay_config().idle_timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_config_with_env_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 3001

[datastore]
url = "https://db.example.co"

[llm]
model = "gpt-4o"
temperature = 0.3
base_url = "http://localhost:11434/v1"

[relay]
top_k = 3
idle_timeout_secs = 20

[log]
format = "json"
"#
        )
        .unwrap();

        let config = ServerConfig::from_file(
            &path,
            lookup_from(&[("FEEDLOOP_DATASTORE_KEY", "service-key"), ("OPENAI_API_KEY", "sk-env")]),
        )
        .unwrap();

        assert_eq!(config.port, 3001);
        assert_eq!(config.datastore.api_key, "service-key");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.temperature, Some(0.3));
        assert_eq!(config.embedding.base_url, "http://localhost:11434/v1");
        assert_eq!(config.relay.top_k, 3);
        assert_eq!(config.relay.keep_alive_secs, 15);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_secrets_fail_validation() {
        let config = ServerConfig::from_lookup(lookup_from(&[(
            "FEEDLOOP_DATASTORE_URL",
            "https://db.example.co",
        )]));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Datastore key"));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "[server\nport = ").unwrap();

        let err = ServerConfig::from_file(&path, |_| None).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
