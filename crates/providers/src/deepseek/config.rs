use aistudy_core::llm::ChatError;
use directories::BaseDirs;
use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf, time::Duration};
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_STREAM_IDLE_TIMEOUT_MS: u64 = 300_000;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeepSeekFileConfig {
    pub deepseek_api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
    pub stream_idle_timeout_ms: Option<u64>,
}

impl DeepSeekFileConfig {
    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("read {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| ChatError::Config(format!("parse {}: {}", path.display(), e)))
    }
}

#[derive(Clone, Debug)]
pub struct DeepSeekConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Whole-request timeout for single-shot calls. Also bounds connection setup
    /// and the wait for a stream's response headers.
    pub timeout: Duration,
    /// Longest gap allowed between two body chunks of a stream.
    pub stream_idle_timeout: Duration,
    pub proxy: Option<String>,
}

impl DeepSeekConfig {
    /// Builds a config from whatever the credential provider returned.
    /// A missing or blank key is rejected here, before any request exists.
    pub fn new(api_key: Option<String>) -> Result<Self, ChatError> {
        let api_key = match api_key {
            Some(k) if !k.trim().is_empty() => k.trim().to_string(),
            _ => {
                return Err(ChatError::Config(
                    "deepseek_api_key is not configured".into(),
                ))
            }
        };
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            stream_idle_timeout: Duration::from_millis(DEFAULT_STREAM_IDLE_TIMEOUT_MS),
            proxy: None,
        })
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.stream_idle_timeout = idle;
        self
    }

    /// Merges a parsed config file with an environment key. The environment wins.
    pub fn from_file_config(
        file: DeepSeekFileConfig,
        env_key: Option<String>,
    ) -> Result<Self, ChatError> {
        let mut cfg = Self::new(env_key.or(file.deepseek_api_key))?;
        if let Some(u) = file.base_url {
            cfg.base_url = u;
        }
        if let Some(m) = file.model {
            cfg.model = m;
        }
        if let Some(t) = file.timeout_ms {
            cfg.timeout = Duration::from_millis(t);
        }
        if let Some(idle) = file.stream_idle_timeout_ms {
            cfg.stream_idle_timeout = Duration::from_millis(idle);
        }
        Ok(cfg)
    }

    pub fn from_env_and_file() -> Result<Self, ChatError> {
        let file = match Self::config_path() {
            Some(path) if path.exists() => match DeepSeekFileConfig::load(&path) {
                Ok(f) => f,
                Err(e) => {
                    warn!(target: "providers::deepseek", "ignoring config file: {}", e);
                    DeepSeekFileConfig::default()
                }
            },
            _ => DeepSeekFileConfig::default(),
        };
        let mut cfg = Self::from_file_config(file, env::var("DEEPSEEK_API_KEY").ok())?;
        if let Ok(u) = env::var("DEEPSEEK_BASE_URL") {
            cfg.base_url = u;
        }
        if let Ok(m) = env::var("DEEPSEEK_MODEL") {
            cfg.model = m;
        }
        cfg.proxy = env::var("HTTPS_PROXY")
            .ok()
            .or_else(|| env::var("HTTP_PROXY").ok());
        Ok(cfg)
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".aistudy").join("config.toml")
        } else {
            base.config_dir().join("aistudy").join("config.toml")
        };
        Some(p)
    }
}
