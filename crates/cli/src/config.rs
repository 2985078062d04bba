use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use agent::{
    FileMemoryStore, GatewayManager, GatewayPolicies, MemoryPolicy, ParsingPolicy,
    ProviderCatalog, ProviderEntry, ToolPolicy, ToolRegistry, VolatileMemoryStore,
    prompts::DEFAULT_SYSTEM_PROMPT,
};
use proto::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Directory under `$HOME` holding config, sessions and logs.
pub const APP_DIR: &str = ".llm-gateway";

/// Session memory backing selected at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Every call is stateless.
    Off,
    /// History lives for the life of the process.
    Volatile,
    /// History is written to `sessions_dir` and survives restarts.
    #[default]
    Persistent,
}

impl FromStr for MemoryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "volatile" | "memory" => Ok(Self::Volatile),
            "persistent" | "history" => Ok(Self::Persistent),
            other => Err(ConfigError::InvalidValue {
                field: "gateway.memory".to_string(),
                reason: format!("unknown memory mode '{other}' (expected off, volatile or persistent)"),
            }),
        }
    }
}

/// How replies are produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Raw reply text.
    #[default]
    Plain,
    /// Replies must carry the structured JSON object.
    Structured,
    /// Two-step tool protocol with the built-in tools.
    Tools,
}

impl FromStr for ResponseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "raw" => Ok(Self::Plain),
            "structured" => Ok(Self::Structured),
            "tools" => Ok(Self::Tools),
            other => Err(ConfigError::InvalidValue {
                field: "gateway.mode".to_string(),
                reason: format!("unknown response mode '{other}' (expected plain, structured or tools)"),
            }),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-provider overrides keyed by catalog id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderOverride>,
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub memory: MemoryMode,
    #[serde(default)]
    pub mode: ResponseMode,
    /// Where persistent sessions are stored; defaults to `~/.llm-gateway/sessions`.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            memory: MemoryMode::default(),
            mode: ResponseMode::default(),
            sessions_dir: None,
            system_prompt: default_system_prompt(),
        }
    }
}

impl GatewayConfig {
    pub fn effective_sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(|| app_dir().join("sessions"))
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `*` or a comma-separated origin list.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> String {
    "*".to_string()
}

/// `[providers.<id>]` section. Empty strings count as unset.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProviderOverride {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// `$HOME/.llm-gateway`, or `./.llm-gateway` when `HOME` is unset.
pub fn app_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(APP_DIR)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Load config from file, falling back to defaults, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join("config.toml");
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = app_dir().join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;

        let builtin = ProviderCatalog::builtin();
        for id in config.providers.keys() {
            if builtin.get(id).is_none() {
                warn!(provider = %id, "Ignoring overrides for unknown provider");
            }
        }

        debug!(
            memory = ?config.gateway.memory,
            mode = ?config.gateway.mode,
            host = %config.server.host,
            port = config.server.port,
            "Config loaded"
        );
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(memory) = std::env::var("LLM_GATEWAY_MEMORY") {
            self.gateway.memory = memory.parse()?;
        }
        if let Ok(mode) = std::env::var("LLM_GATEWAY_MODE") {
            self.gateway.mode = mode.parse()?;
        }
        if let Ok(dir) = std::env::var("LLM_GATEWAY_SESSIONS_DIR") {
            self.gateway.sessions_dir = Some(PathBuf::from(dir));
        }
        if let Ok(host) = std::env::var("LLM_GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LLM_GATEWAY_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "server.port".to_string(),
                reason: format!("'{port}' is not a valid port"),
            })?;
        }
        Ok(())
    }

    /// Built-in catalog with `[providers.<id>]` model and endpoint overrides applied.
    pub fn catalog(&self) -> ProviderCatalog {
        let mut catalog = ProviderCatalog::builtin();
        for (id, overrides) in &self.providers {
            let Some(entry) = catalog.get_mut(id) else {
                continue;
            };
            if let Some(model) = non_empty(&overrides.model) {
                entry.default_model = model.to_string();
            }
            if let Some(url) = non_empty(&overrides.base_url) {
                entry.base_url = Some(url.to_string());
            }
        }
        catalog
    }

    /// API key for `entry`: the config value wins, then the entry's env var.
    pub fn credential_for(&self, entry: &ProviderEntry) -> Option<String> {
        self.providers
            .get(&entry.id)
            .and_then(|o| non_empty(&o.api_key))
            .map(str::to_string)
            .or_else(|| {
                std::env::var(&entry.credential_key)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    /// Policies selected by `[gateway]`.
    pub fn policies(&self) -> GatewayPolicies {
        let memory = match self.gateway.memory {
            MemoryMode::Off => MemoryPolicy::Stateless,
            MemoryMode::Volatile => MemoryPolicy::Session(Arc::new(VolatileMemoryStore::new())),
            MemoryMode::Persistent => MemoryPolicy::Session(Arc::new(FileMemoryStore::new(
                self.gateway.effective_sessions_dir(),
            ))),
        };
        let (parsing, tools) = match self.gateway.mode {
            ResponseMode::Plain => (ParsingPolicy::Raw, ToolPolicy::Disabled),
            ResponseMode::Structured => (ParsingPolicy::Structured, ToolPolicy::Disabled),
            ResponseMode::Tools => (
                ParsingPolicy::Structured,
                ToolPolicy::Enabled(Arc::new(ToolRegistry::with_builtin())),
            ),
        };
        GatewayPolicies {
            memory,
            parsing,
            tools,
        }
    }

    /// Manager with a backend for every provider that has a credential.
    pub fn build_manager(&self) -> GatewayManager {
        GatewayManager::from_credentials(self.catalog(), self.policies(), |entry| {
            self.credential_for(entry)
        })
        .with_system_prompt(self.gateway.system_prompt.clone())
    }
}
