//! Engine settings read from the environment.
//!
//! Every setting has a default, so an empty environment starts a playable
//! server against the bundled world with the offline provider as last resort.
//! Unparseable values fall back to the default and are logged.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::llm_manager::RetryConfig;
use crate::infrastructure::ollama::{DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL};

// ============================================================================
// LLM Providers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    Scripted,
}

impl FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "scripted" | "mock" | "offline" => Ok(ProviderKind::Scripted),
            _ => Err(()),
        }
    }
}

fn parse_providers(raw: &str) -> Vec<ProviderKind> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(kind) => Some(kind),
            Err(()) => {
                tracing::warn!(provider = s, "Ignoring unknown LLM provider");
                None
            }
        })
        .collect()
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub world_path: PathBuf,
    /// SQLite file for session snapshots. `None` keeps sessions in memory.
    pub session_db: Option<String>,
    pub ollama_url: String,
    pub ollama_model: String,
    pub providers: Vec<ProviderKind>,
    pub retry: RetryConfig,
    pub llm_timeout: Duration,
    pub persist_timeout: Duration,
    /// 0 disables automatic time advance.
    pub turns_per_time_period: u32,
    pub max_affinity_delta: i32,
    /// Past exchanges replayed to the narrator each turn.
    pub history_limit: usize,
    /// Open sessions untouched for this long are dropped from memory.
    pub session_idle_timeout: Duration,
    /// Render service for scene images. `None` disables media.
    pub media_url: Option<String>,
    pub media_dir: PathBuf,
    pub server_host: String,
    pub server_port: u16,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |key: &str, default: u64| -> u64 {
            match get(key) {
                Some(raw) => raw.parse().unwrap_or_else(|_| {
                    tracing::warn!(key, value = %raw, default, "Invalid number in setting, using default");
                    default
                }),
                None => default,
            }
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: number("LLM_MAX_RETRIES", retry_defaults.max_retries.into()) as u32,
            base_delay_ms: number("LLM_BASE_DELAY_MS", retry_defaults.base_delay_ms),
            max_delay_ms: number("LLM_MAX_DELAY_MS", retry_defaults.max_delay_ms),
            jitter_factor: retry_defaults.jitter_factor,
        };

        let providers = get("LLM_PROVIDERS")
            .map(|raw| parse_providers(&raw))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| vec![ProviderKind::Ollama, ProviderKind::Scripted]);

        Self {
            world_path: get("TALEWEAVER_WORLD")
                .unwrap_or_else(|| "worlds/moonlit.json".into())
                .into(),
            session_db: get("SESSION_DB"),
            ollama_url: get("OLLAMA_URL")
                .or_else(|| get("OLLAMA_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.into()),
            ollama_model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.into()),
            providers,
            retry,
            llm_timeout: Duration::from_secs(number("LLM_TIMEOUT_SECS", 30)),
            persist_timeout: Duration::from_secs(number("PERSIST_TIMEOUT_SECS", 5)),
            turns_per_time_period: number("TURNS_PER_TIME_PERIOD", 5) as u32,
            max_affinity_delta: number("MAX_AFFINITY_DELTA", 5) as i32,
            history_limit: number("HISTORY_LIMIT", 10) as usize,
            session_idle_timeout: Duration::from_secs(number("SESSION_IDLE_SECS", 1800)),
            media_url: get("MEDIA_URL"),
            media_dir: get("MEDIA_DIR").unwrap_or_else(|| "media".into()).into(),
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: number("SERVER_PORT", 3000) as u16,
        }
    }
}
