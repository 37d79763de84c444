//! Application state and composition.

use std::sync::Arc;

use taleweaver_domain::{TimeProgression, World};

use crate::infrastructure::{
    app_settings::{EngineSettings, ProviderKind},
    clock::SystemClock,
    gameplay::KeywordAffinity,
    image_renderer::HttpImageRenderer,
    llm_manager::LlmManager,
    media::SpawningMediaPipeline,
    ollama::OllamaClient,
    persistence::{InMemorySessionRepo, SqliteSessionRepo},
    ports::{ClockPort, LlmPort, RepoError, SessionRepo},
    prompt_builder::NarrativePromptBuilder,
    scripted_llm::ScriptedLlm,
};
use crate::use_cases::{GameEngine, SessionRegistry, TurnConfig};

/// Main application state.
///
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub sessions: SessionRegistry,
}

impl App {
    pub fn new(engine: Arc<GameEngine>) -> Self {
        Self {
            sessions: SessionRegistry::new(engine),
        }
    }

    /// Wires the engine and its adapters for `world` from settings.
    pub async fn from_settings(world: World, settings: &EngineSettings) -> Result<Self, RepoError> {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock);

        let sessions: Arc<dyn SessionRepo> = match &settings.session_db {
            Some(path) => {
                tracing::info!(path = %path, "Persisting sessions to SQLite");
                Arc::new(SqliteSessionRepo::new(path, clock.clone()).await?)
            }
            None => {
                tracing::warn!("SESSION_DB not set, sessions are kept in memory only");
                Arc::new(InMemorySessionRepo::new())
            }
        };

        let providers = build_providers(settings);
        tracing::info!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            max_retries = settings.retry.max_retries,
            base_delay_ms = settings.retry.base_delay_ms,
            timeout = ?settings.llm_timeout,
            "LLM manager configured"
        );
        let llm = Arc::new(LlmManager::new(
            providers,
            settings.retry.clone(),
            settings.llm_timeout,
        ));

        let config = TurnConfig {
            time: TimeProgression {
                turns_per_period: settings.turns_per_time_period,
            },
            max_affinity_delta: settings.max_affinity_delta,
            persist_timeout: settings.persist_timeout,
            history_limit: settings.history_limit,
            ..TurnConfig::default()
        };

        let mut engine = GameEngine::new(
            Arc::new(world),
            llm,
            Arc::new(NarrativePromptBuilder::default()),
            sessions,
            clock,
            config,
        )
        .with_gameplay(Arc::new(KeywordAffinity::default()));

        match &settings.media_url {
            Some(url) => {
                tracing::info!(url = %url, dir = %settings.media_dir.display(), "Scene rendering enabled");
                let renderer = Arc::new(HttpImageRenderer::new(url));
                engine = engine.with_media(Arc::new(SpawningMediaPipeline::new(
                    renderer,
                    settings.media_dir.clone(),
                )));
            }
            None => tracing::info!("MEDIA_URL not set, scene rendering disabled"),
        }

        Ok(Self {
            sessions: SessionRegistry::new(Arc::new(engine))
                .with_idle_timeout(settings.session_idle_timeout),
        })
    }
}

fn build_providers(settings: &EngineSettings) -> Vec<Arc<dyn LlmPort>> {
    settings
        .providers
        .iter()
        .map(|kind| -> Arc<dyn LlmPort> {
            match kind {
                ProviderKind::Ollama => Arc::new(OllamaClient::with_timeout(
                    &settings.ollama_url,
                    &settings.ollama_model,
                    settings.llm_timeout.as_secs() + 1,
                )),
                ProviderKind::Scripted => Arc::new(ScriptedLlm::default()),
            }
        })
        .collect()
}
