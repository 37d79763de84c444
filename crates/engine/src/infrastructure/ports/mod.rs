//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Session persistence (in-memory or SQLite)
//! - LLM providers (Ollama, offline scripted responses)
//! - Prompt assembly
//! - Image generation and the background media pipeline
//! - Gameplay heuristics that propose actions
//! - Clock (for testing)

mod error;
mod external;
mod repos;
mod testing;
pub mod types;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::SessionRepo;

// =============================================================================
// Port Data Types
// =============================================================================
pub use types::{
    ArcSummary, BeatDirective, CompanionInfo, GameplayContext, LocationInfo, MediaArtifact,
    MediaStatus, NarrativeContext, PromptContext, QuestContext, RenderRequest,
};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    ChatMessage, FinishReason, GameplayPort, ImageGenPort, ImageRequest, ImageResult, LlmPort,
    LlmRequest, LlmResponse, MediaJobHandle, MediaPipelinePort, MessageRole, PromptBuilderPort,
    TokenUsage,
};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use repos::MockSessionRepo;

#[cfg(test)]
pub use external::{
    MockGameplayPort, MockImageGenPort, MockLlmPort, MockMediaPipelinePort, MockPromptBuilderPort,
};

#[cfg(test)]
pub use testing::MockClockPort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::ClockPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::{ImageGenError, LlmError, MediaError, RepoError};
