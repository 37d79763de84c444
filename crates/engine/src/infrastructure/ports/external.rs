//! External service port traits (LLM providers, prompt assembly, media, gameplay).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taleweaver_domain::{Action, MediaJobId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{ImageGenError, LlmError, MediaError};
use super::types::{GameplayContext, MediaStatus, PromptContext, RenderRequest};

// =============================================================================
// LLM Types
// =============================================================================

/// LLM request/response types
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// The conversation history
    pub messages: Vec<ChatMessage>,
    /// System prompt / context
    pub system_prompt: Option<String>,
    /// Temperature for response generation (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object rather than free text
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            json_mode: false,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Text of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Response from the LLM
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    /// The generated text content
    pub content: String,
    /// Finish reason
    pub finish_reason: FinishReason,
    /// Token usage
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: FinishReason::Stop,
            usage: None,
        }
    }
}

/// Reason the generation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    #[serde(other)]
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One LLM provider (a network client or an offline stand-in).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// Stable provider name used in logs and turn results.
    fn name(&self) -> String;
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
    /// Whether the provider is reachable and ready to serve.
    async fn check_health(&self) -> Result<bool, LlmError>;
}

// =============================================================================
// Prompt Assembly
// =============================================================================

/// Turns the assembled turn context into a provider request. Must be pure.
#[cfg_attr(test, mockall::automock)]
pub trait PromptBuilderPort: Send + Sync {
    fn build(&self, context: &PromptContext) -> LlmRequest;
}

// =============================================================================
// Image Generation
// =============================================================================

/// Image generation request/response types
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
    pub image_data: Vec<u8>,
    pub format: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenPort: Send + Sync {
    async fn generate(&self, request: ImageRequest) -> Result<ImageResult, ImageGenError>;
    async fn check_health(&self) -> Result<bool, ImageGenError>;
}

// =============================================================================
// Media Pipeline
// =============================================================================

/// Handle to a media job running in the background.
///
/// The job reports through a watch channel, so the handle can be polled
/// without consuming it, awaited, or cancelled.
#[derive(Debug)]
pub struct MediaJobHandle {
    id: MediaJobId,
    status: watch::Receiver<MediaStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MediaJobHandle {
    pub fn new(
        id: MediaJobId,
        status: watch::Receiver<MediaStatus>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            status,
            cancel,
            task: Some(task),
        }
    }

    /// A handle for a job that already reached `status`.
    pub fn finished(id: MediaJobId, status: MediaStatus) -> Self {
        let (_tx, rx) = watch::channel(status);
        Self {
            id,
            status: rx,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn id(&self) -> MediaJobId {
        self.id
    }

    pub fn status(&self) -> MediaStatus {
        self.status.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.status.borrow().is_terminal()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the job reaches a terminal status.
    pub async fn wait(&mut self) -> MediaStatus {
        let current = self.status();
        if current.is_terminal() {
            return current;
        }
        match self.status.wait_for(MediaStatus::is_terminal).await {
            Ok(status) => status.clone(),
            // Sender dropped without a terminal status: the task died.
            Err(_) => {
                if let Some(task) = self.task.take() {
                    if let Err(e) = task.await {
                        return MediaStatus::Failed {
                            reason: e.to_string(),
                        };
                    }
                }
                MediaStatus::Failed {
                    reason: "media job ended without reporting".to_string(),
                }
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaPipelinePort: Send + Sync {
    /// Starts a render in the background. Must not block the turn.
    fn enqueue(&self, request: RenderRequest) -> Result<MediaJobHandle, MediaError>;
    async fn check_health(&self) -> Result<bool, MediaError>;
}

// =============================================================================
// Gameplay
// =============================================================================

/// A gameplay heuristic that proposes state changes from a finished turn.
#[cfg_attr(test, mockall::automock)]
pub trait GameplayPort: Send + Sync {
    fn name(&self) -> &'static str;
    fn propose(&self, context: &GameplayContext) -> Vec<Action>;
}
