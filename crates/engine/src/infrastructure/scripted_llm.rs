//! Offline provider that answers with canned JSON.
//!
//! Used as the last entry in the provider chain so a session stays playable
//! without any model server, and in development without API keys.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse};

pub struct ScriptedLlm {
    responses: Vec<String>,
    next: AtomicUsize,
}

impl ScriptedLlm {
    /// Cycles through `responses` in order. Each entry should be a JSON
    /// object the response schema accepts.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }

    fn default_responses() -> Vec<String> {
        [
            json!({
                "narrative": "Your companion watches you with a knowing smile. \"You arrived right on time,\" they murmur.",
                "visual_prompt": "companion standing by a window, soft sunlight, knowing smile",
                "tags": ["window", "sunlight", "smile"],
            }),
            json!({
                "narrative": "A quiet moment passes. Somewhere nearby, a clock ticks while the world waits for your next move.",
                "visual_prompt": "quiet room, old wall clock, warm afternoon light",
                "tags": ["interior", "clock", "warm_light"],
            }),
            json!({
                "narrative": "The air shifts as you step forward. \"Is there something you wanted to tell me?\" your companion asks.",
                "visual_prompt": "companion leaning closer, curious expression, detailed eyes",
                "tags": ["close_up", "curious", "detailed_eyes"],
            }),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect()
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new(Self::default_responses())
    }
}

#[async_trait]
impl LlmPort for ScriptedLlm {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        if self.responses.is_empty() {
            return Err(LlmError::Fatal("scripted provider has no responses".to_string()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        Ok(LlmResponse::text(self.responses[index].clone()))
    }

    async fn check_health(&self) -> Result<bool, LlmError> {
        Ok(!self.responses.is_empty())
    }
}
