//! Narrator backed by a local Ollama server through its `/v1/chat/completions` endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::ports::{
    FinishReason, LlmError, LlmPort, LlmRequest, LlmResponse, MessageRole, TokenUsage,
};

/// Talks to one Ollama model. Transport errors are classified so the manager knows whether to retry.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model for Ollama.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        // The manager enforces its own per-call timeout; this only guards
        // against connections that never close.
        Self::with_timeout(base_url, model, 120)
    }

    /// Create client with custom timeout (for testing).
    pub fn with_timeout(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL)
    }
}

#[async_trait]
impl LlmPort for OllamaClient {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let api_request = CompletionRequest {
            model: self.model.clone(),
            messages: build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then(|| WireFormat {
                r#type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            return Err(classify_status(status, error_text));
        }

        let api_response: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        convert_response(api_response)
    }

    async fn check_health(&self) -> Result<bool, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

fn classify_status(status: StatusCode, body: String) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            LlmError::Fatal(format!("{status}: {body}"))
        }
        _ => LlmError::RequestFailed(format!("{status}: {body}")),
    }
}

fn build_messages(request: &LlmRequest) -> Vec<WireMessage> {
    let mut messages = Vec::new();

    if let Some(system) = &request.system_prompt {
        messages.push(WireMessage {
            role: "system".to_string(),
            content: Some(system.clone()),
        });
    }

    for msg in &request.messages {
        messages.push(WireMessage {
            role: match msg.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
            }
            .to_string(),
            content: Some(msg.content.clone()),
        });
    }

    messages
}

fn convert_response(response: CompletionResponse) -> Result<LlmResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in LLM response".to_string()))?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") | None => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(_) => FinishReason::Unknown,
    };

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        finish_reason,
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

// =============================================================================
// Wire types for the chat completions endpoint
// =============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireFormat>,
}

#[derive(Debug, Serialize)]
struct WireFormat {
    r#type: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::ChatMessage;

    #[test]
    fn system_prompt_goes_first() {
        let request = LlmRequest::new(vec![ChatMessage::user("look around")])
            .with_system_prompt("You narrate.");

        let messages = build_messages(&request);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content.as_deref(), Some("look around"));
    }

    #[test]
    fn json_mode_sets_response_format() {
        let request = CompletionRequest {
            model: "m".into(),
            messages: vec![],
            temperature: None,
            max_tokens: None,
            response_format: Some(WireFormat {
                r#type: "json_object".into(),
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn converts_first_choice() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"narrative\": \"hi there\"}"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let response: CompletionResponse = serde_json::from_str(raw).unwrap();

        let converted = convert_response(response).unwrap();

        assert_eq!(converted.finish_reason, FinishReason::Length);
        assert_eq!(converted.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let response = CompletionResponse {
            choices: vec![],
            usage: None,
        };
        assert!(matches!(
            convert_response(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow".into()),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            LlmError::Fatal(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            LlmError::RequestFailed(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_failure() {
        let client = OllamaClient::with_timeout("http://127.0.0.1:9", "m", 2);
        let result = client.generate(LlmRequest::new(vec![ChatMessage::user("hi")])).await;
        assert!(matches!(result, Err(LlmError::RequestFailed(_))));
        assert!(client.check_health().await.is_err());
    }
}
