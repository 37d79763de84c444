//! Multi-provider LLM manager with per-provider retry and ordered fallback.
//!
//! Providers are tried in configured order. Each one gets up to `max_retries`
//! attempts, spaced by exponential backoff with jitter, while its failures stay
//! retryable; a fatal failure or an exhausted budget moves on to the next
//! provider. Every call is bounded by `call_timeout`, and a response only counts
//! once it passes the [`ResponseSchema`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use taleweaver_domain::FlagValue;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per provider before falling back to the next one. 0 still
    /// makes a single attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays to prevent thundering herd
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Attempts a provider gets before the manager moves on.
    pub fn attempts_per_provider(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Calculate delay for a given retry number using exponential backoff with jitter
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.base_delay_ms;
        // Exponential: base * 2^(attempt-1)
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_delay_ms);

        // Add jitter: ±jitter_factor around the delay
        let jitter_range = (capped as f64 * self.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }
}

// =============================================================================
// Response schema
// =============================================================================

/// State changes the narrator proposes alongside its prose. Applied by the
/// engine through the action executor, never directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseUpdates {
    #[serde(alias = "affinity_change")]
    pub affinity: BTreeMap<String, i32>,
    pub location: Option<String>,
    pub time_of_day: Option<String>,
    pub set_flags: BTreeMap<String, FlagValue>,
    pub items_gained: Vec<String>,
    pub items_lost: Vec<String>,
}

impl ResponseUpdates {
    pub fn is_empty(&self) -> bool {
        self == &ResponseUpdates::default()
    }
}

/// A provider response that passed schema validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredResponse {
    pub narrative: String,
    pub visual_prompt: Option<String>,
    pub tags: Vec<String>,
    pub updates: ResponseUpdates,
    /// Name of the provider that produced it.
    pub provider: String,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(alias = "text")]
    narrative: String,
    #[serde(default, alias = "visual_en")]
    visual_prompt: Option<String>,
    #[serde(default, alias = "tags_en")]
    tags: Vec<String>,
    #[serde(default)]
    updates: ResponseUpdates,
}

/// What a provider's JSON must look like to be accepted.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    /// Top-level keys that must be present.
    pub required_fields: Vec<String>,
    pub min_narrative_chars: usize,
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self {
            required_fields: vec!["narrative".to_string()],
            min_narrative_chars: 5,
        }
    }
}

const ERROR_MARKER: &str = "[Error:";

impl ResponseSchema {
    /// Parses and checks a raw provider payload.
    pub fn validate(&self, raw: &str, provider: &str) -> Result<StructuredResponse, LlmError> {
        let body = strip_code_fences(raw);
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| LlmError::InvalidResponse(format!("not JSON: {e}")))?;

        let object = value
            .as_object()
            .ok_or_else(|| LlmError::InvalidResponse("expected a JSON object".to_string()))?;
        for field in &self.required_fields {
            let present = object.contains_key(field.as_str())
                || field_aliases(field).iter().any(|a| object.contains_key(*a));
            if !present {
                return Err(LlmError::InvalidResponse(format!(
                    "missing required field '{field}'"
                )));
            }
        }

        let raw: RawResponse = serde_json::from_value(value)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let narrative = raw.narrative.trim();
        if narrative.is_empty() {
            return Err(LlmError::InvalidResponse("empty narrative".to_string()));
        }
        if narrative.starts_with(ERROR_MARKER) {
            return Err(LlmError::InvalidResponse(format!(
                "provider returned an error marker: {narrative}"
            )));
        }
        if narrative.chars().count() < self.min_narrative_chars {
            return Err(LlmError::InvalidResponse(format!(
                "narrative shorter than {} characters",
                self.min_narrative_chars
            )));
        }

        Ok(StructuredResponse {
            narrative: narrative.to_string(),
            visual_prompt: raw
                .visual_prompt
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            tags: raw.tags,
            updates: raw.updates,
            provider: provider.to_string(),
        })
    }
}

fn field_aliases(field: &str) -> &'static [&'static str] {
    match field {
        "narrative" => &["text"],
        "visual_prompt" => &["visual_en"],
        "tags" => &["tags_en"],
        _ => &[],
    }
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

// =============================================================================
// Errors
// =============================================================================

/// How one provider failed during a `generate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("no LLM providers configured")]
    NoProviders,
    #[error("all {} LLM providers exhausted", .failures.len())]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },
}

// =============================================================================
// Manager
// =============================================================================

/// Result of one provider's readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub healthy: bool,
}

/// Bookkeeping for a single `generate` call.
#[derive(Debug, Default)]
struct GenerationAttempt {
    provider_index: usize,
    /// Attempts made against the current provider.
    attempt: u32,
    failures: Vec<ProviderFailure>,
}

impl GenerationAttempt {
    fn give_up_on(&mut self, provider: &str, error: &LlmError) {
        self.failures.push(ProviderFailure {
            provider: provider.to_string(),
            attempts: self.attempt,
            last_error: error.to_string(),
        });
        self.provider_index += 1;
        self.attempt = 0;
    }
}

pub struct LlmManager {
    providers: Vec<Arc<dyn LlmPort>>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl LlmManager {
    pub fn new(providers: Vec<Arc<dyn LlmPort>>, retry: RetryConfig, call_timeout: Duration) -> Self {
        Self {
            providers,
            retry,
            call_timeout,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Asks every provider, in order, whether it can serve. A failed or slow
    /// check counts as unhealthy.
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let name = provider.name();
            let healthy = match tokio::time::timeout(self.call_timeout, provider.check_health()).await {
                Ok(Ok(healthy)) => healthy,
                Ok(Err(e)) => {
                    tracing::warn!(provider = %name, error = %e, "Provider health check failed");
                    false
                }
                Err(_) => {
                    tracing::warn!(provider = %name, timeout = ?self.call_timeout, "Provider health check timed out");
                    false
                }
            };
            report.push(ProviderHealth {
                provider: name,
                healthy,
            });
        }
        report
    }

    /// Determine if an error is retryable
    fn is_retryable(error: &LlmError) -> bool {
        match error {
            LlmError::Timeout(_) | LlmError::RateLimited(_) => true,
            // Network/request failures are typically transient
            LlmError::RequestFailed(msg) => {
                // Don't retry on auth errors or bad requests
                !msg.contains("401")
                    && !msg.contains("403")
                    && !msg.contains("400")
                    && !msg.contains("Invalid")
            }
            // A malformed or off-schema answer may well be fine next time
            LlmError::InvalidResponse(_) => true,
            LlmError::Fatal(_) => false,
        }
    }

    async fn call_once(
        &self,
        provider: &dyn LlmPort,
        request: &LlmRequest,
        schema: &ResponseSchema,
        name: &str,
    ) -> Result<StructuredResponse, LlmError> {
        let response = tokio::time::timeout(self.call_timeout, provider.generate(request.clone()))
            .await
            .map_err(|_| LlmError::Timeout(self.call_timeout))??;
        schema.validate(&response.content, name)
    }

    /// Produces a schema-valid response from the first provider that can
    /// deliver one.
    pub async fn generate(
        &self,
        request: &LlmRequest,
        schema: &ResponseSchema,
    ) -> Result<StructuredResponse, GenerationError> {
        if self.providers.is_empty() {
            return Err(GenerationError::NoProviders);
        }

        let mut state = GenerationAttempt::default();

        while let Some(provider) = self.providers.get(state.provider_index) {
            let name = provider.name();
            state.attempt += 1;

            match self.call_once(provider.as_ref(), request, schema, &name).await {
                Ok(response) => {
                    if state.attempt > 1 || state.provider_index > 0 {
                        tracing::info!(
                            provider = %name,
                            attempt = state.attempt,
                            fallbacks = state.provider_index,
                            "LLM request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let retryable = Self::is_retryable(&e);

                    if retryable && state.attempt < self.retry.attempts_per_provider() {
                        let delay = self.retry.calculate_delay(state.attempt);
                        tracing::warn!(
                            provider = %name,
                            attempt = state.attempt,
                            max_retries = self.retry.max_retries,
                            delay_ms = delay,
                            error = %e,
                            "LLM request failed, retrying..."
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        continue;
                    }

                    if retryable {
                        tracing::error!(
                            provider = %name,
                            attempts = state.attempt,
                            error = %e,
                            "LLM provider failed after all retry attempts"
                        );
                    } else {
                        tracing::error!(
                            provider = %name,
                            error = %e,
                            "LLM provider failed with non-retryable error"
                        );
                    }
                    state.give_up_on(&name, &e);
                }
            }
        }

        Err(GenerationError::AllProvidersExhausted {
            failures: state.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{LlmResponse, MockLlmPort};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const GOOD: &str = r#"{"narrative": "Luna smiles at you from the window.", "visual_prompt": "girl by a window"}"#;

    /// Mock LLM that fails a configurable number of times before succeeding
    struct FailingMockLlm {
        name: &'static str,
        failures_remaining: AtomicU32,
        calls: AtomicU32,
        error_type: LlmError,
    }

    impl FailingMockLlm {
        fn new(name: &'static str, failure_count: u32, error: LlmError) -> Self {
            Self {
                name,
                failures_remaining: AtomicU32::new(failure_count),
                calls: AtomicU32::new(0),
                error_type: error,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmPort for FailingMockLlm {
        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                Err(self.error_type.clone())
            } else {
                Ok(LlmResponse::text(GOOD))
            }
        }

        async fn check_health(&self) -> Result<bool, LlmError> {
            Ok(true)
        }
    }

    /// Never answers within any sensible timeout.
    struct HangingLlm {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmPort for HangingLlm {
        fn name(&self) -> String {
            "hanging".to_string()
        }

        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(LlmResponse::text(GOOD))
        }

        async fn check_health(&self) -> Result<bool, LlmError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1, // Fast for tests
            max_delay_ms: 10,
            jitter_factor: 0.0,
        }
    }

    fn request() -> LlmRequest {
        LlmRequest::new(vec![]).with_json_mode()
    }

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let primary = Arc::new(FailingMockLlm::new("primary", 0, LlmError::RequestFailed("x".into())));
        let manager = LlmManager::new(vec![primary.clone()], fast_retry(2), Duration::from_secs(1));

        let result = manager.generate(&request(), &ResponseSchema::default()).await.unwrap();

        assert_eq!(result.provider, "primary");
        assert_eq!(result.visual_prompt.as_deref(), Some("girl by a window"));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_retry() {
        let primary = Arc::new(FailingMockLlm::new(
            "primary",
            1,
            LlmError::RequestFailed("transient".into()),
        ));
        let manager = LlmManager::new(vec![primary.clone()], fast_retry(2), Duration::from_secs(1));

        let result = manager.generate(&request(), &ResponseSchema::default()).await;

        assert!(result.is_ok());
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_primary_timing_out_falls_back_to_secondary() {
        let primary = Arc::new(HangingLlm {
            calls: AtomicU32::new(0),
        });
        let fallback = Arc::new(FailingMockLlm::new("fallback", 0, LlmError::Fatal("unused".into())));
        let manager = LlmManager::new(
            vec![primary.clone(), fallback.clone()],
            fast_retry(2),
            Duration::from_millis(20),
        );

        let result = manager.generate(&request(), &ResponseSchema::default()).await.unwrap();

        assert_eq!(result.provider, "fallback");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_two_timeouts_exhaust_the_primary() {
        let primary = Arc::new(FailingMockLlm::new(
            "primary",
            2,
            LlmError::Timeout(Duration::from_millis(20)),
        ));
        let fallback = Arc::new(FailingMockLlm::new("fallback", 0, LlmError::Fatal("unused".into())));
        let manager = LlmManager::new(
            vec![primary.clone(), fallback.clone()],
            fast_retry(2),
            Duration::from_secs(1),
        );

        let result = manager.generate(&request(), &ResponseSchema::default()).await.unwrap();

        assert_eq!(result.provider, "fallback");
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let primary = Arc::new(FailingMockLlm::new("primary", 0, LlmError::Fatal("unused".into())));
        let manager = LlmManager::new(vec![primary.clone()], fast_retry(0), Duration::from_secs(1));

        let result = manager.generate(&request(), &ResponseSchema::default()).await.unwrap();

        assert_eq!(result.provider, "primary");
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_on_auth_error() {
        let primary = Arc::new(FailingMockLlm::new(
            "primary",
            10,
            LlmError::RequestFailed("401 Unauthorized".into()),
        ));
        let fallback = Arc::new(FailingMockLlm::new("fallback", 0, LlmError::Fatal("unused".into())));
        let manager = LlmManager::new(
            vec![primary.clone(), fallback.clone()],
            fast_retry(3),
            Duration::from_secs(1),
        );

        let result = manager.generate(&request(), &ResponseSchema::default()).await.unwrap();

        // Should move on immediately without retrying
        assert_eq!(primary.calls(), 1);
        assert_eq!(result.provider, "fallback");
    }

    #[tokio::test]
    async fn test_all_providers_exhausted() {
        let mut primary = MockLlmPort::new();
        primary.expect_name().return_const("primary".to_string());
        primary
            .expect_generate()
            .times(2)
            .returning(|_| Err(LlmError::RateLimited("slow down".into())));

        let mut fallback = MockLlmPort::new();
        fallback.expect_name().return_const("fallback".to_string());
        fallback
            .expect_generate()
            .times(1)
            .returning(|_| Err(LlmError::Fatal("no api key".into())));

        let manager = LlmManager::new(
            vec![Arc::new(primary), Arc::new(fallback)],
            fast_retry(2),
            Duration::from_secs(1),
        );

        let err = manager
            .generate(&request(), &ResponseSchema::default())
            .await
            .unwrap_err();

        let GenerationError::AllProvidersExhausted { failures } = err else {
            panic!("expected exhaustion");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].attempts, 2);
        assert_eq!(failures[1].attempts, 1);
    }

    #[tokio::test]
    async fn test_schema_violation_consumes_retry_budget() {
        let mut provider = MockLlmPort::new();
        provider.expect_name().return_const("primary".to_string());
        let mut seq = mockall::Sequence::new();
        provider
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(LlmResponse::text("[Error: upstream failed]")));
        provider
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(LlmResponse::text(GOOD)));

        let manager = LlmManager::new(vec![Arc::new(provider)], fast_retry(2), Duration::from_secs(1));

        let result = manager.generate(&request(), &ResponseSchema::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_no_providers() {
        let manager = LlmManager::new(vec![], fast_retry(1), Duration::from_secs(1));
        let err = manager
            .generate(&request(), &ResponseSchema::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NoProviders));
    }

    #[tokio::test]
    async fn test_health_reports_every_provider() {
        let ready = Arc::new(FailingMockLlm::new("ready", 0, LlmError::Fatal("unused".into())));
        let mut broken = MockLlmPort::new();
        broken.expect_name().return_const("broken".to_string());
        broken
            .expect_check_health()
            .times(1)
            .returning(|| Err(LlmError::RequestFailed("connection refused".into())));
        let hanging = Arc::new(HangingLlm {
            calls: AtomicU32::new(0),
        });
        let providers: Vec<Arc<dyn LlmPort>> = vec![ready, Arc::new(broken), hanging];
        let manager = LlmManager::new(providers, fast_retry(1), Duration::from_millis(20));

        let report = manager.health().await;

        let healthy: Vec<(&str, bool)> = report
            .iter()
            .map(|h| (h.provider.as_str(), h.healthy))
            .collect();
        assert_eq!(
            healthy,
            vec![("ready", true), ("broken", false), ("hanging", false)]
        );
    }

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_factor: 0.0, // No jitter for predictable test
        };

        assert_eq!(config.calculate_delay(1), 1000);
        assert_eq!(config.calculate_delay(2), 2000);
        assert_eq!(config.calculate_delay(3), 4000);
        assert_eq!(config.calculate_delay(4), 8000);
        assert_eq!(config.calculate_delay(5), 16000);
        // 1000 * 2^5 = 32000, capped at 30000
        assert_eq!(config.calculate_delay(6), 30000);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            max_retries: 1,
            base_delay_ms: 1000,
            max_delay_ms: 1000,
            jitter_factor: 0.2,
        };
        for _ in 0..50 {
            let delay = config.calculate_delay(1);
            assert!((800..=1200).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn schema_accepts_fenced_json_with_legacy_field_names() {
        let raw = "```json\n{\"text\": \"The rain keeps falling.\", \"tags_en\": [\"rain\"], \"updates\": {\"affinity_change\": {\"luna\": 3}}}\n```";
        let response = ResponseSchema::default().validate(raw, "p").unwrap();

        assert_eq!(response.narrative, "The rain keeps falling.");
        assert_eq!(response.tags, vec!["rain".to_string()]);
        assert_eq!(response.updates.affinity.get("luna"), Some(&3));
    }

    #[test]
    fn schema_rejects_bad_payloads() {
        let schema = ResponseSchema::default();
        let cases = [
            "plain prose, not json",
            "[1, 2, 3]",
            r#"{"visual_prompt": "x"}"#,
            r#"{"narrative": "   "}"#,
            r#"{"narrative": "[Error: quota]"}"#,
            r#"{"narrative": "Hm."}"#,
        ];
        for raw in cases {
            assert!(
                matches!(schema.validate(raw, "p"), Err(LlmError::InvalidResponse(_))),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn schema_enforces_extra_required_fields() {
        let schema = ResponseSchema {
            required_fields: vec!["narrative".into(), "visual_prompt".into()],
            min_narrative_chars: 1,
        };
        assert!(schema.validate(r#"{"narrative": "Hello"}"#, "p").is_err());
        assert!(schema
            .validate(r#"{"narrative": "Hello", "visual_en": "a hall"}"#, "p")
            .is_ok());
    }
}
