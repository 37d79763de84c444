//! HTTP image generation client
//!
//! Implements [`ImageGenPort`] against a render service that accepts a JSON
//! prompt and answers with the encoded image bytes.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::infrastructure::ports::{ImageGenError, ImageGenPort, ImageRequest, ImageResult};

#[derive(Clone)]
pub struct HttpImageRenderer {
    client: Client,
    base_url: String,
}

impl HttpImageRenderer {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300)) // 5 minute timeout for generation
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RenderBody<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
}

/// Maps a response content type to a file extension.
fn format_from_content_type(content_type: Option<&str>) -> String {
    match content_type {
        Some(ct) if ct.contains("jpeg") || ct.contains("jpg") => "jpeg",
        Some(ct) if ct.contains("webp") => "webp",
        _ => "png",
    }
    .to_string()
}

#[async_trait]
impl ImageGenPort for HttpImageRenderer {
    async fn generate(&self, request: ImageRequest) -> Result<ImageResult, ImageGenError> {
        let response = self
            .client
            .post(format!("{}/render", self.base_url))
            .json(&RenderBody {
                prompt: &request.prompt,
                width: request.width,
                height: request.height,
            })
            .send()
            .await
            .map_err(|e| ImageGenError::GenerationFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ImageGenError::GenerationFailed(error_text));
        }

        let format = format_from_content_type(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );

        let image_data = response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ImageGenError::GenerationFailed(e.to_string()))?;

        if image_data.is_empty() {
            return Err(ImageGenError::GenerationFailed(
                "render service returned no data".to_string(),
            ));
        }

        Ok(ImageResult { image_data, format })
    }

    async fn check_health(&self) -> Result<bool, ImageGenError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|_| ImageGenError::Unavailable)?;

        Ok(response.status().is_success())
    }
}
