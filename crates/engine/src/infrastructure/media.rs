//! Background media pipeline.
//!
//! Each render runs on its own task and reports through a watch channel, so
//! a turn never waits on image generation. Jobs stop early when their
//! cancellation token fires.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::{
    ImageGenPort, ImageRequest, MediaArtifact, MediaError, MediaJobHandle, MediaPipelinePort,
    MediaStatus, RenderRequest,
};

pub struct SpawningMediaPipeline {
    renderer: Arc<dyn ImageGenPort>,
    output_dir: PathBuf,
}

impl SpawningMediaPipeline {
    pub fn new(renderer: Arc<dyn ImageGenPort>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            output_dir: output_dir.into(),
        }
    }
}

fn render_prompt(request: &RenderRequest) -> String {
    if request.tags.is_empty() {
        request.prompt.clone()
    } else {
        format!("{}, {}", request.prompt, request.tags.join(", "))
    }
}

async fn render_and_store(
    renderer: Arc<dyn ImageGenPort>,
    output_dir: &Path,
    request: &RenderRequest,
) -> Result<MediaArtifact, MediaError> {
    let image = renderer
        .generate(ImageRequest {
            prompt: render_prompt(request),
            width: request.width,
            height: request.height,
        })
        .await?;

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| MediaError::Storage(e.to_string()))?;
    let path = output_dir.join(format!("{}.{}", request.job_id, image.format));
    tokio::fs::write(&path, &image.image_data)
        .await
        .map_err(|e| MediaError::Storage(e.to_string()))?;

    Ok(MediaArtifact {
        path: path.to_string_lossy().into_owned(),
        format: image.format,
        size_bytes: image.image_data.len() as u64,
    })
}

#[async_trait]
impl MediaPipelinePort for SpawningMediaPipeline {
    fn enqueue(&self, request: RenderRequest) -> Result<MediaJobHandle, MediaError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MediaError::Unavailable(e.to_string()))?;

        let job_id = request.job_id;
        let (tx, rx) = watch::channel(MediaStatus::Pending);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let renderer = self.renderer.clone();
        let output_dir = self.output_dir.clone();

        let task = runtime.spawn(async move {
            let status = tokio::select! {
                _ = token.cancelled() => MediaStatus::Cancelled,
                result = render_and_store(renderer, &output_dir, &request) => match result {
                    Ok(artifact) => MediaStatus::Ready { artifact },
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Media job failed");
                        MediaStatus::Failed { reason: e.to_string() }
                    }
                },
            };
            tracing::debug!(job_id = %job_id, status = ?status, "Media job finished");
            // Nobody listening is fine; the session may already be closed.
            let _ = tx.send(status);
        });

        Ok(MediaJobHandle::new(job_id, rx, cancel, task))
    }

    async fn check_health(&self) -> Result<bool, MediaError> {
        Ok(self.renderer.check_health().await?)
    }
}
