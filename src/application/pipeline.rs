//! Per-task execution: render the card, store the artifact, optionally
//! persist the public URL.

use std::sync::Arc;

use metrics::histogram;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::types::{RecordUpdate, RenderOptions, StoredArtifact, UploadTarget};
use crate::infra::browser::ChromeRenderer;
use crate::infra::records::RecordStore;
use crate::infra::storage::ArtifactStore;

/// Uniform failure surface for everything a task can do. Stages return
/// these instead of raising, so the drain loop treats every outcome
/// identically.
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error("props validation failed: {0}")]
    Validation(String),
    #[error("template type `{0}` not found")]
    UnknownTemplate(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("upload failed: {0}")]
    Storage(String),
    #[error("record update failed: {0}")]
    Persistence(String),
}

/// A fully materialized card ready for the render/store/persist sequence.
pub struct CardDocument {
    pub template_type: String,
    pub html: String,
    pub options: RenderOptions,
    pub target: UploadTarget,
    pub record: Option<RecordUpdate>,
}

/// Composes the renderer, artifact store, and record updater into one task
/// execution. Each stage short-circuits on failure: no upload after a failed
/// render, no record update after a failed upload. No stage retries.
pub struct RenderPipeline {
    renderer: Arc<ChromeRenderer>,
    store: Arc<ArtifactStore>,
    records: Arc<RecordStore>,
}

impl RenderPipeline {
    pub fn new(
        renderer: Arc<ChromeRenderer>,
        store: Arc<ArtifactStore>,
        records: Arc<RecordStore>,
    ) -> Self {
        Self {
            renderer,
            store,
            records,
        }
    }

    pub async fn run(&self, document: CardDocument) -> Result<StoredArtifact, PipelineError> {
        let render_started = Instant::now();
        let image = self
            .renderer
            .render(&document.html, &document.options)
            .await
            .map_err(|err| PipelineError::Render(err.to_string()))?;
        histogram!("cartolina_render_ms").record(render_started.elapsed().as_millis() as f64);

        match imagesize::blob_size(&image.bytes) {
            Ok(dimensions) => info!(
                target: "cartolina::pipeline",
                template = %document.template_type,
                width = dimensions.width,
                height = dimensions.height,
                bytes = image.bytes.len(),
                "card rendered"
            ),
            Err(_) => info!(
                target: "cartolina::pipeline",
                template = %document.template_type,
                bytes = image.bytes.len(),
                "card rendered"
            ),
        }

        let upload_started = Instant::now();
        let artifact = self
            .store
            .upload(&image, &document.template_type, &document.target)
            .await
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        histogram!("cartolina_upload_ms").record(upload_started.elapsed().as_millis() as f64);

        if artifact.fallback {
            warn!(
                target: "cartolina::pipeline",
                template = %document.template_type,
                bucket = %artifact.bucket,
                "artifact placed in fallback bucket"
            );
        }

        if let Some(record) = &document.record {
            self.records
                .update_column(record, &artifact.public_url)
                .await
                .map_err(|err| PipelineError::Persistence(err.to_string()))?;
        }

        Ok(artifact)
    }
}
