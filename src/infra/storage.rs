//! Artifact store: bucket-ensured uploads with single-fallback placement.

use metrics::counter;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::types::{RenderedImage, StoredArtifact, UploadTarget};
use crate::infra::supabase::SupabaseClient;
use crate::util::filename::{build_object_path, fallback_basename, sanitize_file_name};

/// Catch-all bucket used when the requested bucket cannot be ensured.
pub const FALLBACK_BUCKET: &str = "generated-images";

/// Ceiling applied to buckets this service creates.
const CREATED_BUCKET_SIZE_LIMIT: u64 = 10 * 1024 * 1024;
const CREATED_BUCKET_MIME_TYPES: &[&str] = &["image/png", "image/jpeg"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{bucket}` unavailable: {reason}")]
    BucketUnavailable { bucket: String, reason: String },
    #[error("object `{path}` already exists in bucket `{bucket}`")]
    Collision { bucket: String, path: String },
    #[error("upload to `{bucket}/{path}` failed: {reason}")]
    Upload {
        bucket: String,
        path: String,
        reason: String,
    },
    #[error("storage request failed: {0}")]
    Transport(String),
}

/// Object-storage adapter. Ensures buckets before writing, never
/// overwrites, and reports where an artifact actually landed.
pub struct ArtifactStore {
    client: SupabaseClient,
}

impl ArtifactStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Upload a rendered card, ensuring its bucket first. When the requested
    /// bucket cannot be ensured, falls back exactly once to
    /// [`FALLBACK_BUCKET`]; an unusable fallback fails the upload.
    pub async fn upload(
        &self,
        image: &RenderedImage,
        template_type: &str,
        target: &UploadTarget,
    ) -> Result<StoredArtifact, StorageError> {
        let requested = target
            .bucket
            .clone()
            .unwrap_or_else(|| FALLBACK_BUCKET.to_string());
        let file_name = sanitize_file_name(
            target
                .file_name
                .clone()
                .unwrap_or_else(|| fallback_basename(template_type))
                .as_str(),
            image.format,
        );
        let object_path = build_object_path(&target.base_dir, &file_name);

        let (bucket, fallback) = match self.ensure_bucket(&requested).await {
            Ok(()) => (requested, false),
            Err(reason) if requested != FALLBACK_BUCKET => {
                warn!(
                    target: "cartolina::storage",
                    bucket = %requested,
                    reason = %reason,
                    "bucket unavailable, falling back"
                );
                counter!("cartolina_storage_fallback_total").increment(1);
                match self.ensure_bucket(FALLBACK_BUCKET).await {
                    Ok(()) => (FALLBACK_BUCKET.to_string(), true),
                    Err(second) => {
                        return Err(StorageError::BucketUnavailable {
                            bucket: requested,
                            reason: format!("{reason}; fallback also unavailable: {second}"),
                        });
                    }
                }
            }
            Err(reason) => {
                return Err(StorageError::BucketUnavailable {
                    bucket: requested,
                    reason,
                });
            }
        };

        self.put_object(&bucket, &object_path, image).await?;
        let public_url = self.public_url(&bucket, &object_path);
        info!(
            target: "cartolina::storage",
            bucket = %bucket,
            path = %object_path,
            fallback,
            "artifact stored"
        );

        Ok(StoredArtifact {
            bucket,
            object_path,
            public_url,
            fallback,
        })
    }

    /// Publicly resolvable URL for a stored object.
    pub fn public_url(&self, bucket: &str, object_path: &str) -> String {
        let mut segments = vec!["storage", "v1", "object", "public", bucket];
        segments.extend(object_path.split('/'));
        self.client.endpoint(&segments).to_string()
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), String> {
        let url = self.client.endpoint(&["storage", "v1", "bucket", bucket]);
        let response = self
            .client
            .http()
            .get(url)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => self.create_bucket(bucket).await,
            status => Err(format!("bucket lookup returned {status}")),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), String> {
        let url = self.client.endpoint(&["storage", "v1", "bucket"]);
        let body = json!({
            "id": bucket,
            "name": bucket,
            "public": true,
            "file_size_limit": CREATED_BUCKET_SIZE_LIMIT,
            "allowed_mime_types": CREATED_BUCKET_MIME_TYPES,
        });
        let response = self
            .client
            .http()
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if response.status().is_success() {
            info!(target: "cartolina::storage", bucket, "bucket created");
            Ok(())
        } else {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            Err(format!("bucket creation returned {status}: {detail}"))
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        object_path: &str,
        image: &RenderedImage,
    ) -> Result<(), StorageError> {
        let mut segments = vec!["storage", "v1", "object", bucket];
        segments.extend(object_path.split('/'));
        let url = self.client.endpoint(&segments);

        let response = self
            .client
            .http()
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, image.format.mime())
            .header("x-upsert", "false")
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|err| StorageError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::CONFLICT => Err(StorageError::Collision {
                bucket: bucket.to_string(),
                path: object_path.to_string(),
            }),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(StorageError::Upload {
                    bucket: bucket.to_string(),
                    path: object_path.to_string(),
                    reason: format!("{status}: {detail}"),
                })
            }
        }
    }
}
