//! Podcast link-preview card.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::application::pipeline::{CardDocument, PipelineError};
use crate::domain::types::{RecordUpdate, StoredArtifact, UploadTarget};
use crate::util::image_url::normalize_image_url;

use super::{ImageSwap, SEO_IMAGES_BUCKET, TemplateContext, TemplateHandler, substitute};

pub const PODCAST_SEO_DIR: &str = "podcast-seo";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodcastSeoProps {
    #[serde(default)]
    podcast_id: String,
    #[serde(default)]
    podcast_name: String,
    podcast_image: Option<String>,
}

impl PodcastSeoProps {
    fn validate(&self) -> Result<(), PipelineError> {
        let mut problems = Vec::new();
        if self.podcast_id.trim().is_empty() {
            problems.push("Podcast ID is required");
        }
        if self.podcast_name.trim().is_empty() {
            problems.push("Podcast name is required");
        }
        if let Some(image) = &self.podcast_image {
            if Url::parse(image).is_err() {
                problems.push("Podcast image must be a valid URL");
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(problems.join(", ")))
        }
    }
}

/// Link-preview card persisted back onto the podcast row.
pub struct PodcastSeoCard {
    context: Arc<TemplateContext>,
}

impl PodcastSeoCard {
    pub const TEMPLATE_TYPE: &'static str = "podcast-seo";

    pub fn new(context: Arc<TemplateContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TemplateHandler for PodcastSeoCard {
    async fn handle(&self, props: Value) -> Result<StoredArtifact, PipelineError> {
        let props: PodcastSeoProps =
            serde_json::from_value(props).map_err(|err| PipelineError::Validation(err.to_string()))?;
        props.validate()?;

        let html = self
            .context
            .assets
            .read(&format!("{PODCAST_SEO_DIR}/card.html"))
            .await
            .map_err(|err| PipelineError::Render(err.to_string()))?;

        let text: Vec<(&'static str, String)> =
            vec![("podcastName", props.podcast_name.clone())];
        let mut images = Vec::new();
        if let Some(image) = props.podcast_image.as_deref().filter(|i| !i.trim().is_empty()) {
            images.push(ImageSwap {
                marker: "podcastImage",
                src: normalize_image_url(image),
                alt: props.podcast_name.clone(),
                class: "podcast-image",
            });
        }
        let html = substitute(&html, &text, &[], &images)?;

        let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let document = CardDocument {
            template_type: Self::TEMPLATE_TYPE.to_string(),
            html,
            options: self.context.options.clone(),
            target: UploadTarget {
                bucket: Some(SEO_IMAGES_BUCKET.to_string()),
                base_dir: String::new(),
                file_name: Some(format!("{}-{millis}-v1", props.podcast_id.trim())),
            },
            record: Some(RecordUpdate {
                table: "podcasts".to_string(),
                primary_key_column: "id".to_string(),
                primary_key_value: props.podcast_id.trim().to_string(),
                column: "seo_image_url".to_string(),
            }),
        };
        self.context.pipeline.run(document).await
    }
}

#[cfg(test)]
mod tests {
    use super::PodcastSeoProps;

    fn props(value: serde_json::Value) -> PodcastSeoProps {
        serde_json::from_value(value).expect("props deserialize")
    }

    #[test]
    fn id_and_name_are_required() {
        let err = props(serde_json::json!({})).validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Podcast ID is required"));
        assert!(message.contains("Podcast name is required"));
    }

    #[test]
    fn image_must_be_a_url_when_present() {
        let err = props(serde_json::json!({
            "podcastId": "p1",
            "podcastName": "Engines of Wit",
            "podcastImage": "not a url"
        }))
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("valid URL"));
    }

    #[test]
    fn valid_props_pass() {
        let result = props(serde_json::json!({
            "podcastId": "p1",
            "podcastName": "Engines of Wit",
            "podcastImage": "https://cdn.test/cover.jpg"
        }))
        .validate();
        assert!(result.is_ok());
    }
}
