//! Speaker profile link-preview card.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::application::pipeline::{CardDocument, PipelineError};
use crate::domain::types::{RecordUpdate, StoredArtifact, UploadTarget};
use crate::util::image_url::normalize_image_url;
use crate::util::text::extract_initials;

use super::{ImageSwap, SEO_IMAGES_BUCKET, TemplateContext, TemplateHandler, substitute};

pub const SPEAKER_SEO_DIR: &str = "speaker-seo";

/// Tables a speaker row may live in; anything else is rejected up front so a
/// task can never write into an arbitrary table.
const SOURCE_TABLES: &[&str] = &["profiles", "reserved_profiles"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeakerSeoProps {
    #[serde(default)]
    speaker_id: String,
    #[serde(default)]
    speaker_name: String,
    speaker_image: Option<String>,
    #[serde(default)]
    source_table: String,
}

impl SpeakerSeoProps {
    fn validate(&self) -> Result<(), PipelineError> {
        let mut problems = Vec::new();
        if self.speaker_id.trim().is_empty() {
            problems.push("Speaker ID is required");
        }
        if self.speaker_name.trim().is_empty() {
            problems.push("Speaker name is required");
        }
        if let Some(image) = &self.speaker_image {
            if !image.is_empty() && Url::parse(image).is_err() {
                problems.push("Speaker image must be a valid URL");
            }
        }
        if !SOURCE_TABLES.contains(&self.source_table.as_str()) {
            problems.push("Table name must be either 'profiles' or 'reserved_profiles'");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(problems.join(", ")))
        }
    }
}

/// Link-preview card persisted back onto the speaker's source row.
pub struct SpeakerSeoCard {
    context: Arc<TemplateContext>,
}

impl SpeakerSeoCard {
    pub const TEMPLATE_TYPE: &'static str = "speaker-seo";

    pub fn new(context: Arc<TemplateContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TemplateHandler for SpeakerSeoCard {
    async fn handle(&self, props: Value) -> Result<StoredArtifact, PipelineError> {
        let props: SpeakerSeoProps =
            serde_json::from_value(props).map_err(|err| PipelineError::Validation(err.to_string()))?;
        props.validate()?;

        let html = self
            .context
            .assets
            .read(&format!("{SPEAKER_SEO_DIR}/card.html"))
            .await
            .map_err(|err| PipelineError::Render(err.to_string()))?;

        let text: Vec<(&'static str, String)> = vec![
            ("speakerName", props.speaker_name.clone()),
            ("speakerInitials", extract_initials(&props.speaker_name)),
        ];
        let mut images = Vec::new();
        if let Some(image) = props.speaker_image.as_deref().filter(|i| !i.trim().is_empty()) {
            images.push(ImageSwap {
                marker: "speakerImage",
                src: normalize_image_url(image),
                alt: props.speaker_name.clone(),
                class: "speaker-image",
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
                file_name: Some(format!("{}-{millis}-v1", props.speaker_id.trim())),
            },
            record: Some(RecordUpdate {
                table: props.source_table.clone(),
                primary_key_column: "id".to_string(),
                primary_key_value: props.speaker_id.trim().to_string(),
                column: "seo_image_url".to_string(),
            }),
        };
        self.context.pipeline.run(document).await
    }
}

#[cfg(test)]
mod tests {
    use super::SpeakerSeoProps;

    fn props(value: serde_json::Value) -> SpeakerSeoProps {
        serde_json::from_value(value).expect("props deserialize")
    }

    #[test]
    fn source_table_is_restricted() {
        let err = props(serde_json::json!({
            "speakerId": "s1",
            "speakerName": "Ada Lovelace",
            "sourceTable": "users"
        }))
        .validate()
        .unwrap_err();
        assert!(
            err.to_string()
                .contains("either 'profiles' or 'reserved_profiles'")
        );
    }

    #[test]
    fn empty_image_string_is_allowed() {
        let result = props(serde_json::json!({
            "speakerId": "s1",
            "speakerName": "Ada Lovelace",
            "speakerImage": "",
            "sourceTable": "profiles"
        }))
        .validate();
        assert!(result.is_ok());
    }

    #[test]
    fn reserved_profiles_is_accepted() {
        let result = props(serde_json::json!({
            "speakerId": "s1",
            "speakerName": "Ada Lovelace",
            "sourceTable": "reserved_profiles"
        }))
        .validate();
        assert!(result.is_ok());
    }
}
