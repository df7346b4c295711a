//! Podcast nomination share card.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::application::pipeline::{CardDocument, PipelineError};
use crate::domain::types::{StoredArtifact, UploadTarget};
use crate::util::handle::clean_handle;
use crate::util::image_url::normalize_image_url;
use crate::util::text::{extract_initials, format_count};

use super::{ImageSwap, SEO_IMAGES_BUCKET, TemplateContext, TemplateHandler, substitute};

pub const NOMINATION_DIR: &str = "podcast-nomination-share";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NominationProps {
    #[serde(default)]
    guest_name: String,
    #[serde(default)]
    guest_bio: String,
    #[serde(default)]
    guest_image: String,
    #[serde(default)]
    podcast_name: String,
    #[serde(default)]
    podcast_slug: String,
    podcast_followers: Option<u64>,
    #[serde(default)]
    podcast_image: String,
    vote_count: Option<u64>,
    #[serde(default)]
    x_handle: String,
}

impl NominationProps {
    fn validate(&self) -> Result<(), PipelineError> {
        let mut problems = Vec::new();
        if self.guest_name.trim().is_empty() {
            problems.push("guestName is required");
        }
        if self.podcast_name.trim().is_empty() {
            problems.push("podcastName is required");
        }
        if self.podcast_slug.trim().is_empty() {
            problems.push("podcastSlug is required");
        }
        if clean_handle(&self.x_handle).is_empty() {
            problems.push("xHandle is required");
        }
        if self.vote_count == Some(0) {
            problems.push("voteCount must be positive");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(problems.join(", ")))
        }
    }
}

/// Share card for "vote for this guest on this podcast" nominations.
pub struct PodcastNominationCard {
    context: Arc<TemplateContext>,
}

impl PodcastNominationCard {
    pub const TEMPLATE_TYPE: &'static str = "podcast-nomination";

    pub fn new(context: Arc<TemplateContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TemplateHandler for PodcastNominationCard {
    async fn handle(&self, props: Value) -> Result<StoredArtifact, PipelineError> {
        let props: NominationProps =
            serde_json::from_value(props).map_err(|err| PipelineError::Validation(err.to_string()))?;
        props.validate()?;

        let html = self
            .context
            .assets
            .read(&format!("{NOMINATION_DIR}/card.html"))
            .await
            .map_err(|err| PipelineError::Render(err.to_string()))?;

        let mut text: Vec<(&'static str, String)> = vec![
            ("guestName", props.guest_name.clone()),
            ("guestBadge", props.guest_name.clone()),
            ("guestInitials", extract_initials(&props.guest_name)),
            ("podcastName", props.podcast_name.clone()),
            ("podcastBadge", props.podcast_name.clone()),
            ("voteSubtitle", vote_subtitle(props.vote_count)),
        ];
        let mut remove: Vec<&'static str> = Vec::new();

        if props.guest_bio.trim().is_empty() {
            remove.push("guestBio");
        } else {
            text.push(("guestBio", props.guest_bio.clone()));
        }
        match props.podcast_followers {
            Some(count) => text.push((
                "podcastFollowers",
                format!("{} followers", format_count(count)),
            )),
            None => remove.push("podcastFollowers"),
        }

        let mut images = Vec::new();
        if !props.guest_image.trim().is_empty() {
            images.push(ImageSwap {
                marker: "guestImage",
                src: normalize_image_url(&props.guest_image),
                alt: props.guest_name.clone(),
                class: "profile-image",
            });
        }
        if !props.podcast_image.trim().is_empty() {
            images.push(ImageSwap {
                marker: "podcastImage",
                src: normalize_image_url(&props.podcast_image),
                alt: props.podcast_name.clone(),
                class: "podcast-image",
            });
        }

        let html = substitute(&html, &text, &remove, &images)?;

        let file_name = format!(
            "{}_{}",
            clean_handle(&props.x_handle),
            props.podcast_slug.trim()
        );
        let document = CardDocument {
            template_type: Self::TEMPLATE_TYPE.to_string(),
            html,
            options: self.context.options.clone(),
            target: UploadTarget {
                bucket: Some(SEO_IMAGES_BUCKET.to_string()),
                base_dir: "nominations".to_string(),
                file_name: Some(file_name),
            },
            record: None,
        };
        self.context.pipeline.run(document).await
    }
}

fn vote_subtitle(vote_count: Option<u64>) -> String {
    match vote_count {
        None | Some(0) => "Be the first to vote to see this conversation happen".to_string(),
        Some(1) => "Join 1 person who wants to see this conversation happen".to_string(),
        Some(count) => format!(
            "Join {} people who want to see this conversation happen",
            format_count(count)
        ),
    }
}
