//! Card templates: props validation, `data-dynamic` substitution, and
//! pipeline hand-off.
//!
//! Each card's markup carries `data-dynamic="<marker>"` attributes; handlers
//! fill the markers with validated props before the page ever reaches the
//! renderer. Substitution failures, like every other stage, surface as a
//! [`PipelineError`] rather than crossing the queue as a panic.

mod assets;
mod nomination;
mod podcast;
mod speaker;

pub use assets::{TemplateAssetError, TemplateAssets};
pub use nomination::{NOMINATION_DIR, PodcastNominationCard};
pub use podcast::{PODCAST_SEO_DIR, PodcastSeoCard};
pub use speaker::{SPEAKER_SEO_DIR, SpeakerSeoCard};

use std::sync::Arc;

use async_trait::async_trait;
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use serde_json::Value;

use crate::application::pipeline::{PipelineError, RenderPipeline};
use crate::domain::types::{RenderOptions, StoredArtifact};

/// Bucket receiving publicly shared card imagery.
pub(crate) const SEO_IMAGES_BUCKET: &str = "seo-images";

/// A template-specific card builder. Implementations own validation and
/// substitution, then delegate to the shared pipeline.
#[async_trait]
pub trait TemplateHandler: Send + Sync {
    async fn handle(&self, props: Value) -> Result<StoredArtifact, PipelineError>;
}

/// Shared capabilities handed to every card handler.
pub struct TemplateContext {
    pub pipeline: Arc<RenderPipeline>,
    pub assets: Arc<TemplateAssets>,
    pub options: RenderOptions,
}

/// Replace a `data-dynamic` placeholder element with an `<img>` tag.
pub(crate) struct ImageSwap {
    pub marker: &'static str,
    pub src: String,
    pub alt: String,
    pub class: &'static str,
}

/// Apply `data-dynamic` substitutions to card markup: text mappings set
/// element content (markup-escaped), `remove` deletes optional blocks, and
/// image swaps replace placeholders with `<img>` elements.
pub(crate) fn substitute(
    html: &str,
    text: &[(&'static str, String)],
    remove: &[&'static str],
    images: &[ImageSwap],
) -> Result<String, PipelineError> {
    let mut handlers = Vec::new();

    for (marker, value) in text {
        let value = value.clone();
        handlers.push(element!(marker_selector(marker), move |el| {
            el.set_inner_content(&value, ContentType::Text);
            Ok(())
        }));
    }

    for marker in remove {
        handlers.push(element!(marker_selector(marker), |el| {
            el.remove();
            Ok(())
        }));
    }

    for swap in images {
        let tag = format!(
            "<img src=\"{}\" alt=\"{}\" class=\"{}\">",
            escape_attribute(&swap.src),
            escape_attribute(&swap.alt),
            swap.class,
        );
        handlers.push(element!(marker_selector(swap.marker), move |el| {
            el.replace(&tag, ContentType::Html);
            Ok(())
        }));
    }

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| PipelineError::Render(format!("template substitution failed: {err}")))
}

fn marker_selector(marker: &str) -> String {
    format!("[data-dynamic=\"{marker}\"]")
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::{ImageSwap, substitute};

    const CARD: &str = r#"<div>
        <h1 data-dynamic="guestName">Guest</h1>
        <p data-dynamic="guestBio">Bio goes here</p>
        <span data-dynamic="guestImage">GI</span>
    </div>"#;

    #[test]
    fn text_mappings_fill_markers_and_escape_markup() {
        let out = substitute(
            CARD,
            &[("guestName", "Ada <Lovelace>".to_string())],
            &[],
            &[],
        )
        .expect("rewrite succeeds");
        assert!(out.contains("Ada &lt;Lovelace&gt;"));
        assert!(!out.contains(">Guest<"));
    }

    #[test]
    fn optional_blocks_are_removed() {
        let out = substitute(CARD, &[], &["guestBio"], &[]).expect("rewrite succeeds");
        assert!(!out.contains("guestBio"));
        assert!(!out.contains("Bio goes here"));
    }

    #[test]
    fn image_swaps_replace_the_placeholder() {
        let out = substitute(
            CARD,
            &[],
            &[],
            &[ImageSwap {
                marker: "guestImage",
                src: "https://cdn.test/a.png".to_string(),
                alt: "Ada \"the\" host".to_string(),
                class: "profile-image",
            }],
        )
        .expect("rewrite succeeds");
        assert!(out.contains(r#"<img src="https://cdn.test/a.png""#));
        assert!(out.contains("&quot;the&quot;"));
        assert!(out.contains(r#"class="profile-image""#));
        assert!(!out.contains(">GI<"));
    }

    #[test]
    fn unmatched_markers_leave_markup_untouched() {
        let out = substitute(CARD, &[("missing", "x".to_string())], &[], &[])
            .expect("rewrite succeeds");
        assert!(out.contains(">Guest<"));
    }
}
