//! Template registry: maps template types to their card handlers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::application::pipeline::PipelineError;
use crate::application::templates::{
    NOMINATION_DIR, PODCAST_SEO_DIR, PodcastNominationCard, PodcastSeoCard, SPEAKER_SEO_DIR,
    SpeakerSeoCard, TemplateContext, TemplateHandler,
};
use crate::domain::types::StoredArtifact;

/// Registered template metadata, as reported by the listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    #[serde(rename = "type")]
    pub template_type: &'static str,
    pub directory: &'static str,
}

struct Entry {
    directory: &'static str,
    handler: Arc<dyn TemplateHandler>,
}

/// Lookup table from template type to handler. Built once at startup;
/// the queue only ever sees it through an opaque task handler closure.
pub struct TemplateRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl TemplateRegistry {
    /// Register the built-in card templates against a shared context.
    pub fn with_builtin_templates(context: Arc<TemplateContext>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            PodcastNominationCard::TEMPLATE_TYPE,
            Entry {
                directory: NOMINATION_DIR,
                handler: Arc::new(PodcastNominationCard::new(Arc::clone(&context))),
            },
        );
        entries.insert(
            PodcastSeoCard::TEMPLATE_TYPE,
            Entry {
                directory: PODCAST_SEO_DIR,
                handler: Arc::new(PodcastSeoCard::new(Arc::clone(&context))),
            },
        );
        entries.insert(
            SpeakerSeoCard::TEMPLATE_TYPE,
            Entry {
                directory: SPEAKER_SEO_DIR,
                handler: Arc::new(SpeakerSeoCard::new(context)),
            },
        );
        Self { entries }
    }

    /// Run the handler registered for `template_type`. Unregistered types
    /// fail fast without side effects.
    pub async fn dispatch(
        &self,
        template_type: &str,
        props: Value,
    ) -> Result<StoredArtifact, PipelineError> {
        let Some(entry) = self.entries.get(template_type) else {
            debug!(target: "cartolina::registry", template = template_type, "unknown template type");
            return Err(PipelineError::UnknownTemplate(template_type.to_string()));
        };
        entry.handler.handle(props).await
    }

    /// All registered templates, sorted by type for stable listings.
    pub fn list(&self) -> Vec<TemplateInfo> {
        let mut templates: Vec<TemplateInfo> = self
            .entries
            .iter()
            .map(|(template_type, entry)| TemplateInfo {
                template_type: *template_type,
                directory: entry.directory,
            })
            .collect();
        templates.sort_by_key(|info| info.template_type);
        templates
    }

    pub fn template_info(&self, template_type: &str) -> Option<TemplateInfo> {
        self.entries
            .get_key_value(template_type)
            .map(|(template_type, entry)| TemplateInfo {
                template_type: *template_type,
                directory: entry.directory,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::TemplateRegistry;
    use crate::application::pipeline::{PipelineError, RenderPipeline};
    use crate::application::templates::{TemplateAssets, TemplateContext};
    use crate::domain::types::RenderOptions;
    use crate::infra::browser::ChromeRenderer;
    use crate::infra::records::RecordStore;
    use crate::infra::storage::ArtifactStore;
    use crate::infra::supabase::SupabaseClient;

    fn registry() -> TemplateRegistry {
        let client = SupabaseClient::new("http://127.0.0.1:9", "service-key").expect("client");
        let renderer = Arc::new(ChromeRenderer::new(None, Duration::from_secs(1)));
        let store = Arc::new(ArtifactStore::new(client.clone()));
        let records = Arc::new(RecordStore::new(client));
        let pipeline = Arc::new(RenderPipeline::new(renderer, store, records));
        TemplateRegistry::with_builtin_templates(Arc::new(TemplateContext {
            pipeline,
            assets: Arc::new(TemplateAssets::embedded()),
            options: RenderOptions::default(),
        }))
    }

    #[test]
    fn listing_is_sorted_by_type() {
        let types: Vec<&str> = registry()
            .list()
            .iter()
            .map(|info| info.template_type)
            .collect();
        assert_eq!(
            types,
            vec!["podcast-nomination", "podcast-seo", "speaker-seo"]
        );
    }

    #[test]
    fn template_info_reports_the_directory() {
        let registry = registry();
        let info = registry.template_info("podcast-nomination").expect("registered");
        assert_eq!(info.directory, "podcast-nomination-share");
        assert!(registry.template_info("missing-card").is_none());
    }

    #[tokio::test]
    async fn unknown_types_fail_without_side_effects() {
        let err = registry()
            .dispatch("missing-card", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTemplate(name) if name == "missing-card"));
    }
}
