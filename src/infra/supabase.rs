//! Shared authenticated client for the hosted storage and PostgREST
//! surfaces.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid project base url: {0}")]
    BaseUrl(String),
    #[error("failed to build http client: {0}")]
    Build(String),
}

/// One project's API surface: base URL plus service-role credentials baked
/// into default headers. Cheap to clone; the storage and record adapters
/// share a single connection pool through it.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_role_key: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|err| ClientError::BaseUrl(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::BaseUrl(format!(
                "`{base_url}` cannot carry path segments"
            )));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {service_role_key}"))
            .map_err(|err| ClientError::Build(err.to_string()))?;
        let apikey = HeaderValue::from_str(service_role_key)
            .map_err(|err| ClientError::Build(err.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("apikey", apikey);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;

        Ok(Self { http, base })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Join path segments onto the project base URL. Each segment is
    /// percent-encoded independently; callers split object paths on `/`
    /// before passing them in.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut parts) = url.path_segments_mut() {
            parts.pop_if_empty();
            for segment in segments {
                parts.push(segment);
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::SupabaseClient;

    #[test]
    fn endpoint_joins_segments_onto_the_base() {
        let client =
            SupabaseClient::new("https://project.supabase.test", "service-key").expect("client");
        let url = client.endpoint(&["storage", "v1", "bucket", "seo-images"]);
        assert_eq!(
            url.as_str(),
            "https://project.supabase.test/storage/v1/bucket/seo-images"
        );
    }

    #[test]
    fn endpoint_percent_encodes_each_segment() {
        let client =
            SupabaseClient::new("https://project.supabase.test", "service-key").expect("client");
        let url = client.endpoint(&["rest", "v1", "my table"]);
        assert_eq!(
            url.as_str(),
            "https://project.supabase.test/rest/v1/my%20table"
        );
    }

    #[test]
    fn opaque_base_urls_are_rejected() {
        assert!(SupabaseClient::new("mailto:ops@example.com", "key").is_err());
        assert!(SupabaseClient::new("not a url", "key").is_err());
    }
}
