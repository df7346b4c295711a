//! Avatar/image URL normalization.
//!
//! Social platforms hand out resized variants (`avatar_normal.jpg`,
//! `photo_small.png?size=200`); cards want the original, so the query string
//! and a trailing size suffix are stripped before the URL reaches the page.

use url::Url;

/// Size suffixes stripped from the last path segment, checked in order;
/// only the first match is removed.
const SIZE_SUFFIXES: &[&str] = &[
    "_normal",
    "_small",
    "_large",
    "_medium",
    "_thumb",
    "_thumbnail",
    "_mini",
    "_big",
    "_original",
    "_square",
    "_circle",
    "_round",
];

/// Remove query parameters and a trailing size suffix from an image URL.
/// Input that does not parse as a URL is returned with only the query
/// stripped.
pub fn normalize_image_url(raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }

    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);

            let mut segments: Vec<String> = url
                .path_segments()
                .map(|parts| parts.map(str::to_string).collect())
                .unwrap_or_default();

            let mut changed = false;
            if let Some(last) = segments.last_mut() {
                let cleaned = strip_size_suffix(last);
                if cleaned != *last {
                    *last = cleaned;
                    changed = true;
                }
            }
            if changed {
                url.set_path(&segments.join("/"));
            }

            url.to_string()
        }
        Err(_) => {
            let without_query = raw.split('?').next().unwrap_or(raw);
            strip_size_suffix(without_query)
        }
    }
}

fn strip_size_suffix(file_name: &str) -> String {
    let Some(dot) = file_name.rfind('.') else {
        return file_name.to_string();
    };
    let (stem, extension) = file_name.split_at(dot);

    for suffix in SIZE_SUFFIXES {
        if let Some(base) = stem.strip_suffix(suffix) {
            return format!("{base}{extension}");
        }
    }
    file_name.to_string()
}
