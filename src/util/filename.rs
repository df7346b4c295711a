//! Object naming helpers for the artifact store.

use crate::domain::types::ImageFormat;

/// Restrict a file name to `[A-Za-z0-9._-]` and make sure it carries the
/// canonical extension for the image format. Whitespace-only input gets a
/// generic stem.
pub fn sanitize_file_name(name: &str, format: ImageFormat) -> String {
    let trimmed = name.trim();
    let base = if trimmed.is_empty() {
        fallback_basename("image")
    } else {
        trimmed.to_string()
    };

    let extension = format.extension();
    let with_extension = if base
        .to_ascii_lowercase()
        .ends_with(&format!(".{extension}"))
    {
        base
    } else {
        format!("{base}.{extension}")
    };

    with_extension
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Timestamped default basename for targets that did not supply one.
pub fn fallback_basename(stem: &str) -> String {
    let slugged = slug::slugify(stem);
    let stem = if slugged.is_empty() { "image" } else { &slugged };
    let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("{stem}-{millis}")
}

/// Join a base directory onto a file name, never producing a leading slash.
pub fn build_object_path(base_dir: &str, file_name: &str) -> String {
    let dir = base_dir.trim_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::{build_object_path, fallback_basename, sanitize_file_name};
    use crate::domain::types::ImageFormat;

    #[test]
    fn sanitize_appends_extension_and_replaces_forbidden_chars() {
        assert_eq!(
            sanitize_file_name("my card!.png", ImageFormat::Png),
            "my_card_.png"
        );
        assert_eq!(
            sanitize_file_name("handle_slug", ImageFormat::Jpeg),
            "handle_slug.jpg"
        );
    }

    #[test]
    fn sanitize_keeps_existing_extension_case_insensitively() {
        assert_eq!(
            sanitize_file_name("Card.PNG", ImageFormat::Png),
            "Card.PNG"
        );
    }

    #[test]
    fn sanitize_invents_a_stem_for_blank_input() {
        let name = sanitize_file_name("   ", ImageFormat::Png);
        assert!(name.starts_with("image-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn fallback_basename_slugs_the_stem() {
        let name = fallback_basename("Podcast Nomination!");
        assert!(name.starts_with("podcast-nomination-"));
    }

    #[test]
    fn object_paths_never_start_with_a_slash() {
        assert_eq!(build_object_path("", "a.png"), "a.png");
        assert_eq!(build_object_path("/nominations/", "a.png"), "nominations/a.png");
        assert_eq!(build_object_path("cards", "a.png"), "cards/a.png");
    }
}
