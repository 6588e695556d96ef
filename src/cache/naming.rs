//! Cache filename derivation (spec §4.2.1, §6.4, and the open question in §9)

use crate::core::ChapterId;

/// Fallback extension when the URL supplies none, or an unusable one.
const DEFAULT_EXTENSION: &str = "jpg";

/// Derive the extension from a URL's path, ignoring query string and fragment.
///
/// Resolution pinned by this implementation (spec §9 leaves this
/// underspecified in source): take the last path segment, split on its
/// final `.`. If there is no `.`, the candidate extension is empty, longer
/// than 5 characters, or contains a `/`, fall back to [`DEFAULT_EXTENSION`].
/// Double extensions (`page.jpg.webp`) yield the last one, matching how a
/// real decoder would sniff the bytes anyway.
pub fn derive_extension(url: &str) -> &'static str {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let last_segment = without_query.rsplit('/').next().unwrap_or(without_query);

    match last_segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 && !ext.contains('/') => {
            leak_lowercase(ext)
        }
        _ => DEFAULT_EXTENSION,
    }
}

/// Intern a lowercased, bounded-length extension as a `'static str`.
/// Extensions are drawn from a small, bounded alphabet (image file types),
/// so the churn here is negligible relative to the download it names.
fn leak_lowercase(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" => "jpg",
        "jpeg" => "jpeg",
        "png" => "png",
        "webp" => "webp",
        "gif" => "gif",
        "bmp" => "bmp",
        "avif" => "avif",
        _ => DEFAULT_EXTENSION,
    }
}

/// Compute the stable on-disk filename for a `(chapter_id, url)` pair
/// (spec §6.4): `url_encode(chapter_id) + "_" + url_encode(remote_url) + "." + extension`.
pub fn cache_filename(chapter_id: &ChapterId, url: &str) -> String {
    let extension = derive_extension(url);
    format!(
        "{}_{}.{extension}",
        urlencoding::encode(chapter_id.as_str()),
        urlencoding::encode(url)
    )
}

/// The `chapter_id` prefix a filename must start with to belong to that chapter,
/// used by [`crate::cache::ImageCache::evict_chapter`].
pub fn chapter_prefix(chapter_id: &ChapterId) -> String {
    format!("{}_", urlencoding::encode(chapter_id.as_str()))
}
