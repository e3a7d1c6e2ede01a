//! Product image lists.
//!
//! Locally an item carries a list of image URLs; remotely a product carries
//! `[{"id", "src", "name", ...}]`. The remote copies an uploaded image to its
//! own media library, so the two sides agree on the file name and nothing
//! else. Every comparison here is by file name, case-insensitively.

use crate::record::Record;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Field holding the image list on both sides.
pub const IMAGES_FIELD: &str = "images";

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Returns the last path segment of `url`, without query or fragment.
pub fn image_file_name(url: &str) -> &str {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Returns true if `url` names a file with a supported image extension.
pub fn is_image_url(url: &str) -> bool {
    image_file_name(url)
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
        })
}

fn same_file(a: &str, b: &str) -> bool {
    image_file_name(a).eq_ignore_ascii_case(image_file_name(b))
}

/// Reads the source URL of one image entry, either `{"src": ..}` or a bare string.
pub fn image_src(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("src").and_then(Value::as_str),
        _ => None,
    }
    .map(str::trim)
    .filter(|s| !s.is_empty())
}

/// Collects image URLs from a list (or a single URL), keeping the first
/// occurrence of each URL and dropping anything that is not an image.
pub fn image_urls(value: &Value) -> Vec<String> {
    let entries: &[Value] = match value {
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    };
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(image_src)
        .filter(|src| is_image_url(src))
        .filter(|src| seen.insert(src.to_string()))
        .map(str::to_string)
        .collect()
}

/// Removes an empty image list so that "no images" has one representation.
pub fn prune_images(record: &mut Record) {
    let empty = match record.get(IMAGES_FIELD) {
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Null) => true,
        _ => false,
    };
    if empty {
        record.remove(IMAGES_FIELD);
    }
}

/// Rewrites a remote image list into the local vocabulary.
///
/// Each remote entry whose file name matches a local image becomes
/// `{"src": <local url>}`; any other entry keeps its remote URL. Remote ids
/// and names are dropped.
pub fn align_images(remote: &mut Record, local: &Record) {
    let Some(Value::Array(entries)) = remote.get(IMAGES_FIELD) else {
        prune_images(remote);
        return;
    };
    let local_urls = local.get(IMAGES_FIELD).map(image_urls).unwrap_or_default();
    let mut seen = HashSet::new();
    let aligned: Vec<Value> = entries
        .iter()
        .filter_map(image_src)
        .filter(|src| is_image_url(src))
        .map(|src| {
            local_urls
                .iter()
                .find(|url| same_file(url, src))
                .map_or(src, String::as_str)
                .to_string()
        })
        .filter(|src| seen.insert(src.clone()))
        .map(|src| json!({ "src": src }))
        .collect();
    remote.insert(IMAGES_FIELD, Value::Array(aligned));
    prune_images(remote);
}

/// Finds the remote id of an image with the same file name as `src`.
pub fn find_image_id<'a>(remote: &'a Record, src: &str) -> Option<&'a Value> {
    match remote.get(IMAGES_FIELD)? {
        Value::Array(entries) => entries
            .iter()
            .filter(|entry| image_src(entry).is_some_and(|s| same_file(s, src)))
            .find_map(|entry| entry.get("id").filter(|id| !id.is_null())),
        _ => None,
    }
}
