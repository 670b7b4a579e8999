//! Naming rules for image objects held in the bucket.
//!
//! Object names are the uploaded file's base name, kept verbatim (case included).
//! Extension checks are case-insensitive.

use std::path::Path;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const PNG_CONTENT_TYPE: &str = "image/png";
pub const JSON_CONTENT_TYPE: &str = "application/json";

const JPEG_EXTENSIONS: [&str; 2] = [".jpg", ".jpeg"];

/// Longest object name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// True when `name` ends in `.jpg` or `.jpeg`, ignoring ASCII case.
pub fn is_jpeg_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    JPEG_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Keep only image names, preserving the listing order.
///
/// Sidecar `.json` objects share the namespace and are filtered out here.
pub fn filter_jpeg_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    names.into_iter().filter(|n| is_jpeg_name(n)).collect()
}

/// Content type used when serving a cached object.
pub fn serving_content_type(name: &str) -> &'static str {
    if name.to_ascii_lowercase().ends_with(".png") {
        PNG_CONTENT_TYPE
    } else {
        JPEG_CONTENT_TYPE
    }
}

/// Name of the metadata object for `image_name`: the extension is replaced by `.json`.
///
/// `photo.JPG` -> `photo.json`. A name without an extension gets `.json` appended.
pub fn sidecar_name(image_name: &str) -> String {
    match image_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{}.json", stem),
        _ => format!("{}.json", image_name),
    }
}

/// Reduce a client-supplied filename to its final path component.
///
/// Browsers on some platforms send full paths, including Windows-style ones,
/// so both separators are honoured. Returns `None` for empty, `.` and `..`.
pub fn base_name(filename: &str) -> Option<String> {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    match last {
        "" | "." | ".." => None,
        other => Some(other.to_string()),
    }
}

/// Check that `name` can be both stored and served from the local cache.
///
/// A valid name is a single path component: no separators, not `.` or `..`, no
/// leading dot (reserved for cache bookkeeping), no control characters, and at
/// most `MAX_NAME_LEN` bytes. Returns the reason for the first violation.
pub fn check_object_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("too long");
    }
    if name == "." || name == ".." {
        return Err("parent directory reference");
    }
    if name.starts_with('.') {
        return Err("hidden name");
    }
    if name.contains(['/', '\\']) {
        return Err("path separator");
    }
    if name.chars().any(char::is_control) {
        return Err("control character");
    }
    Ok(())
}

/// Base name of a local file as a UTF-8 string.
pub fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_detection_is_case_insensitive() {
        assert!(is_jpeg_name("photo.jpg"));
        assert!(is_jpeg_name("photo.JPG"));
        assert!(is_jpeg_name("holiday.JpEg"));
        assert!(!is_jpeg_name("document.pdf"));
        assert!(!is_jpeg_name("photo.json"));
        assert!(!is_jpeg_name("jpg"));
    }

    #[test]
    fn test_filter_excludes_sidecars_and_keeps_order() {
        let names = vec![
            "b.jpg".to_string(),
            "b.json".to_string(),
            "a.jpeg".to_string(),
            "notes.txt".to_string(),
            "C.JPG".to_string(),
        ];
        assert_eq!(filter_jpeg_names(names), vec!["b.jpg", "a.jpeg", "C.JPG"]);
    }

    #[test]
    fn test_sidecar_name() {
        assert_eq!(sidecar_name("photo.JPG"), "photo.json");
        assert_eq!(sidecar_name("my.trip.jpeg"), "my.trip.json");
        assert_eq!(sidecar_name("noext"), "noext.json");
    }

    #[test]
    fn test_serving_content_type() {
        assert_eq!(serving_content_type("a.png"), "image/png");
        assert_eq!(serving_content_type("a.PNG"), "image/png");
        assert_eq!(serving_content_type("a.jpg"), "image/jpeg");
        assert_eq!(serving_content_type("a"), "image/jpeg");
    }

    #[test]
    fn test_base_name_strips_directories() {
        assert_eq!(base_name("photo.JPG").as_deref(), Some("photo.JPG"));
        assert_eq!(base_name("/tmp/x/photo.jpg").as_deref(), Some("photo.jpg"));
        assert_eq!(
            base_name(r"C:\Users\me\photo.jpeg").as_deref(),
            Some("photo.jpeg")
        );
        assert_eq!(base_name(""), None);
        assert_eq!(base_name("dir/"), None);
        assert_eq!(base_name(".."), None);
        assert_eq!(base_name(" photo.jpg").as_deref(), Some(" photo.jpg"));
        assert_eq!(base_name("dir/photo.jpg ").as_deref(), Some("photo.jpg "));
    }

    #[test]
    fn test_check_object_name() {
        assert_eq!(check_object_name("photo.jpg"), Ok(()));
        assert_eq!(check_object_name("my..trip.jpg"), Ok(()));
        assert_eq!(check_object_name("50%off.jpg"), Ok(()));
        assert_eq!(check_object_name(""), Err("empty"));
        assert_eq!(check_object_name(".."), Err("parent directory reference"));
        assert_eq!(check_object_name(".hidden.jpg"), Err("hidden name"));
        assert_eq!(check_object_name("a/b.jpg"), Err("path separator"));
        assert_eq!(check_object_name("a\\b.jpg"), Err("path separator"));
        assert_eq!(check_object_name("a\nb.jpg"), Err("control character"));
        let long = format!("{}.jpg", "x".repeat(MAX_NAME_LEN));
        assert_eq!(check_object_name(&long), Err("too long"));
    }
}
