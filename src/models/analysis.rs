//! Title/description record produced by the content analyzer.

use serde::{Deserialize, Serialize};

pub const SENTINEL_TITLE: &str = "error encountered in generating title";
pub const SENTINEL_DESCRIPTION: &str = "error encountered in generating description";

/// Analysis of a single uploaded image.
///
/// Stored next to the image as a `<stem>.json` sidecar object. Both fields are
/// required when parsing; a record missing either is not an `AnalysisResult`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Short human-readable title.
    pub title: String,

    /// Longer free-form description of the image contents.
    pub description: String,
}

impl AnalysisResult {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Placeholder used whenever the analyzer output cannot be interpreted.
    pub fn sentinel() -> Self {
        Self::new(SENTINEL_TITLE, SENTINEL_DESCRIPTION)
    }

    pub fn is_sentinel(&self) -> bool {
        self.title == SENTINEL_TITLE && self.description == SENTINEL_DESCRIPTION
    }
}
