//! Response post-processing
//!
//! The upstream model tends to keep writing after its answer: a canned
//! sign-off, a "Fallback Answer:" section, or an invented next turn of the
//! conversation. The trimmer cuts the reply at the first marker phrase (by
//! priority, not by position) and keeps the marker itself on the end.

/// Marker phrases, highest priority first
pub const DEFAULT_MARKERS: [&str; 6] = [
    "Please let me know if you have any other questions or concerns!",
    "Fallback Answer:",
    "Bot:",
    "bot:",
    "user:",
    "User:",
];

/// Trim a raw chatbot reply using [`DEFAULT_MARKERS`]
#[must_use]
pub fn trim_response(raw: &str) -> String {
    trim_with_markers(raw, &DEFAULT_MARKERS)
}

/// Trim a raw chatbot reply at the first marker (in list order) found in it
///
/// The text before the marker's first occurrence is stripped of surrounding
/// whitespace and the marker is appended after a single space. Without a
/// match the whole reply is returned stripped. Empty markers are skipped.
#[must_use]
pub fn trim_with_markers<S: AsRef<str>>(raw: &str, markers: &[S]) -> String {
    for marker in markers.iter().map(AsRef::as_ref) {
        if marker.is_empty() {
            continue;
        }
        if let Some(idx) = raw.find(marker) {
            return format!("{} {}", raw[..idx].trim(), marker);
        }
    }

    raw.trim().to_string()
}

/// Owned marker list, either the defaults or a configured override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTrimmer {
    markers: Vec<String>,
}

impl ResponseTrimmer {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    #[must_use]
    pub fn trim(&self, raw: &str) -> String {
        trim_with_markers(raw, &self.markers)
    }
}

impl Default for ResponseTrimmer {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS.iter().map(ToString::to_string).collect())
    }
}
