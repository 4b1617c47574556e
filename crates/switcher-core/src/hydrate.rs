//! Hydration templating.

use crate::types::HydrationPayload;

/// Placeholder replaced by the serialized hydration payload.
pub const HYDRATION_MARKER: &str = "{{HYDRATION_STATE}}";

/// Replaces the first [`HYDRATION_MARKER`] in `text` with `payload` as JSON.
///
/// Text without the marker is returned unchanged. Later occurrences of the
/// marker are left as-is.
///
/// # Example
///
/// ```
/// use switcher_core::{hydrate, HydrationPayload};
///
/// let payload = HydrationPayload::new().with("hydrated", "yes");
/// let out = hydrate("<html>{{HYDRATION_STATE}}</html>", &payload);
/// assert_eq!(out, r#"<html>{"hydrated":"yes"}</html>"#);
/// ```
#[must_use]
pub fn hydrate(text: &str, payload: &HydrationPayload) -> String {
    if text.contains(HYDRATION_MARKER) {
        text.replacen(HYDRATION_MARKER, &payload.to_json(), 1)
    } else {
        text.to_string()
    }
}
