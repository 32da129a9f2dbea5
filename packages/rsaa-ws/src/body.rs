//! Response body extraction.

use anyhow::Result;

use crate::transport::Response;

/// Statuses that never carry a body.
const EMPTY_BODY_STATUSES: [u16; 2] = [204, 205];

/// Extract the JSON body of a response.
///
/// Returns `None` without reading the body for 204/205 responses, and when
/// the `Content-Type` header is missing or does not mention `json`. Parse
/// failures are returned as errors.
pub async fn extract_body(response: &dyn Response) -> Result<Option<serde_json::Value>> {
    if EMPTY_BODY_STATUSES.contains(&response.status()) {
        return Ok(None);
    }

    match response.header("Content-Type") {
        Some(content_type) if content_type.contains("json") => response.json().await.map(Some),
        _ => Ok(None),
    }
}
