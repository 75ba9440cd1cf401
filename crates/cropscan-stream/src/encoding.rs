//! Frame payload encoding.
//!
//! Frames travel as raw text: `data:<mime>;base64,<payload>`, not wrapped in JSON.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Encode image bytes as a base64 data URL.
pub fn encode_data_url(mime: &str, data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut url = String::with_capacity(encoded.len() + mime.len() + 13);
    url.push_str("data:");
    url.push_str(mime);
    url.push_str(";base64,");
    url.push_str(&encoded);
    url
}

/// Split a base64 data URL into its mime type and decoded bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let data = STANDARD.decode(payload.trim()).ok()?;
    Some((mime.to_string(), data))
}
