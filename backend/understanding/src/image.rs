//! Image encoding for transport.
//!
//! Browsers hand us `data:image/png;base64,...` strings; the inference
//! provider wants raw bytes. Bare base64 (no prefix) is accepted as well.

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use once_cell::sync::Lazy;
use regex::Regex;

use crowdhealth_core::{CrowdError, Result};

static DATA_URL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(?P<mime>[\w.+-]+/[\w.+-]+)?(?:;[\w.+-]+=[\w.+-]+)*;base64,").unwrap()
});

/// Raw image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Strip a data-URL prefix if present and decode the base64 payload.
pub fn decode_data_url(input: &str) -> Result<DecodedImage> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CrowdError::validation("Image is required"));
    }

    let (declared_mime, payload) = match DATA_URL_PREFIX.captures(input) {
        Some(caps) => {
            let prefix_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (caps.name("mime").map(|m| m.as_str().to_string()), &input[prefix_len..])
        }
        None => (None, input),
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CrowdError::validation(format!("Image is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(CrowdError::validation("Image is empty"));
    }

    let mime = declared_mime
        .or_else(|| sniff_mime(&bytes).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(DecodedImage { mime, bytes })
}

/// Encode raw bytes as a `data:<mime>;base64,` URL.
pub fn encode_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Detect an image MIME type from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [b'B', b'M', ..] => Some("image/bmp"),
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some("image/tiff"),
        [_, _, _, _, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c', ..] => Some("image/heic"),
        _ => None,
    }
}

/// MIME type for an image file, by extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Encode a file's bytes for upload, preferring sniffed content over the extension.
pub fn encode_file(path: &Path, bytes: &[u8]) -> String {
    let mime = sniff_mime(bytes).unwrap_or_else(|| mime_for_path(path));
    encode_data_url(bytes, mime)
}
