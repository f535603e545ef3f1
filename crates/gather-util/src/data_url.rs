use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const JPEG_PREFIX: &str = "data:image/jpeg;base64,";

/// Inline a JPEG as a `data:` URL usable as a message image reference.
pub fn jpeg_data_url(bytes: &[u8]) -> String {
    let mut url = String::with_capacity(JPEG_PREFIX.len() + bytes.len().div_ceil(3) * 4);
    url.push_str(JPEG_PREFIX);
    STANDARD.encode_string(bytes, &mut url);
    url
}
