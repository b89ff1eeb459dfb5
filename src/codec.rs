//! Conversion between resolved document bytes and the base64 text used at the
//! application boundary.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::AppError;

/// Where a payload came from, which decides whether it still needs encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// Raw binary, e.g. the body of an MTOM attachment.
    Raw,
    /// Text that is already base64, e.g. inline XML content.
    Base64,
}

/// Returns the base64 representation of `bytes`.
///
/// Inline content is passed through untouched: re-encoding an already-base64
/// string corrupts the document.
pub fn to_base64(bytes: &[u8], source: SourceEncoding) -> String {
    match source {
        SourceEncoding::Raw => STANDARD.encode(bytes),
        SourceEncoding::Base64 => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decodes base64 text into raw bytes.
///
/// Whitespace inside the text (line-wrapped payloads) is ignored.
pub fn decode(text: &str) -> Result<Vec<u8>, AppError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 content: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_bytes_are_encoded() {
        assert_eq!(to_base64(b"%PDF-1.4", SourceEncoding::Raw), "JVBERi0xLjQ=");
    }

    #[test]
    fn test_base64_source_is_identity() {
        let inline = b"JVBERi0xLjQ=";
        assert_eq!(to_base64(inline, SourceEncoding::Base64), "JVBERi0xLjQ=");
    }

    #[test]
    fn test_decode_ignores_line_breaks() {
        let decoded = decode("JVBE\r\nRi0x\nLjQ=").unwrap();
        assert_eq!(decoded, b"%PDF-1.4");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not base64!"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_reencoding_raw_is_stable() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let once = to_base64(&bytes, SourceEncoding::Raw);
        let twice = to_base64(&decode(&once).unwrap(), SourceEncoding::Raw);
        assert_eq!(once, twice);
    }
}
