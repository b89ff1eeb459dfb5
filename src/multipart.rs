//! Binary-safe splitting of `multipart/related` (MTOM) bodies.
//!
//! The first part is always the SOAP envelope; every later part is an
//! attachment identified by its `Content-ID`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::errors::AppError;

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

fn boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)boundary="?([^";,]+)"?"#).expect("boundary regex is valid")
    })
}

/// One part of a multipart body, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    /// Header names keep their original casing; use [`MultipartPart::header`]
    /// for case-insensitive lookup.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl MultipartPart {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Content-ID` with surrounding angle brackets stripped.
    pub fn content_id(&self) -> Option<&str> {
        self.header("Content-ID").map(normalize_content_id)
    }

    /// Media type of the part without parameters.
    pub fn media_type(&self) -> Option<&str> {
        self.header("Content-Type")
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
    }
}

/// A split MTOM response: the envelope part plus attachments.
#[derive(Debug, Clone, Default)]
pub struct MultipartMessage {
    parts: Vec<MultipartPart>,
}

impl MultipartMessage {
    pub fn new(parts: Vec<MultipartPart>) -> Self {
        Self { parts }
    }

    /// The SOAP envelope part. Never treated as an attachment.
    pub fn envelope(&self) -> Option<&MultipartPart> {
        self.parts.first()
    }

    /// Every part after the envelope.
    pub fn attachments(&self) -> &[MultipartPart] {
        self.parts.get(1..).unwrap_or(&[])
    }

    /// Exact `Content-ID` match among attachments. `cid:` and angle brackets
    /// are stripped from `content_id` before comparing.
    pub fn find_attachment(&self, content_id: &str) -> Option<&MultipartPart> {
        let wanted = normalize_content_id(strip_cid_prefix(content_id));
        self.attachments()
            .iter()
            .find(|part| part.content_id() == Some(wanted))
    }
}

/// Extracts the `boundary` parameter from a `Content-Type` value.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    boundary_regex()
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|b| !b.is_empty())
}

/// Whether a `Content-Type` announces an MTOM body.
pub fn is_multipart_related(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .contains("multipart/related")
}

/// Splits `body` according to the boundary announced in `content_type`.
///
/// Segments lacking a header/body separator are skipped: some servers emit
/// an empty segment before the closing delimiter.
pub fn split(body: &[u8], content_type: &str) -> Result<Vec<MultipartPart>, AppError> {
    let boundary = extract_boundary(content_type).ok_or_else(|| AppError::MalformedMultipart {
        reason: format!("no boundary parameter in content type '{}'", content_type),
        raw_response: body.to_vec(),
    })?;

    let parts = split_with_boundary(body, &boundary);
    if parts.is_empty() {
        return Err(AppError::MalformedMultipart {
            reason: format!("no parts delimited by boundary '{}'", boundary),
            raw_response: body.to_vec(),
        });
    }

    tracing::debug!("Split multipart body into {} part(s)", parts.len());
    Ok(parts)
}

/// Splits on `--{boundary}` delimiters without any line-based decoding.
pub fn split_with_boundary(body: &[u8], boundary: &str) -> Vec<MultipartPart> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let positions = find_all(body, delimiter);
    let mut parts = Vec::new();

    for (i, &start) in positions.iter().enumerate() {
        let segment_start = start + delimiter.len();
        let segment_end = positions.get(i + 1).copied().unwrap_or(body.len());
        let segment = &body[segment_start..segment_end];

        // Closing delimiter `--{boundary}--`
        if segment.starts_with(b"--") {
            break;
        }
        if segment.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        match parse_segment(segment) {
            Some(part) => parts.push(part),
            None => tracing::debug!(
                "Skipping multipart segment {} without header separator ({} bytes)",
                i,
                segment.len()
            ),
        }
    }

    parts
}

/// Reads the boundary from a body that starts with a delimiter line, for
/// servers that send MTOM without announcing it in `Content-Type`.
pub fn sniff_boundary(body: &[u8]) -> Option<String> {
    let rest = body.strip_prefix(b"--")?;
    let line_end = find(rest, CRLF)?;
    let boundary = std::str::from_utf8(&rest[..line_end]).ok()?.trim();

    if boundary.is_empty() || boundary.contains(char::is_whitespace) {
        return None;
    }
    // Needs at least one more delimiter to be a real multipart body
    let delimiter = format!("--{}", boundary);
    if find_all(body, delimiter.as_bytes()).len() < 2 {
        return None;
    }
    Some(boundary.to_string())
}

fn parse_segment(segment: &[u8]) -> Option<MultipartPart> {
    let separator = find(segment, HEADER_SEPARATOR)?;
    let header_block = &segment[..separator];
    let mut body = &segment[separator + HEADER_SEPARATOR.len()..];

    // The CRLF before the next delimiter belongs to the delimiter
    if body.ends_with(CRLF) {
        body = &body[..body.len() - CRLF.len()];
    }

    Some(MultipartPart {
        headers: parse_headers(header_block),
        body: body.to_vec(),
    })
}

fn parse_headers(block: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(block);
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut last_key: Option<String> = None;

    for line in text.split("\r\n") {
        if line.trim().is_empty() {
            continue;
        }
        // Folded continuation line
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(value) = last_key.as_ref().and_then(|k| headers.get_mut(k)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_string();
            headers.insert(name.clone(), value.trim().to_string());
            last_key = Some(name);
        }
    }

    headers
}

/// Strips `<`/`>` around a Content-ID.
pub fn normalize_content_id(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix('<').unwrap_or(value);
    value.strip_suffix('>').unwrap_or(value)
}

/// Strips an optional `cid:` URI scheme.
pub fn strip_cid_prefix(value: &str) -> &str {
    let value = value.trim();
    match value.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("cid:") => &value[4..],
        _ => value,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut offset = 0;
    while let Some(pos) = find(&haystack[offset..], needle) {
        positions.push(offset + pos);
        offset += pos + needle.len();
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = r#"multipart/related; type="application/xop+xml"; boundary="uuid:abc-123"; start="<root>""#;

    fn sample_body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"--uuid:abc-123\r\n");
        body.extend_from_slice(b"Content-Type: application/xop+xml; charset=UTF-8\r\n");
        body.extend_from_slice(b"Content-ID: <root>\r\n\r\n");
        body.extend_from_slice(b"<Envelope/>\r\n");
        body.extend_from_slice(b"--uuid:abc-123\r\n");
        body.extend_from_slice(b"content-id: <doc1>\r\n");
        body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
        body.extend_from_slice(&[0x25, 0x50, 0x44, 0x46, 0x00, 0xff, 0x0d, 0x0a, 0x2d, 0x2d]);
        body.extend_from_slice(b"\r\n--uuid:abc-123--\r\n");
        body
    }

    #[test]
    fn test_extract_boundary_variants() {
        assert_eq!(extract_boundary(CT), Some("uuid:abc-123".into()));
        assert_eq!(
            extract_boundary("multipart/related; boundary=XYZ; type=\"application/xop+xml\""),
            Some("XYZ".into())
        );
        assert_eq!(
            extract_boundary("multipart/related;BOUNDARY=MIMEBoundary_1,start=x"),
            Some("MIMEBoundary_1".into())
        );
        assert_eq!(extract_boundary("multipart/related"), None);
    }

    #[test]
    fn test_missing_boundary_is_malformed() {
        let err = split(b"whatever", "multipart/related; type=\"application/xop+xml\"").unwrap_err();
        match err {
            AppError::MalformedMultipart { raw_response, .. } => {
                assert_eq!(raw_response, b"whatever")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_delimiters_is_malformed() {
        let err = split(b"<Envelope/>", "multipart/related; boundary=XYZ").unwrap_err();
        assert!(matches!(err, AppError::MalformedMultipart { .. }));
    }

    #[test]
    fn test_split_preserves_order_and_binary_bodies() {
        let parts = split(&sample_body(), CT).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body, b"<Envelope/>");
        assert_eq!(parts[0].content_id(), Some("root"));
        assert_eq!(
            parts[1].body,
            vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff, 0x0d, 0x0a, 0x2d, 0x2d]
        );
        assert_eq!(parts[1].content_id(), Some("doc1"));
        assert_eq!(parts[1].media_type(), Some("application/pdf"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let parts = split(&sample_body(), CT).unwrap();
        assert_eq!(parts[1].header("CONTENT-ID"), Some("<doc1>"));
        assert!(parts[1].headers.contains_key("content-id"));
    }

    #[test]
    fn test_segment_without_separator_is_skipped() {
        let body = b"--B\r\nContent-ID: <a>\r\n\r\nfirst\r\n--B\r\ngarbage-without-separator\r\n--B\r\nContent-ID: <b>\r\n\r\nsecond\r\n--B--";
        let parts = split_with_boundary(body, "B");

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body, b"first");
        assert_eq!(parts[1].body, b"second");
    }

    #[test]
    fn test_preamble_and_empty_trailing_segment_are_ignored() {
        let body = b"preamble text\r\n--B\r\nContent-ID: <a>\r\n\r\nonly\r\n--B\r\n\r\n--B--\r\n";
        let parts = split_with_boundary(body, "B");

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].body, b"only");
    }

    #[test]
    fn test_folded_header_lines_are_joined() {
        let body = b"--B\r\nContent-Type: application/xop+xml;\r\n\tcharset=UTF-8\r\n\r\nx\r\n--B--";
        let parts = split_with_boundary(body, "B");
        assert_eq!(
            parts[0].header("content-type"),
            Some("application/xop+xml; charset=UTF-8")
        );
    }

    #[test]
    fn test_find_attachment_skips_envelope_part() {
        let parts = split(&sample_body(), CT).unwrap();
        let message = MultipartMessage::new(parts);

        assert!(message.find_attachment("cid:root").is_none());
        assert_eq!(message.attachments().len(), 1);
        assert_eq!(
            message.find_attachment("cid:doc1").and_then(|p| p.content_id()),
            Some("doc1")
        );
        assert!(message.find_attachment("<doc1>").is_some());
        assert!(message.find_attachment("doc2").is_none());
    }

    #[test]
    fn test_sniff_boundary() {
        assert_eq!(sniff_boundary(&sample_body()), Some("uuid:abc-123".into()));
        assert_eq!(sniff_boundary(b"<?xml version=\"1.0\"?><a/>"), None);
        assert_eq!(sniff_boundary(b"--lonely\r\nno second delimiter"), None);
    }

    #[test]
    fn test_cid_helpers() {
        assert_eq!(strip_cid_prefix("cid:doc1"), "doc1");
        assert_eq!(strip_cid_prefix("CID:doc1"), "doc1");
        assert_eq!(strip_cid_prefix("doc1"), "doc1");
        assert_eq!(normalize_content_id(" <doc1> "), "doc1");
    }
}
