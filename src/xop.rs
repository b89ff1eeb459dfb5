//! Resolution of document content inside a parsed MNI response.
//!
//! Servers place binary content inconsistently: inline base64, an
//! `xop:Include` pointing at an MTOM attachment, or a lone attachment with no
//! reference at all. Precedence:
//!
//! 1. explicit XOP reference, exact `Content-ID` match (first attachment
//!    when nothing matches, logged as degraded)
//! 2. inline text of the holder node above [`MIN_INLINE_CONTENT_LEN`]
//! 3. first nested text or attribute above the same threshold
//! 4. first attachment when no reference or inline content exists
//! 5. nothing

use xmltree::{Element, XMLNode};

use crate::codec::{self, SourceEncoding};
use crate::multipart::{strip_cid_prefix, MultipartMessage, MultipartPart};
use crate::soap_response::{attribute, descendant, text_of};

/// Shortest string accepted as plausible inline content.
pub const MIN_INLINE_CONTENT_LEN: usize = 100;

/// How a reference to an attachment may be expressed on the holder node.
#[derive(Debug, Clone, Copy)]
pub enum ReferenceStrategy {
    /// The holder itself is the `Include` element.
    SelfInclude,
    /// An `Include` element nested anywhere under the holder.
    NestedInclude,
    /// A `cid:` URI in the holder's own `href` attribute.
    HrefAttribute,
}

pub const REFERENCE_STRATEGIES: &[ReferenceStrategy] = &[
    ReferenceStrategy::SelfInclude,
    ReferenceStrategy::NestedInclude,
    ReferenceStrategy::HrefAttribute,
];

/// Which precedence step produced the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    XopReference,
    DegradedFirstAttachment,
    InlineText,
    NestedText,
    LoneAttachment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub bytes: Vec<u8>,
    pub encoding: SourceEncoding,
    pub source: ResolutionSource,
    /// Media type advertised by the attachment part, if any.
    pub media_type: Option<String>,
}

impl ResolvedContent {
    fn from_part(part: &MultipartPart, source: ResolutionSource) -> Self {
        Self {
            bytes: part.body.clone(),
            encoding: SourceEncoding::Raw,
            source,
            media_type: part.media_type().map(str::to_string),
        }
    }

    fn from_text(text: String, source: ResolutionSource) -> Self {
        Self {
            bytes: text.into_bytes(),
            encoding: SourceEncoding::Base64,
            source,
            media_type: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        codec::to_base64(&self.bytes, self.encoding)
    }
}

/// `Content-ID` referenced by `node`, with any `cid:` prefix stripped.
pub fn find_reference(node: &Element) -> Option<String> {
    REFERENCE_STRATEGIES.iter().find_map(|strategy| {
        let href = match strategy {
            ReferenceStrategy::SelfInclude => {
                Some(node).filter(|n| n.name == "Include").and_then(|n| attribute(n, "href"))
            }
            ReferenceStrategy::NestedInclude => {
                descendant(node, "Include").and_then(|n| attribute(n, "href"))
            }
            ReferenceStrategy::HrefAttribute => attribute(node, "href")
                .filter(|href| href.trim().to_ascii_lowercase().starts_with("cid:")),
        }?;
        let cid = strip_cid_prefix(href);
        (!cid.is_empty()).then(|| cid.to_string())
    })
}

/// Resolves the content held by `node`, consulting `message` attachments.
pub fn resolve(node: &Element, message: &MultipartMessage) -> Option<ResolvedContent> {
    let attachments = message.attachments();

    if let Some(cid) = find_reference(node) {
        if let Some(part) = message.find_attachment(&cid) {
            tracing::debug!("XOP reference cid:{} resolved to attachment", cid);
            return Some(ResolvedContent::from_part(part, ResolutionSource::XopReference));
        }
        if let Some(first) = attachments.first() {
            tracing::warn!(
                "XOP reference cid:{} has no matching part among {} attachment(s); \
                 falling back to first attachment {:?}",
                cid,
                attachments.len(),
                first.content_id()
            );
            return Some(ResolvedContent::from_part(
                first,
                ResolutionSource::DegradedFirstAttachment,
            ));
        }
        tracing::warn!("XOP reference cid:{} found but response has no attachments", cid);
    }

    if let Some(text) = text_of(node).filter(|t| is_plausible(t)) {
        return Some(ResolvedContent::from_text(text, ResolutionSource::InlineText));
    }

    if let Some(text) = first_plausible_nested(node) {
        tracing::debug!("Content found in nested field of <{}>", node.name);
        return Some(ResolvedContent::from_text(text, ResolutionSource::NestedText));
    }

    if let Some(first) = attachments.first() {
        tracing::debug!("No reference or inline content; using lone attachment");
        return Some(ResolvedContent::from_part(first, ResolutionSource::LoneAttachment));
    }

    None
}

fn is_plausible(text: &str) -> bool {
    text.len() > MIN_INLINE_CONTENT_LEN
}

/// Depth-first scan of the holder's attributes, then its descendants' text
/// and attributes.
fn first_plausible_nested(node: &Element) -> Option<String> {
    if let Some(value) = node.attributes.values().find(|v| is_plausible(v.trim())) {
        return Some(value.trim().to_string());
    }
    for el in node.children.iter().filter_map(XMLNode::as_element) {
        if let Some(text) = text_of(el).filter(|t| is_plausible(t)) {
            return Some(text);
        }
        if let Some(found) = first_plausible_nested(el) {
            return Some(found);
        }
    }
    None
}
