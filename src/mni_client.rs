//! MNI operation clients.
//!
//! Each call runs one request/response cycle through the same states:
//!
//! ```text
//! Idle -> RequestBuilt -> Sent -> ResponseClassified
//!      -> PlainParsed | MultipartSplit -> ContentResolved -> Done
//! ```
//!
//! or `Failed` from any of them. A client is immutable: switching the active
//! environment means constructing a new `MniClient`, so calls already in
//! flight finish against the endpoint they started with.

use chrono::{Local, NaiveDateTime};
use std::time::Duration;
use xmltree::Element;

use crate::envelope::{EnvelopeBuilder, MniVersion, SoapRequest};
use crate::errors::AppError;
use crate::hasher::DigestCase;
use crate::models::{
    Credentials, DocumentPayload, FilingReceipt, InitialFilingData, Petition, PetitionReceipt,
};
use crate::multipart::{self, MultipartMessage};
use crate::soap_response::{
    self, attribute, child, descendant, ensure_success, extract_field, find_descendant,
    parse_envelope, SoapEnvelope,
};
use crate::transport::{MultipartTransport, RawHttpResponse, ResponseKind};
use crate::xop::{self, ResolvedContent};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const RECEIPT_MIME_TYPE: &str = "application/pdf";

/// Endpoint set a client is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MniSettings {
    pub endpoint_url: String,
    pub version: MniVersion,
    /// Label of the judiciary system (e.g. `eproc`, `pje`).
    pub system: String,
    /// Label of the environment (e.g. `producao`, `homologacao`).
    pub environment: String,
    pub digest_case: DigestCase,
    pub timeout: Duration,
}

/// Per-call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    RequestBuilt,
    Sent,
    ResponseClassified,
    PlainParsed,
    MultipartSplit,
    ContentResolved,
    Done,
    Failed,
}

/// Tracks and logs state transitions of a single call.
#[derive(Debug)]
struct CallTrace {
    operation: &'static str,
    state: CallState,
}

impl CallTrace {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            state: CallState::Idle,
        }
    }

    fn advance(&mut self, next: CallState) {
        tracing::debug!("{}: {:?} -> {:?}", self.operation, self.state, next);
        self.state = next;
    }

    /// Marks the call failed and passes the error through.
    fn fail(&mut self, err: AppError) -> AppError {
        match err.root() {
            AppError::SubmissionRejected(_) => {
                tracing::info!("{} rejected in state {:?}: {}", self.operation, self.state, err)
            }
            _ => tracing::warn!("{} failed in state {:?}: {}", self.operation, self.state, err),
        }
        self.state = CallState::Failed;
        err
    }
}

/// Parsed response: the SOAP envelope plus any MTOM attachments.
#[derive(Debug)]
struct Exchange {
    envelope: SoapEnvelope,
    message: MultipartMessage,
}

impl Exchange {
    fn operation_response(&self) -> Result<&Element, AppError> {
        self.envelope.operation_response().ok_or_else(|| {
            AppError::InvalidResponse("SOAP Body has no operation response".to_string())
        })
    }
}

/// Client for the three MNI operations against one endpoint set.
#[derive(Clone)]
pub struct MniClient {
    settings: MniSettings,
    builder: EnvelopeBuilder,
    transport: MultipartTransport,
}

impl MniClient {
    /// Creates a new `MniClient`.
    ///
    /// # Arguments
    ///
    /// * `settings` - Endpoint, protocol version and digest rules to bind to.
    pub fn new(settings: MniSettings) -> Result<Self, AppError> {
        let builder = EnvelopeBuilder::new(
            settings.version,
            settings.endpoint_url.clone(),
            settings.digest_case,
        );
        let transport = MultipartTransport::new(settings.timeout)?;

        tracing::info!(
            "MNI {} client bound to {} ({}/{})",
            settings.version,
            settings.endpoint_url,
            settings.system,
            settings.environment
        );

        Ok(Self {
            settings,
            builder,
            transport,
        })
    }

    pub fn settings(&self) -> &MniSettings {
        &self.settings
    }

    /// Retrieves one document's content.
    ///
    /// # Arguments
    ///
    /// * `credentials` - Caller credentials; the password is digested here.
    /// * `process_number` - Process the document belongs to.
    /// * `document_id` - Identifier of the document.
    ///
    /// # Returns
    ///
    /// * `Result<DocumentPayload, AppError>` - Base64 content and MIME type,
    ///   or `EmptyDocumentContent` when nothing could be resolved.
    pub async fn get_document_content(
        &self,
        credentials: &Credentials,
        process_number: &str,
        document_id: &str,
    ) -> Result<DocumentPayload, AppError> {
        let mut trace = CallTrace::new("consultarProcesso");
        let result = self
            .document_content(&mut trace, credentials, process_number, document_id)
            .await;
        result.map_err(|e| trace.fail(e))
    }

    async fn document_content(
        &self,
        trace: &mut CallTrace,
        credentials: &Credentials,
        process_number: &str,
        document_id: &str,
    ) -> Result<DocumentPayload, AppError> {
        let request =
            self.builder
                .build_content_request(credentials, process_number, document_id, now());
        trace.advance(CallState::RequestBuilt);

        let exchange = self.exchange(trace, &request).await?;
        let response = exchange.operation_response()?;
        ensure_success(response)?;

        let document = find_document(response, document_id);
        // Without a holder only an unreferenced attachment can apply
        let empty_holder = Element::new("conteudo");
        let holder = document
            .and_then(|doc| child(doc, "conteudo"))
            .or(document)
            .or_else(|| descendant(response, "conteudo"))
            .unwrap_or(&empty_holder);

        let resolved = xop::resolve(holder, &exchange.message)
            .filter(|content| !content.is_empty())
            .ok_or(AppError::EmptyDocumentContent)?;
        trace.advance(CallState::ContentResolved);
        tracing::debug!(
            "Document {} resolved via {:?} ({} bytes)",
            document_id,
            resolved.source,
            resolved.bytes.len()
        );

        let mime_type = resolve_mime_type(document, &resolved, DEFAULT_MIME_TYPE);
        let payload = DocumentPayload {
            content_base64: resolved.to_base64(),
            mime_type,
        };

        trace.advance(CallState::Done);
        Ok(payload)
    }

    /// Files an intermediate petition on an existing process.
    ///
    /// # Returns
    ///
    /// * `Result<PetitionReceipt, AppError>` - Protocol number, operation date
    ///   and the receipt document when the server sends one; or
    ///   `SubmissionRejected` carrying the server message.
    pub async fn submit_intermediate_petition(
        &self,
        credentials: &Credentials,
        process_number: &str,
        petition: &Petition,
    ) -> Result<PetitionReceipt, AppError> {
        let mut trace = CallTrace::new("entregarManifestacaoProcessual");
        let result = self
            .intermediate_petition(&mut trace, credentials, process_number, petition)
            .await;
        result.map_err(|e| trace.fail(e))
    }

    async fn intermediate_petition(
        &self,
        trace: &mut CallTrace,
        credentials: &Credentials,
        process_number: &str,
        petition: &Petition,
    ) -> Result<PetitionReceipt, AppError> {
        if petition.content_bytes.is_empty() {
            return Err(AppError::BadRequest("Petition content is empty".to_string()));
        }

        let request =
            self.builder
                .build_petition_request(credentials, process_number, petition, now());
        trace.advance(CallState::RequestBuilt);

        let exchange = self.exchange(trace, &request).await?;
        let response = exchange.operation_response()?;
        ensure_success(response)?;

        let protocol_number = extract_field(response, soap_response::PROTOCOL_NUMBER)
            .ok_or_else(|| {
                AppError::InvalidResponse("response carries no protocol number".to_string())
            })?;
        let operation_date = operation_date(response);

        let receipt_document = match descendant(response, "recibo") {
            Some(holder) => xop::resolve(holder, &exchange.message),
            // Unreferenced receipt attachment
            None if !exchange.message.attachments().is_empty() => {
                xop::resolve(&Element::new("recibo"), &exchange.message)
            }
            None => None,
        }
        .filter(|content| !content.is_empty())
        .map(|content| DocumentPayload {
            mime_type: resolve_mime_type(None, &content, RECEIPT_MIME_TYPE),
            content_base64: content.to_base64(),
        });
        if receipt_document.is_some() {
            trace.advance(CallState::ContentResolved);
        }

        tracing::info!(
            "Petition filed on process {}: protocol {}",
            process_number,
            protocol_number
        );
        trace.advance(CallState::Done);

        Ok(PetitionReceipt {
            protocol_number,
            operation_date,
            receipt_document,
        })
    }

    /// Files an initial petition, opening a new case.
    ///
    /// # Returns
    ///
    /// * `Result<FilingReceipt, AppError>` - Number of the new case with the
    ///   protocol data; or `SubmissionRejected` carrying the server message.
    pub async fn submit_initial_filing(
        &self,
        credentials: &Credentials,
        filing: &InitialFilingData,
    ) -> Result<FilingReceipt, AppError> {
        let mut trace = CallTrace::new("entregarManifestacaoProcessual(inicial)");
        let result = self.initial_filing(&mut trace, credentials, filing).await;
        result.map_err(|e| trace.fail(e))
    }

    async fn initial_filing(
        &self,
        trace: &mut CallTrace,
        credentials: &Credentials,
        filing: &InitialFilingData,
    ) -> Result<FilingReceipt, AppError> {
        if filing.documents.is_empty() {
            return Err(AppError::BadRequest(
                "Initial filing needs at least one document".to_string(),
            ));
        }
        if filing.plaintiffs.is_empty() {
            return Err(AppError::BadRequest(
                "Initial filing needs at least one plaintiff".to_string(),
            ));
        }

        let request = self
            .builder
            .build_initial_filing_request(credentials, filing, now());
        trace.advance(CallState::RequestBuilt);

        let exchange = self.exchange(trace, &request).await?;
        let response = exchange.operation_response()?;
        ensure_success(response)?;

        let case_number = extract_field(response, soap_response::CASE_NUMBER).ok_or_else(|| {
            AppError::InvalidResponse("response carries no case number".to_string())
        })?;
        let protocol_number =
            extract_field(response, soap_response::PROTOCOL_NUMBER).unwrap_or_default();
        let operation_date = operation_date(response);

        tracing::info!(
            "Initial filing accepted: case {} (protocol {})",
            case_number,
            protocol_number
        );
        trace.advance(CallState::Done);

        Ok(FilingReceipt {
            case_number,
            protocol_number,
            operation_date,
        })
    }

    /// Sends the request and parses the envelope, splitting MTOM first when
    /// the response is multipart.
    async fn exchange(
        &self,
        trace: &mut CallTrace,
        request: &SoapRequest,
    ) -> Result<Exchange, AppError> {
        let raw = self.transport.send(request).await?;
        trace.advance(CallState::Sent);

        let kind = raw.classify()?;
        trace.advance(CallState::ResponseClassified);

        let exchange = match kind {
            ResponseKind::PlainXml => {
                let envelope = parse_envelope(&raw.body).map_err(|e| with_status(e, &raw))?;
                trace.advance(CallState::PlainParsed);
                Exchange {
                    envelope,
                    message: MultipartMessage::default(),
                }
            }
            ResponseKind::Multipart {
                boundary,
                announced,
            } => {
                let parts = if announced {
                    multipart::split(&raw.body, &raw.content_type)?
                } else {
                    multipart::split_with_boundary(&raw.body, &boundary)
                };
                let message = MultipartMessage::new(parts);
                let envelope_part =
                    message
                        .envelope()
                        .ok_or_else(|| AppError::MalformedMultipart {
                            reason: "multipart response without parts".to_string(),
                            raw_response: raw.body.clone(),
                        })?;
                trace.advance(CallState::MultipartSplit);

                let envelope =
                    parse_envelope(&envelope_part.body).map_err(|e| with_status(e, &raw))?;
                Exchange { envelope, message }
            }
        };

        Ok(exchange)
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Adds the HTTP status to parse failures of non-2xx responses.
fn with_status(err: AppError, raw: &RawHttpResponse) -> AppError {
    match err {
        AppError::InvalidResponse(msg) if !raw.is_success() => {
            AppError::InvalidResponse(format!("HTTP {}: {}", raw.status, msg))
        }
        other => other,
    }
}

fn operation_date(response: &Element) -> String {
    extract_field(response, soap_response::OPERATION_DATE).unwrap_or_else(|| {
        tracing::warn!("Response carries no operation date");
        String::new()
    })
}

/// `documento` element for `document_id`, else the first one present.
fn find_document<'a>(response: &'a Element, document_id: &str) -> Option<&'a Element> {
    find_descendant(response, &|el: &Element| {
        el.name == "documento"
            && (attribute(el, "idDocumento") == Some(document_id)
                || attribute(el, "id") == Some(document_id))
    })
    .or_else(|| descendant(response, "documento"))
}

/// MIME type by ordered strategies: XML attributes on the document node,
/// attachment `Content-Type`, magic-number sniffing, then `fallback`.
fn resolve_mime_type(
    document: Option<&Element>,
    content: &ResolvedContent,
    fallback: &str,
) -> String {
    document
        .and_then(|doc| extract_field(doc, soap_response::DOCUMENT_MIME_TYPE))
        .or_else(|| {
            content
                .media_type
                .clone()
                .filter(|mt| !is_generic_media_type(mt))
        })
        .or_else(|| sniff_mime_type(content).map(str::to_string))
        .unwrap_or_else(|| fallback.to_string())
}

fn is_generic_media_type(media_type: &str) -> bool {
    let media_type = media_type.to_ascii_lowercase();
    media_type == "application/octet-stream" || media_type == "application/xop+xml"
}

fn sniff_mime_type(content: &ResolvedContent) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str, &str)] = &[
        (b"%PDF", "JVBERi", "application/pdf"),
        (b"\x89PNG", "iVBORw", "image/png"),
        (b"\xFF\xD8\xFF", "/9j/", "image/jpeg"),
        (b"<html", "PGh0bWw", "text/html"),
    ];

    SIGNATURES
        .iter()
        .find(|(raw, encoded, _)| match content.encoding {
            crate::codec::SourceEncoding::Raw => content.bytes.starts_with(raw),
            crate::codec::SourceEncoding::Base64 => content.bytes.starts_with(encoded.as_bytes()),
        })
        .map(|(_, _, mime)| *mime)
}
