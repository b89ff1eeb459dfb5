//! HTTP exchange of SOAP envelopes with an MNI endpoint.
//!
//! Bodies come back untouched; [`RawHttpResponse::classify`] decides whether
//! they are plain XML or MTOM.

use reqwest::{header::CONTENT_TYPE, redirect::Policy};
use std::time::Duration;

use crate::envelope::SoapRequest;
use crate::errors::AppError;
use crate::multipart::{extract_boundary, is_multipart_related, sniff_boundary};

/// Response exactly as received, whatever content type the server advertised.
#[derive(Debug, Clone)]
pub struct RawHttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Shape of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    PlainXml,
    /// MTOM body; `announced` is false when the boundary was sniffed from
    /// the body because `Content-Type` did not say multipart.
    Multipart { boundary: String, announced: bool },
}

impl RawHttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Classifies the body as plain XML or MTOM.
    ///
    /// A `multipart/related` content type without a boundary is malformed.
    pub fn classify(&self) -> Result<ResponseKind, AppError> {
        if is_multipart_related(&self.content_type) {
            let boundary =
                extract_boundary(&self.content_type).ok_or_else(|| AppError::MalformedMultipart {
                    reason: format!(
                        "multipart content type without boundary: '{}'",
                        self.content_type
                    ),
                    raw_response: self.body.clone(),
                })?;
            return Ok(ResponseKind::Multipart {
                boundary,
                announced: true,
            });
        }

        if let Some(boundary) = sniff_boundary(&self.body) {
            tracing::warn!(
                "Response advertised '{}' but body is multipart (boundary '{}')",
                self.content_type,
                boundary
            );
            return Ok(ResponseKind::Multipart {
                boundary,
                announced: false,
            });
        }

        Ok(ResponseKind::PlainXml)
    }
}

/// Single-shot HTTP POST of SOAP envelopes.
///
/// No retries and no redirects. HTTP status codes are not interpreted: error
/// bodies are usually SOAP faults and are handed back for parsing.
#[derive(Clone)]
pub struct MultipartTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl MultipartTransport {
    /// Creates a new `MultipartTransport`.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Caller-imposed limit for the whole request/response cycle.
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create MNI HTTP client: {}", e))
            })?;

        Ok(Self { client, timeout })
    }

    /// Posts the envelope and reads the full body.
    ///
    /// # Returns
    ///
    /// * `Result<RawHttpResponse, AppError>` - The raw response, or
    ///   `Timeout` / `TransportFailure`.
    pub async fn send(&self, request: &SoapRequest) -> Result<RawHttpResponse, AppError> {
        tracing::debug!(
            "POST {} ({}, {} bytes)",
            request.endpoint(),
            request.operation(),
            request.body().len()
        );

        let exchange = async {
            let mut builder = self.client.post(request.endpoint());
            for (name, value) in request.headers() {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder.body(request.body().to_string()).send().await?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = response.bytes().await?.to_vec();

            Ok::<_, reqwest::Error>(RawHttpResponse {
                status,
                body,
                content_type,
            })
        };

        let raw = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "{} did not answer within {:?}",
                    request.endpoint(),
                    self.timeout
                ))
            })?
            .map_err(AppError::from)?;

        tracing::debug!(
            "{} answered HTTP {} with '{}' ({} bytes)",
            request.operation(),
            raw.status,
            raw.content_type,
            raw.body.len()
        );

        Ok(raw)
    }
}
