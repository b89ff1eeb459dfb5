use serde::{Deserialize, Serialize};
use std::fmt;

use crate::envelope::MniVersion;
use crate::hasher::DigestCase;

/// Already-decoded user credentials for the MNI endpoint.
///
/// Never persisted. The raw password is digested right before use and is
/// redacted from `Debug` output.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "usuario", alias = "userId")]
    pub user_id: String,
    #[serde(alias = "senha", alias = "rawPassword")]
    pub raw_password: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, raw_password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            raw_password: raw_password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("raw_password", &"[REDACTED]")
            .finish()
    }
}

/// Single document attached to an intermediate petition.
#[derive(Debug, Clone)]
pub struct Petition {
    pub document_type_code: String,
    /// Raw binary, already decoded from the boundary base64.
    pub content_bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub attorney_id: Option<String>,
}

/// Procedural pole a party belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pole {
    /// Polo ativo.
    Plaintiff,
    /// Polo passivo.
    Defendant,
}

impl Pole {
    /// MNI pole code.
    pub fn code(&self) -> &'static str {
        match self {
            Pole::Plaintiff => "AT",
            Pole::Defendant => "PA",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub name: String,
    /// `fisica` or `juridica`.
    pub person_type: String,
    /// CPF or CNPJ.
    pub document_number: Option<String>,
    pub attorney_id: Option<String>,
}

/// Document carried inline (base64) in an initial filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingDocument {
    pub document_type_code: String,
    pub content_base64: String,
    pub mime_type: String,
    pub description: Option<String>,
}

/// Optional identification block of an initial filing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationParams {
    pub requester_document: Option<String>,
    pub requester_name: Option<String>,
}

/// Optional block linking the new case to an existing one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseLinkParams {
    pub linked_process_number: Option<String>,
    pub link_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialFilingData {
    pub class_code: String,
    pub locality_code: String,
    pub competence: Option<String>,
    pub cause_value: Option<String>,
    pub plaintiffs: Vec<Party>,
    pub defendants: Vec<Party>,
    pub subject_codes: Vec<String>,
    pub documents: Vec<FilingDocument>,
    pub identification: Option<IdentificationParams>,
    pub case_link: Option<CaseLinkParams>,
}

/// Normalized document returned to the caller, whatever shape it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub content_base64: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetitionReceipt {
    pub protocol_number: String,
    pub operation_date: String,
    pub receipt_document: Option<DocumentPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingReceipt {
    pub case_number: String,
    pub protocol_number: String,
    pub operation_date: String,
}

/// POST /api/v1/documents/content
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContentRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub process_number: String,
    pub document_id: String,
}

/// POST /api/v1/petitions
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetitionRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub process_number: String,
    pub document_type_code: String,
    pub content_base64: String,
    pub file_name: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub attorney_id: Option<String>,
}

/// POST /api/v1/filings
#[derive(Debug, Clone, Deserialize)]
pub struct FilingRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub filing: InitialFilingData,
}

/// PUT /api/v1/environment
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSwitchRequest {
    pub endpoint_url: String,
    pub version: MniVersion,
    pub system: String,
    pub environment: String,
    pub digest_case: Option<DigestCase>,
    pub timeout_secs: Option<u64>,
}
