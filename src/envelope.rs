//! Outbound SOAP 1.2 envelopes for the MNI operations.
//!
//! Envelopes are rendered as explicit string templates. Generic SOAP/XML
//! writers re-prefix namespaces in ways the MNI endpoints refuse, so the
//! exact prefixes and layout below are part of the wire contract.
//!
//! Interpolated values are inserted verbatim, without XML escaping. A value
//! containing `<`, `&` or quotes produces a malformed envelope; callers are
//! responsible for what they pass in.

use chrono::NaiveDateTime;
use std::fmt::Write as _;

use crate::hasher::{digest_password, sha256_hex, DigestCase};
use crate::models::{Credentials, InitialFilingData, Party, Petition, Pole};

pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Operation element names shared by both protocol versions.
pub const OP_CONSULTAR_PROCESSO: &str = "consultarProcesso";
pub const OP_ENTREGAR_MANIFESTACAO: &str = "entregarManifestacaoProcessual";

/// MNI protocol version spoken by the active endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MniVersion {
    #[serde(rename = "2.2")]
    V2_2,
    #[serde(rename = "3.0")]
    V3_0,
}

impl MniVersion {
    pub fn service_namespace(&self) -> &'static str {
        match self {
            MniVersion::V2_2 => "http://www.cnj.jus.br/servico-intercomunicacao-2.2.2/",
            MniVersion::V3_0 => "http://www.cnj.jus.br/servico-intercomunicacao-3.0.0/",
        }
    }

    pub fn types_namespace(&self) -> &'static str {
        match self {
            MniVersion::V2_2 => "http://www.cnj.jus.br/intercomunicacao-2.2.2",
            MniVersion::V3_0 => "http://www.cnj.jus.br/intercomunicacao-3.0.0",
        }
    }

    /// Whether the single-document petition carries the content inline.
    ///
    /// 3.0 endpoints take only the SHA-256 of the content on this path.
    pub fn petition_carries_inline_content(&self) -> bool {
        matches!(self, MniVersion::V2_2)
    }
}

impl std::str::FromStr for MniVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2.2" | "2.2.2" => Ok(MniVersion::V2_2),
            "3.0" | "3.0.0" | "3" => Ok(MniVersion::V3_0),
            other => Err(format!("unsupported MNI version '{}'", other)),
        }
    }
}

impl std::fmt::Display for MniVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MniVersion::V2_2 => write!(f, "2.2"),
            MniVersion::V3_0 => write!(f, "3.0"),
        }
    }
}

/// Which party is authenticating. 2.2 names the elements after the role.
#[derive(Debug, Clone, Copy)]
enum AuthRole {
    Consultant,
    Filer,
}

/// A rendered request. Built once per call and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SoapRequest {
    operation: &'static str,
    endpoint: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl SoapRequest {
    fn new(operation: &'static str, endpoint: &str, body: String) -> Self {
        Self {
            operation,
            endpoint: endpoint.to_string(),
            headers: vec![("Content-Type".to_string(), SOAP_CONTENT_TYPE.to_string())],
            body,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Renders envelopes for one endpoint/version/digest-case combination.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    version: MniVersion,
    endpoint: String,
    digest_case: DigestCase,
}

impl EnvelopeBuilder {
    pub fn new(version: MniVersion, endpoint: impl Into<String>, digest_case: DigestCase) -> Self {
        Self {
            version,
            endpoint: endpoint.into(),
            digest_case,
        }
    }

    /// Pull request for one document's content. No attachment content is sent.
    pub fn build_content_request(
        &self,
        credentials: &Credentials,
        process_number: &str,
        document_id: &str,
        now: NaiveDateTime,
    ) -> SoapRequest {
        let mut op = String::new();
        self.push_auth(&mut op, credentials, AuthRole::Consultant, now);
        push_text(&mut op, "numeroProcesso", process_number);
        if self.version == MniVersion::V2_2 {
            push_text(&mut op, "movimentos", "false");
            push_text(&mut op, "incluirCabecalho", "false");
            push_text(&mut op, "incluirDocumentos", "true");
        }
        push_text(&mut op, "documento", document_id);

        SoapRequest::new(
            OP_CONSULTAR_PROCESSO,
            &self.endpoint,
            self.wrap(OP_CONSULTAR_PROCESSO, &op),
        )
    }

    /// Intermediate petition on an existing process.
    ///
    /// The `hash` attribute is the lowercase SHA-256 of the raw document
    /// bytes. 2.2 also embeds the bytes as base64; 3.0 sends the hash alone.
    pub fn build_petition_request(
        &self,
        credentials: &Credentials,
        process_number: &str,
        petition: &Petition,
        now: NaiveDateTime,
    ) -> SoapRequest {
        let content_hash = sha256_hex(&petition.content_bytes);

        let mut op = String::new();
        self.push_auth(&mut op, credentials, AuthRole::Filer, now);
        push_text(&mut op, "numeroProcesso", process_number);

        op.push_str("<tip:documento");
        push_attr(&mut op, "tipoDocumento", Some(&petition.document_type_code));
        push_attr(&mut op, "mimetype", Some(&petition.mime_type));
        push_attr(&mut op, "nivelSigilo", Some("0"));
        push_attr(&mut op, "descricao", petition.description.as_deref());
        push_attr(&mut op, "hash", Some(&content_hash));
        op.push('>');
        if self.version.petition_carries_inline_content() {
            let encoded = crate::codec::to_base64(
                &petition.content_bytes,
                crate::codec::SourceEncoding::Raw,
            );
            push_text(&mut op, "conteudo", &encoded);
        }
        push_param(&mut op, "outroParametro", "nomeArquivo", &petition.file_name);
        op.push_str("</tip:documento>");

        push_text(&mut op, "dataEnvio", &format_send_date(now));
        if let Some(attorney_id) = petition.attorney_id.as_deref() {
            push_param(&mut op, "parametros", "idRepresentante", attorney_id);
        }

        SoapRequest::new(
            OP_ENTREGAR_MANIFESTACAO,
            &self.endpoint,
            self.wrap(OP_ENTREGAR_MANIFESTACAO, &op),
        )
    }

    /// Initial filing that opens a new case. Documents travel inline.
    ///
    /// Optional blocks are left out entirely when their source fields are
    /// absent; no empty tags are emitted.
    pub fn build_initial_filing_request(
        &self,
        credentials: &Credentials,
        filing: &InitialFilingData,
        now: NaiveDateTime,
    ) -> SoapRequest {
        let mut op = String::new();
        self.push_auth(&mut op, credentials, AuthRole::Filer, now);

        op.push_str("<tip:dadosBasicos");
        push_attr(&mut op, "classeProcessual", Some(&filing.class_code));
        push_attr(&mut op, "codigoLocalidade", Some(&filing.locality_code));
        push_attr(&mut op, "competencia", filing.competence.as_deref());
        push_attr(&mut op, "nivelSigilo", Some("0"));
        op.push('>');
        push_pole(&mut op, Pole::Plaintiff, &filing.plaintiffs);
        push_pole(&mut op, Pole::Defendant, &filing.defendants);
        for subject in &filing.subject_codes {
            op.push_str("<tip:assunto>");
            push_text(&mut op, "codigoNacional", subject);
            op.push_str("</tip:assunto>");
        }
        if let Some(value) = filing.cause_value.as_deref() {
            push_text(&mut op, "valorCausa", value);
        }
        op.push_str("</tip:dadosBasicos>");

        for document in &filing.documents {
            op.push_str("<tip:documento");
            push_attr(&mut op, "tipoDocumento", Some(&document.document_type_code));
            push_attr(&mut op, "mimetype", Some(&document.mime_type));
            push_attr(&mut op, "nivelSigilo", Some("0"));
            push_attr(&mut op, "descricao", document.description.as_deref());
            op.push('>');
            push_text(&mut op, "conteudo", &document.content_base64);
            op.push_str("</tip:documento>");
        }

        push_text(&mut op, "dataEnvio", &format_send_date(now));

        if let Some(ident) = &filing.identification {
            if let Some(doc) = ident.requester_document.as_deref() {
                push_param(&mut op, "parametros", "documentoSolicitante", doc);
            }
            if let Some(name) = ident.requester_name.as_deref() {
                push_param(&mut op, "parametros", "nomeSolicitante", name);
            }
        }
        if let Some(link) = &filing.case_link {
            if let Some(number) = link.linked_process_number.as_deref() {
                push_param(&mut op, "parametros", "processoVinculado", number);
            }
            if let Some(reason) = link.link_reason.as_deref() {
                push_param(&mut op, "parametros", "motivoVinculacao", reason);
            }
        }

        SoapRequest::new(
            OP_ENTREGAR_MANIFESTACAO,
            &self.endpoint,
            self.wrap(OP_ENTREGAR_MANIFESTACAO, &op),
        )
    }

    fn push_auth(
        &self,
        out: &mut String,
        credentials: &Credentials,
        role: AuthRole,
        now: NaiveDateTime,
    ) {
        let digest = digest_password(&credentials.raw_password, now.date(), self.digest_case);

        match self.version {
            MniVersion::V2_2 => {
                let (user_tag, pass_tag) = match role {
                    AuthRole::Consultant => ("idConsultante", "senhaConsultante"),
                    AuthRole::Filer => ("idManifestante", "senhaManifestante"),
                };
                push_text(out, user_tag, &credentials.user_id);
                push_text(out, pass_tag, &digest);
            }
            MniVersion::V3_0 => {
                out.push_str("<tip:autenticacao>");
                push_text(out, "usuario", &credentials.user_id);
                push_text(out, "senha", &digest);
                out.push_str("</tip:autenticacao>");
            }
        }
    }

    fn wrap(&self, operation: &str, inner: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<soap:Envelope xmlns:soap="{soap}" xmlns:ser="{ser}" xmlns:tip="{tip}">"#,
                "<soap:Header/>",
                "<soap:Body>",
                "<ser:{op}>{inner}</ser:{op}>",
                "</soap:Body>",
                "</soap:Envelope>"
            ),
            soap = SOAP_12_NS,
            ser = self.version.service_namespace(),
            tip = self.version.types_namespace(),
            op = operation,
            inner = inner,
        )
    }
}

/// `dataEnvio` layout: `YYYYMMDDHHMMSS`.
pub fn format_send_date(now: NaiveDateTime) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

fn push_text(out: &mut String, tag: &str, value: &str) {
    let _ = write!(out, "<tip:{tag}>{value}</tip:{tag}>");
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = write!(out, r#" {name}="{value}""#);
    }
}

fn push_param(out: &mut String, tag: &str, name: &str, value: &str) {
    let _ = write!(out, r#"<tip:{tag} nome="{name}" valor="{value}"/>"#);
}

fn push_pole(out: &mut String, pole: Pole, parties: &[Party]) {
    if parties.is_empty() {
        return;
    }
    let _ = write!(out, r#"<tip:polo polo="{}">"#, pole.code());
    for party in parties {
        out.push_str("<tip:parte>");
        out.push_str("<tip:pessoa");
        push_attr(out, "nome", Some(&party.name));
        push_attr(out, "tipoPessoa", Some(&party.person_type));
        push_attr(out, "numeroDocumentoPrincipal", party.document_number.as_deref());
        out.push_str("/>");
        if let Some(attorney) = party.attorney_id.as_deref() {
            let _ = write!(out, r#"<tip:advogado numeroDocumentoPrincipal="{attorney}"/>"#);
        }
        out.push_str("</tip:parte>");
    }
    out.push_str("</tip:polo>");
}
