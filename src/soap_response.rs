//! Parsing of inbound SOAP envelopes and lookup of response fields.
//!
//! MNI servers disagree about where a given value lives (child element,
//! attribute, nested receipt, generic `parametro` pair). Every field is
//! therefore described by an ordered list of [`FieldStrategy`] values that
//! are tried in turn; supporting a new server quirk means adding an entry to
//! one of the lists below.

use std::io::BufReader;
use xmltree::{Element, XMLNode};

use crate::errors::AppError;

/// One way of locating a value relative to a node.
#[derive(Debug, Clone, Copy)]
pub enum FieldStrategy {
    /// Text of a direct child element.
    Child(&'static str),
    /// Text of the first descendant element with this name (depth-first).
    Descendant(&'static str),
    /// Attribute on the node itself.
    Attribute(&'static str),
    /// Attribute of the first descendant element with this name.
    DescendantAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// `valor` of a `<element nome="name" valor="..."/>` pair.
    NamedParam {
        element: &'static str,
        name: &'static str,
    },
}

pub const SUCCESS_FLAG: &[FieldStrategy] = &[
    FieldStrategy::Child("sucesso"),
    FieldStrategy::Attribute("sucesso"),
    FieldStrategy::Descendant("sucesso"),
];

pub const MESSAGE: &[FieldStrategy] = &[
    FieldStrategy::Child("mensagem"),
    FieldStrategy::Descendant("mensagem"),
    FieldStrategy::Attribute("mensagem"),
    FieldStrategy::Descendant("descricao"),
];

pub const PROTOCOL_NUMBER: &[FieldStrategy] = &[
    FieldStrategy::Child("protocoloRecebimento"),
    FieldStrategy::Descendant("protocoloRecebimento"),
    FieldStrategy::Descendant("protocolo"),
    FieldStrategy::NamedParam {
        element: "parametro",
        name: "protocolo",
    },
];

pub const OPERATION_DATE: &[FieldStrategy] = &[
    FieldStrategy::Child("dataOperacao"),
    FieldStrategy::Descendant("dataOperacao"),
    FieldStrategy::Descendant("dataHora"),
];

pub const CASE_NUMBER: &[FieldStrategy] = &[
    FieldStrategy::Child("numeroProcesso"),
    FieldStrategy::Descendant("numeroProcesso"),
    FieldStrategy::NamedParam {
        element: "parametro",
        name: "numeroProcesso",
    },
    FieldStrategy::NamedParam {
        element: "parametros",
        name: "numeroProcesso",
    },
    FieldStrategy::DescendantAttribute {
        element: "processo",
        attribute: "numero",
    },
    FieldStrategy::DescendantAttribute {
        element: "dadosBasicos",
        attribute: "numero",
    },
];

pub const DOCUMENT_MIME_TYPE: &[FieldStrategy] = &[
    FieldStrategy::Attribute("mimetype"),
    FieldStrategy::Attribute("mimeType"),
    FieldStrategy::DescendantAttribute {
        element: "conteudo",
        attribute: "contentType",
    },
    FieldStrategy::Attribute("contentType"),
];

/// A parsed SOAP envelope, reduced to its `Body`.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub body: Element,
}

impl SoapEnvelope {
    /// The operation response element, i.e. the first element inside `Body`.
    pub fn operation_response(&self) -> Option<&Element> {
        self.body.children.iter().find_map(|n| n.as_element())
    }
}

/// Parses raw XML into a SOAP envelope.
///
/// A `Fault` body is reported as [`AppError::ServiceFault`].
pub fn parse_envelope(xml: &[u8]) -> Result<SoapEnvelope, AppError> {
    let xml = trim_leading_noise(xml);
    let root = Element::parse(BufReader::new(xml))?;

    if root.name != "Envelope" {
        return Err(AppError::InvalidResponse(format!(
            "expected SOAP Envelope, found <{}>",
            root.name
        )));
    }

    let body = child(&root, "Body")
        .ok_or_else(|| AppError::InvalidResponse("SOAP Envelope without Body".to_string()))?;

    if let Some(fault) = child(body, "Fault") {
        let reason = extract_field(
            fault,
            &[
                FieldStrategy::Descendant("Text"),
                FieldStrategy::Descendant("Reason"),
                FieldStrategy::Child("faultstring"),
            ],
        )
        .unwrap_or_else(|| "unspecified SOAP fault".to_string());
        return Err(AppError::ServiceFault(reason));
    }

    Ok(SoapEnvelope { body: body.clone() })
}

/// Tries each strategy in order and returns the first non-empty value.
pub fn extract_field(node: &Element, strategies: &[FieldStrategy]) -> Option<String> {
    strategies.iter().find_map(|strategy| match *strategy {
        FieldStrategy::Child(name) => child(node, name).and_then(text_of),
        FieldStrategy::Descendant(name) => descendant(node, name).and_then(text_of),
        FieldStrategy::Attribute(name) => attribute(node, name).map(str::to_string),
        FieldStrategy::DescendantAttribute { element, attribute: attr } => {
            descendant(node, element)
                .and_then(|el| attribute(el, attr))
                .map(str::to_string)
        }
        FieldStrategy::NamedParam { element, name } => {
            find_descendant(node, &|el: &Element| {
                el.name == element && attribute(el, "nome") == Some(name)
            })
            .and_then(|el| attribute(el, "valor"))
            .map(str::to_string)
        }
    })
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

/// Interprets a success flag sent either as a boolean or as a string.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "sim" | "s" => Some(true),
        "false" | "0" | "nao" | "não" | "n" => Some(false),
        _ => None,
    }
}

/// Fails with [`AppError::SubmissionRejected`] when the response reports
/// failure. A missing flag is not treated as failure.
pub fn ensure_success(response: &Element) -> Result<(), AppError> {
    let flag = extract_field(response, SUCCESS_FLAG);
    match flag.as_deref().and_then(parse_flag) {
        Some(false) => {
            let message = extract_field(response, MESSAGE)
                .unwrap_or_else(|| "MNI reported failure without a message".to_string());
            Err(AppError::SubmissionRejected(message))
        }
        Some(true) => Ok(()),
        None => {
            if let Some(raw) = flag {
                tracing::warn!("Unrecognised success flag value '{}', assuming success", raw);
            }
            Ok(())
        }
    }
}

/// Direct child element by local name.
pub fn child<'a>(node: &'a Element, name: &str) -> Option<&'a Element> {
    node.children
        .iter()
        .filter_map(|n| n.as_element())
        .find(|el| el.name == name)
}

/// First descendant element by local name, depth-first, excluding `node`.
pub fn descendant<'a>(node: &'a Element, name: &str) -> Option<&'a Element> {
    find_descendant(node, &|el: &Element| el.name == name)
}

/// First descendant matching `pred`, depth-first, excluding `node`.
pub fn find_descendant<'a>(
    node: &'a Element,
    pred: &dyn Fn(&Element) -> bool,
) -> Option<&'a Element> {
    for el in node.children.iter().filter_map(|n| n.as_element()) {
        if pred(el) {
            return Some(el);
        }
        if let Some(found) = find_descendant(el, pred) {
            return Some(found);
        }
    }
    None
}

/// Attribute by local name, ignoring any prefix on the stored key.
pub fn attribute<'a>(node: &'a Element, name: &str) -> Option<&'a str> {
    node.attributes
        .iter()
        .find(|(k, _)| k.as_str() == name || k.rsplit(':').next() == Some(name))
        .map(|(_, v)| v.as_str())
}

/// Trimmed text content, `None` when empty.
pub fn text_of(node: &Element) -> Option<String> {
    let text: String = node
        .children
        .iter()
        .filter_map(|n| match n {
            XMLNode::Text(t) | XMLNode::CData(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn trim_leading_noise(xml: &[u8]) -> &[u8] {
    let xml = xml.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(xml);
    let start = xml
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(xml.len());
    &xml[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope" xmlns:ns2="http://www.cnj.jus.br/intercomunicacao-2.2.2">
  <soap:Body>{}</soap:Body>
</soap:Envelope>"#,
            inner
        )
    }

    #[test]
    fn test_parse_envelope_returns_operation_response() {
        let xml = envelope(
            "<ns2:entregarManifestacaoProcessualResposta><ns2:sucesso>true</ns2:sucesso></ns2:entregarManifestacaoProcessualResposta>",
        );
        let env = parse_envelope(xml.as_bytes()).unwrap();
        let response = env.operation_response().unwrap();

        assert_eq!(response.name, "entregarManifestacaoProcessualResposta");
        assert_eq!(extract_field(response, SUCCESS_FLAG), Some("true".into()));
    }

    #[test]
    fn test_parse_envelope_tolerates_bom_and_whitespace() {
        let mut xml = b"\xEF\xBB\xBF\r\n  ".to_vec();
        xml.extend_from_slice(envelope("<a/>").as_bytes());
        assert!(parse_envelope(&xml).is_ok());
    }

    #[test]
    fn test_non_envelope_is_invalid() {
        let err = parse_envelope(b"<html><body>502</body></html>").unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse(_)));
    }

    #[test]
    fn test_fault_is_reported() {
        let xml = envelope(
            r#"<soap:Fault><soap:Code><soap:Value>soap:Receiver</soap:Value></soap:Code><soap:Reason><soap:Text xml:lang="pt">Senha inválida</soap:Text></soap:Reason></soap:Fault>"#,
        );
        match parse_envelope(xml.as_bytes()).unwrap_err() {
            AppError::ServiceFault(reason) => assert_eq!(reason, "Senha inválida"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_strategies_fall_through_in_order() {
        let xml = envelope(
            r#"<r><recibo><protocolo>P-1</protocolo></recibo><parametro nome="numeroProcesso" valor="5000123"/></r>"#,
        );
        let env = parse_envelope(xml.as_bytes()).unwrap();
        let response = env.operation_response().unwrap();

        assert_eq!(extract_field(response, PROTOCOL_NUMBER), Some("P-1".into()));
        assert_eq!(extract_field(response, CASE_NUMBER), Some("5000123".into()));
        assert_eq!(extract_field(response, OPERATION_DATE), None);
    }

    #[test]
    fn test_attribute_strategy() {
        let xml = envelope(r#"<r sucesso="false" mensagem="Documento duplicado"/>"#);
        let env = parse_envelope(xml.as_bytes()).unwrap();
        let response = env.operation_response().unwrap();

        match ensure_success(response).unwrap_err() {
            AppError::SubmissionRejected(msg) => assert_eq!(msg, "Documento duplicado"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_flag_variants() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" FALSE "), Some(false));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_missing_flag_is_not_failure() {
        let xml = envelope("<r><protocoloRecebimento>1</protocoloRecebimento></r>");
        let env = parse_envelope(xml.as_bytes()).unwrap();
        assert!(ensure_success(env.operation_response().unwrap()).is_ok());
    }
}
