//! MNI MTOM Client Library
//!
//! Core of a client for the Brazilian judiciary's MNI (Modelo Nacional de
//! Interoperabilidade) SOAP 1.2 web services, versions 2.2 and 3.0: envelope
//! construction, MTOM/XOP response handling and document normalization.
//!
//! # Modules
//!
//! - `codec`: Base64 helpers for document content.
//! - `config`: Configuration management.
//! - `envelope`: SOAP envelope construction per MNI version.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `hasher`: Date-salted password digest and content hashes.
//! - `mni_client`: Operation orchestration (content retrieval, petitions, filings).
//! - `models`: Domain and request/response models.
//! - `multipart`: `multipart/related` parsing.
//! - `soap_response`: SOAP envelope parsing and field extraction.
//! - `transport`: HTTP transport for SOAP exchanges.
//! - `xop`: XOP reference resolution against multipart attachments.

pub mod codec;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod handlers;
pub mod hasher;
pub mod mni_client;
pub mod models;
pub mod multipart;
pub mod soap_response;
pub mod transport;
pub mod xop;
