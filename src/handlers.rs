use crate::codec;
use crate::config::{validate_endpoint_url, Config};
use crate::errors::{AppError, ResultExt};
use crate::mni_client::{MniClient, MniSettings};
use crate::models::*;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Config,
    /// Client bound to the current MNI environment. Replaced wholesale on an
    /// environment switch; in-flight calls keep the client they started with.
    client: RwLock<Arc<MniClient>>,
}

impl AppState {
    pub fn new(config: Config, client: MniClient) -> Self {
        Self {
            config,
            client: RwLock::new(Arc::new(client)),
        }
    }

    /// Snapshot of the active client.
    pub fn client(&self) -> Result<Arc<MniClient>, AppError> {
        self.client
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| AppError::InternalError("MNI client lock poisoned".to_string()))
    }

    fn replace_client(&self, client: MniClient) -> Result<(), AppError> {
        let mut guard = self
            .client
            .write()
            .map_err(|_| AppError::InternalError("MNI client lock poisoned".to_string()))?;
        *guard = Arc::new(client);
        Ok(())
    }
}

/// Health check endpoint.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with service status and the
///   MNI environment currently in use.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let environment = state.client().ok().map(|client| {
        let settings = client.settings();
        json!({
            "version": settings.version,
            "system": settings.system,
            "environment": settings.environment,
        })
    });

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "mni-mtom-client",
            "version": env!("CARGO_PKG_VERSION"),
            "mni": environment,
        })),
    )
}

/// POST /api/v1/documents/content
///
/// Retrieves the binary content of one document of a case.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - Credentials, process number and document id.
///
/// # Returns
///
/// * `Result<Json<DocumentPayload>, AppError>` - Base64 content and MIME type.
pub async fn get_document_content(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DocumentContentRequest>,
) -> Result<Json<DocumentPayload>, AppError> {
    tracing::info!(
        "Document content requested: process {} document {}",
        payload.process_number,
        payload.document_id
    );

    if payload.process_number.trim().is_empty() || payload.document_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "processNumber and documentId are required".to_string(),
        ));
    }

    let client = state.client()?;
    let document = client
        .get_document_content(
            &payload.credentials,
            &payload.process_number,
            &payload.document_id,
        )
        .await?;

    Ok(Json(document))
}

/// POST /api/v1/petitions
///
/// Files an intermediate petition on an existing case.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - Credentials, target process and the base64 document.
///
/// # Returns
///
/// * `Result<Json<PetitionReceipt>, AppError>` - Protocol number, date and receipt.
pub async fn submit_petition(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PetitionRequest>,
) -> Result<Json<PetitionReceipt>, AppError> {
    tracing::info!(
        "Petition submission for process {} (type {}, file {})",
        payload.process_number,
        payload.document_type_code,
        payload.file_name
    );

    let content_bytes =
        codec::decode(&payload.content_base64).context("decoding contentBase64")?;

    let petition = Petition {
        document_type_code: payload.document_type_code,
        content_bytes,
        file_name: payload.file_name,
        mime_type: payload.mime_type,
        description: payload.description,
        attorney_id: payload.attorney_id,
    };

    let client = state.client()?;
    let receipt = client
        .submit_intermediate_petition(&payload.credentials, &payload.process_number, &petition)
        .await?;

    tracing::info!(
        "Petition accepted for process {}: protocol {}",
        payload.process_number,
        receipt.protocol_number
    );

    Ok(Json(receipt))
}

/// POST /api/v1/filings
///
/// Files a new case.
pub async fn submit_filing(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FilingRequest>,
) -> Result<Json<FilingReceipt>, AppError> {
    tracing::info!(
        "Initial filing: class {} at locality {} ({} documents)",
        payload.filing.class_code,
        payload.filing.locality_code,
        payload.filing.documents.len()
    );

    let client = state.client()?;
    let receipt = client
        .submit_initial_filing(&payload.credentials, &payload.filing)
        .await?;

    tracing::info!("New case {} created", receipt.case_number);

    Ok(Json(receipt))
}

/// PUT /api/v1/environment
///
/// Rebinds the service to another MNI endpoint/version. A fresh client is
/// built and swapped in; the previous one is dropped once its in-flight calls
/// finish.
pub async fn switch_environment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EnvironmentSwitchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!(
        "Switching MNI environment to {} {}/{} at {}",
        payload.version,
        payload.system,
        payload.environment,
        payload.endpoint_url
    );

    validate_endpoint_url(&payload.endpoint_url)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let current = state.client()?;
    let settings = MniSettings {
        endpoint_url: payload.endpoint_url,
        version: payload.version,
        system: payload.system,
        environment: payload.environment,
        digest_case: payload
            .digest_case
            .unwrap_or(current.settings().digest_case),
        timeout: payload
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(current.settings().timeout),
    };

    if current.settings() == &settings {
        tracing::debug!("MNI environment unchanged");
    } else {
        let client = MniClient::new(settings).context("rebuilding MNI client")?;
        state.replace_client(client)?;
    }

    let active = state.client()?;
    let settings = active.settings();
    Ok(Json(json!({
        "endpointUrl": settings.endpoint_url,
        "version": settings.version,
        "system": settings.system,
        "environment": settings.environment,
        "digestCase": settings.digest_case,
        "timeoutSecs": settings.timeout.as_secs(),
    })))
}
