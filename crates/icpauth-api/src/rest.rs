//! REST API endpoints using Axum

use crate::types::*;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::USER_AGENT, request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use icpauth_cert::{IdentityExtractor, IdentityRecord};
use icpauth_core::channel::ACCESS_TARGET;
use icpauth_core::IcpAuthError;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub extractor: Arc<IdentityExtractor>,
    /// Port the TLS listener serves on, `None` when TLS is disabled
    pub tls_port: Option<u16>,
}

impl ApiState {
    pub fn new(extractor: Arc<IdentityExtractor>, tls_port: Option<u16>) -> Self {
        Self {
            extractor,
            tls_port,
        }
    }
}

// ============================================================================
// Router Setup
// ============================================================================

pub fn create_rest_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/certificate/validate", get(validate_certificate))
        .route("/api/certificate/debug", get(debug_certificate))
        .route("/api/health/status", get(health_status))
        .with_state(state)
}

// ============================================================================
// Certificate Endpoints
// ============================================================================

/// GET /api/certificate/validate - Extract identity from the client certificate
#[utoipa::path(
    get,
    path = "/api/certificate/validate",
    tag = "certificate",
    responses(
        (status = 200, description = "Certificate processed", body = IdentityRecord),
        (status = 400, description = "No client certificate presented"),
        (status = 500, description = "Certificate could not be processed", body = ErrorResponse)
    )
)]
pub async fn validate_certificate(
    State(state): State<ApiState>,
    connection: ClientConnection,
    headers: HeaderMap,
) -> Result<Json<IdentityRecord>, ApiError> {
    let remote_addr = connection.remote_ip();

    info!(target: ACCESS_TARGET, remote_addr = %remote_addr, "Certificate validation request received");

    if !connection.has_certificates() {
        warn!(target: ACCESS_TARGET, remote_addr = %remote_addr, "No client certificate presented");
        return Err(ApiError::NoCertificate);
    }

    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());

    let record = state
        .extractor
        .extract_der(&connection.peer_chain[..], &remote_addr, user_agent)
        .map_err(|e| {
            error!(target: ACCESS_TARGET, remote_addr = %remote_addr, error = %e, "Certificate processing failed");
            ApiError::from(e)
        })?;

    info!(
        target: ACCESS_TARGET,
        remote_addr = %remote_addr,
        subject = %record.subject_name,
        "Certificate processed"
    );

    Ok(Json(record))
}

/// GET /api/certificate/debug - Report what the TLS layer saw on this connection
#[utoipa::path(
    get,
    path = "/api/certificate/debug",
    tag = "certificate",
    responses(
        (status = 200, description = "Connection details", body = CertificateDebugInfo)
    )
)]
pub async fn debug_certificate(connection: ClientConnection) -> Json<CertificateDebugInfo> {
    let info = CertificateDebugInfo::from(&connection);

    info!(
        target: ACCESS_TARGET,
        remote_addr = %info.remote_addr,
        scheme = %info.scheme,
        server_port = info.server_port,
        is_secure = info.is_secure,
        certificates_found = info.certificates_found,
        certificate_count = info.certificate_count,
        "Certificate debug requested"
    );

    Json(info)
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /api/health/status - Liveness
#[utoipa::path(
    get,
    path = "/api/health/status",
    tag = "health",
    responses(
        (status = 200, description = "Service is running", body = HealthStatus)
    )
)]
pub async fn health_status(State(state): State<ApiState>) -> Json<HealthStatus> {
    let ssl = match state.tls_port {
        Some(port) => format!("Enabled on port {}", port),
        None => "Disabled".to_string(),
    };

    Json(HealthStatus {
        status: "UP".to_string(),
        timestamp: Utc::now(),
        message: "ICP-Brasil Authenticator is running".to_string(),
        ssl,
    })
}

// ============================================================================
// Connection Extractor
// ============================================================================

impl<S> FromRequestParts<S> for ClientConnection
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ClientConnection>()
            .cloned()
            .ok_or(ApiError::MissingConnection)
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The TLS session carried no client certificate. Rendered without a body.
    #[error("No client certificate presented")]
    NoCertificate,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Certificate processing failed: {0}")]
    Extraction(String),

    /// The listener did not attach connection details to the request
    #[error("Connection context missing")]
    MissingConnection,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<IcpAuthError> for ApiError {
    fn from(err: IcpAuthError) -> Self {
        match err {
            IcpAuthError::Input(e) => ApiError::BadRequest(e.to_string()),
            IcpAuthError::Extraction(e) => ApiError::Extraction(e.message),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NoCertificate => return StatusCode::BAD_REQUEST.into_response(),
            ApiError::BadRequest(msg) => {
                info!(target: ACCESS_TARGET, message = %msg, "Invalid request");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Extraction(msg) => {
                error!(target: ACCESS_TARGET, error = %msg, "Certificate validation error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error while validating the certificate".to_string(),
                )
            }
            ApiError::MissingConnection => {
                error!(target: ACCESS_TARGET, "Request reached handler without connection context");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                error!(target: ACCESS_TARGET, error = %msg, "Internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
