//! Middleware for request ids, access and client certificate logging, timeouts,
//! CORS and security headers

use crate::types::{ClientConnection, ErrorResponse};
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use icpauth_cert::{
    attribute_value, email_attribute, national_id_from_common_name, CertificateView,
    ParsedCertificate,
};
use icpauth_core::channel::ACCESS_TARGET;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

// ============================================================================
// Access Logging Middleware
// ============================================================================

pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let remote_addr = request
        .extensions()
        .get::<ClientConnection>()
        .map(ClientConnection::remote_ip)
        .unwrap_or_else(|| "unknown".to_string());
    let request_id = request.extensions().get::<Uuid>().copied();

    debug!(
        target: ACCESS_TARGET,
        method = %method,
        uri = %uri,
        version = ?request.version(),
        remote_addr = %remote_addr,
        "Incoming request"
    );

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    info!(
        target: ACCESS_TARGET,
        method = %method,
        uri = %uri,
        remote_addr = %remote_addr,
        request_id = ?request_id,
        status = response.status().as_u16(),
        duration_ms = elapsed.as_millis(),
        "Request completed"
    );

    response
}

// ============================================================================
// Client Certificate Logging Middleware
// ============================================================================

/// Logs the leaf certificate of the connection, or its absence, before the
/// request is handled. Never rejects a request.
pub async fn certificate_logging_middleware(request: Request, next: Next) -> Response {
    if let Some(connection) = request.extensions().get::<ClientConnection>() {
        match connection.peer_chain.first() {
            Some(leaf) => log_client_certificate(leaf, &connection.remote_ip()),
            None => info!(
                target: ACCESS_TARGET,
                remote_addr = %connection.remote_ip(),
                "No client certificate on request"
            ),
        }
    }

    next.run(request).await
}

fn log_client_certificate(der: &[u8], remote_addr: &str) {
    let cert = match ParsedCertificate::from_der(der) {
        Ok(cert) => cert,
        Err(e) => {
            error!(target: ACCESS_TARGET, remote_addr = %remote_addr, error = %e, "Failed to read client certificate details");
            return;
        }
    };
    let (subject, issuer) = match (cert.subject_dn(), cert.issuer_dn()) {
        (Ok(subject), Ok(issuer)) => (subject, issuer),
        (Err(e), _) | (_, Err(e)) => {
            error!(target: ACCESS_TARGET, remote_addr = %remote_addr, error = %e, "Failed to read client certificate details");
            return;
        }
    };

    let common_name = attribute_value(subject, "CN");
    let cpf = common_name.and_then(national_id_from_common_name);
    let email = email_attribute(subject);

    info!(
        target: ACCESS_TARGET,
        remote_addr = %remote_addr,
        subject = %subject,
        issuer = %issuer,
        serial_number = %cert.serial_number(),
        not_before = %cert.not_before().to_rfc3339(),
        not_after = %cert.not_after().to_rfc3339(),
        version = cert.version(),
        signature_algorithm = %cert.signature_algorithm(),
        common_name = common_name.unwrap_or("null"),
        cpf = cpf.unwrap_or("null"),
        email = email.unwrap_or("null"),
        "Client certificate presented"
    );
}

// ============================================================================
// Security Headers Middleware
// ============================================================================

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));

    response
}

// ============================================================================
// CORS Configuration
// ============================================================================

/// Any origin, method and header.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}

// ============================================================================
// Request ID Middleware
// ============================================================================

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

// ============================================================================
// Timeout Middleware
// ============================================================================

pub async fn timeout_middleware(
    State(timeout): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let uri = request.uri().clone();

    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(target: ACCESS_TARGET, uri = %uri, timeout_ms = timeout.as_millis(), "Request timeout");
            let error = ErrorResponse::new("Request took too long to process");
            (StatusCode::REQUEST_TIMEOUT, Json(error)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_request_id_and_security_headers() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(security_headers_middleware))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
        assert_eq!(response.headers()["X-Frame-Options"], "DENY");
        assert_eq!(response.headers()["X-Content-Type-Options"], "nosniff");
    }

    #[tokio::test]
    async fn test_timeout_middleware() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                Duration::from_millis(20),
                timeout_middleware,
            ));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_logging_middleware_passes_through() {
        let app = Router::new()
            .route("/", get(|| async { StatusCode::ACCEPTED }))
            .layer(axum::middleware::from_fn(logging_middleware));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
