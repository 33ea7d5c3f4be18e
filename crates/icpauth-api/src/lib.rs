//! icpauth API - HTTPS interface for ICP-Brasil client certificate authentication
//!
//! Terminates mutual TLS, captures the client certificate chain and exposes
//! the identity extraction pipeline over a small REST surface.
//!
//! # Endpoints
//!
//! - `GET /api/certificate/validate` - identity record for the presented certificate
//! - `GET /api/certificate/debug` - what the TLS layer saw on this connection
//! - `GET /api/health/status` - liveness
//! - `GET /api-docs/openapi.json` - OpenAPI document
//!
//! # Example
//!
//! ```no_run
//! use icpauth_api::ServerBuilder;
//! use icpauth_core::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_file("config/icpauth.yaml")?;
//!     let server = ServerBuilder::new(config).build()?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod listener;
pub mod middleware;
pub mod rest;
pub mod tls;
pub mod types;

use icpauth_cert::IdentityExtractor;
use icpauth_core::config::ApiConfig;
use icpauth_core::AppConfig;
use listener::{HttpsListener, ListenerStats};
use middleware::{
    certificate_logging_middleware, cors_layer, logging_middleware, request_id_middleware,
    security_headers_middleware, timeout_middleware,
};
use rest::ApiState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_rustls::TlsAcceptor;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{info, warn};
use utoipa::OpenApi;

// ============================================================================
// OpenAPI Documentation
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ICP-Brasil Authenticator API",
        description = "Identity extraction from ICP-Brasil client certificates presented over mutual TLS",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    paths(
        rest::validate_certificate,
        rest::debug_certificate,
        rest::health_status,
    ),
    components(
        schemas(
            icpauth_cert::IdentityRecord,
            icpauth_cert::ChainLinkSummary,
            types::CertificateDebugInfo,
            types::HealthStatus,
            types::ErrorResponse,
            types::ErrorMessage,
        )
    ),
    tags(
        (name = "certificate", description = "Client certificate identity"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

// ============================================================================
// Router
// ============================================================================

/// Routes plus the middleware stack. Requests are expected to carry a
/// [`types::ClientConnection`] extension, which the listener inserts.
pub fn build_router(state: ApiState, config: &ApiConfig) -> axum::Router {
    let mut app = rest::create_rest_router(state);

    if config.enable_openapi {
        let openapi = ApiDoc::openapi();
        app = app.route(
            "/api-docs/openapi.json",
            axum::routing::get(|| async move { axum::Json(openapi) }),
        );
        info!("OpenAPI spec available at /api-docs/openapi.json");
    }

    app = app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(axum::middleware::from_fn(security_headers_middleware))
            .layer(axum::middleware::from_fn(logging_middleware))
            .layer(axum::middleware::from_fn(certificate_logging_middleware))
            .layer(axum::middleware::from_fn_with_state(
                config.request_timeout(),
                timeout_middleware,
            ))
            .layer(CompressionLayer::new()),
    );

    if config.cors {
        app = app.layer(cors_layer());
    }

    app
}

// ============================================================================
// Server Builder
// ============================================================================

pub struct ServerBuilder {
    config: AppConfig,
    extractor: Option<Arc<IdentityExtractor>>,
}

impl ServerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            extractor: None,
        }
    }

    /// Replace the default extractor (system clock, SHA-256, UUIDs, tracing audit sink)
    pub fn with_extractor(mut self, extractor: Arc<IdentityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Validate the configuration and load TLS material
    pub fn build(self) -> anyhow::Result<Server> {
        self.config.validate()?;

        let acceptor = match &self.config.server.tls {
            Some(tls) => Some(tls::build_tls_acceptor(tls)?),
            None => {
                warn!("TLS disabled - client certificates cannot be received");
                None
            }
        };

        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(IdentityExtractor::default()));

        let tls_port = acceptor.as_ref().and(self.config.server.port());
        let router = build_router(ApiState::new(extractor, tls_port), &self.config.api);

        Ok(Server {
            config: self.config,
            acceptor,
            router,
        })
    }
}

// ============================================================================
// Server
// ============================================================================

pub struct Server {
    config: AppConfig,
    acceptor: Option<TlsAcceptor>,
    router: axum::Router,
}

impl Server {
    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    /// Bind the configured address without serving yet
    pub async fn listen(&self) -> anyhow::Result<HttpsListener> {
        let bind_addr = self.config.server.socket_addr()?;
        let listener = HttpsListener::bind(
            bind_addr,
            self.acceptor.clone(),
            self.config.server.max_connections,
        )
        .await?;

        Ok(listener.with_drain_timeout(Duration::from_secs(self.config.app.shutdown_timeout_secs)))
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await.map(|_| ())
    }

    /// Run until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<ListenerStats>
    where
        F: Future<Output = ()> + Send,
    {
        info!(
            name = %self.config.app.name,
            environment = %self.config.app.environment,
            "Starting ICP-Brasil authenticator"
        );

        let listener = self.listen().await?;
        info!(address = %listener.local_addr()?, tls = self.acceptor.is_some(), "Server listening");

        let stats = listener.serve(self.router, shutdown).await?;

        info!("Server shutdown complete");
        Ok(stats)
    }
}

// ============================================================================
// Graceful Shutdown
// ============================================================================

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl-C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
