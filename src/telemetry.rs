//! Telemetry
//!
//! Logging initialisation and the explicit trace handle passed down the
//! call chain. Nothing here is looked up from global state: `main` builds one
//! `Tracer`, stores it in the application state, and every operation that
//! wants a span receives a `TraceContext` argument.

use std::sync::Arc;

use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the tracing subscriber.
///
/// Defaults to "info" level, can be overridden with RUST_LOG env var.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artifact_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// == Tracer ==
/// Process-wide trace handle, created once at start-up.
#[derive(Debug, Clone)]
pub struct Tracer {
    service: Arc<str>,
}

impl Tracer {
    pub fn new(service: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Opens the root span for one inbound operation.
    pub fn request(&self, operation: &'static str) -> TraceContext {
        let span = tracing::info_span!(
            "rpc",
            service = %self.service,
            operation = operation,
        );
        TraceContext { span }
    }

    /// A context that records nothing; used by tests and offline tools.
    pub fn disabled() -> TraceContext {
        TraceContext { span: Span::none() }
    }
}

// == Trace Context ==
/// Span handle threaded through operation parameters.
#[derive(Debug, Clone)]
pub struct TraceContext {
    span: Span,
}

impl TraceContext {
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Opens a child span for a dependency call.
    pub fn child(&self, name: &'static str) -> Span {
        tracing::info_span!(parent: &self.span, "call", dependency = name)
    }
}
