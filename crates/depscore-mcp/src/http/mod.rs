//! Stateful multi-session HTTP transport.
//!
//! One protocol runtime per session, selected by the `mcp-session-id`
//! header, with an optional SSE channel per session for server-initiated
//! messages.

mod error;
pub mod headers;
mod registry;
mod router;
mod session;
mod stream;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use depscore_core::config::HttpConfig;
use depscore_core::ScoreProvider;
use tokio::net::TcpListener;

pub use error::HttpError;
pub use registry::{RegistryError, SessionRegistry};
pub use router::{router, HEALTH_PATH, SERVICE_NAME};
pub use session::{CloseReason, Session, SessionLifecycle, SessionObserver};
pub use stream::{EventStream, StreamingChannel};

/// Transport settings derived from the `[http]` config section.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub path: String,
    pub allowed_origins: Vec<String>,
    pub keep_alive: Duration,
    /// `Access-Control-Allow-Origin` value when the request has no usable origin.
    pub default_origin: String,
}

impl TryFrom<&HttpConfig> for HttpSettings {
    type Error = depscore_core::Error;

    fn try_from(config: &HttpConfig) -> depscore_core::Result<Self> {
        config.validate()?;
        Ok(Self {
            path: config.path.clone(),
            allowed_origins: config.origin_allow_list(),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            default_origin: format!("http://localhost:{}", config.port),
        })
    }
}

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub lifecycle: Arc<SessionLifecycle>,
    pub settings: Arc<HttpSettings>,
}

impl HttpState {
    pub fn new(provider: Arc<dyn ScoreProvider>, settings: HttpSettings) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            lifecycle: SessionLifecycle::new(registry, provider),
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.lifecycle.registry()
    }
}

/// Bind `0.0.0.0:port` and serve until `shutdown` resolves.
pub async fn serve<F>(port: u16, state: HttpState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already bound listener.
///
/// When `shutdown` resolves every open session is closed, which ends its
/// stream so the graceful shutdown can complete.
pub async fn serve_on<F>(listener: TcpListener, state: HttpState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %local_addr,
        "Socket MCP HTTP server listening at http://localhost:{}{}",
        local_addr.port(),
        state.settings.path
    );

    let lifecycle = Arc::clone(&state.lifecycle);
    let signal = async move {
        shutdown.await;
        let closed = lifecycle.close_all(CloseReason::Shutdown);
        tracing::info!(closed, "Shutting down HTTP server");
    };

    axum::serve(listener, router(state))
        .with_graceful_shutdown(signal)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = HttpConfig::default();
        config.port = 4100;
        config.path = "/mcp".to_string();

        let settings = HttpSettings::try_from(&config).unwrap();
        assert_eq!(settings.path, "/mcp");
        assert_eq!(settings.keep_alive, Duration::from_secs(30));
        assert_eq!(settings.default_origin, "http://localhost:4100");
        assert!(settings
            .allowed_origins
            .contains(&"http://127.0.0.1:4100".to_string()));
    }

    #[test]
    fn test_settings_reject_unroutable_config() {
        let mut config = HttpConfig::default();
        config.path = HEALTH_PATH.to_string();
        assert!(HttpSettings::try_from(&config).is_err());

        let mut config = HttpConfig::default();
        config.keep_alive_secs = 0;
        assert!(HttpSettings::try_from(&config).is_err());
    }
}
