//! Listener startup.
//!
//! Startup moves through `INIT → (HTTPS_ATTEMPT | HTTP_BIND) → LISTENING`.
//! A failed HTTPS attempt (unreadable certificate material or a TLS socket
//! that cannot be bound) is logged and followed by a plain HTTP bind on the
//! same address. Only a failed plain bind is reported to the caller.

use std::net::{SocketAddr, TcpListener};

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::{Extension, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;

use crate::config::{HttpsConfig, SecurityConfig};
use crate::security::ConnectionScheme;

use super::redirect;
use super::shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    Address(String),

    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    #[error("Failed to load TLS configuration: {0}")]
    TlsConfig(String),

    #[error("Server error: {0}")]
    Serve(std::io::Error),
}

/// Transport the main listener ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Https,
    /// Plain HTTP; `fell_back` is set when HTTPS was configured but failed
    Http { fell_back: bool },
}

enum Listener {
    Plain(TcpListener),
    Tls {
        listener: TcpListener,
        tls: RustlsConfig,
        cert_path: String,
        key_path: String,
    },
}

/// A bound, not yet serving, server.
pub struct Launched {
    app: Router,
    listener: Listener,
    transport: Transport,
    local_addr: SocketAddr,
    redirect: Option<TcpListener>,
    handle: Handle,
}

impl Launched {
    fn new(
        app: Router,
        listener: Listener,
        transport: Transport,
        redirect: Option<TcpListener>,
    ) -> Result<Self, ServerError> {
        let local_addr = match &listener {
            Listener::Plain(listener) | Listener::Tls { listener, .. } => listener.local_addr()?,
        };
        Ok(Self {
            app,
            listener,
            transport,
            local_addr,
            redirect,
            handle: Handle::new(),
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the HTTP->HTTPS redirect listener, if one was opened.
    pub fn redirect_addr(&self) -> Option<SocketAddr> {
        self.redirect.as_ref().and_then(|listener| listener.local_addr().ok())
    }

    /// Handle for stopping the main listener.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Serves connections until shutdown.
    pub async fn serve(self) -> Result<(), ServerError> {
        let mut handles = vec![self.handle.clone()];

        if let Some(listener) = self.redirect {
            let redirect_handle = Handle::new();
            handles.push(redirect_handle.clone());
            redirect::spawn_redirect_server(listener, self.app.clone(), redirect_handle);
        }

        shutdown::setup_shutdown_handler(handles);

        let result = match self.listener {
            Listener::Plain(listener) => {
                axum_server::from_tcp(listener)
                    .handle(self.handle)
                    .serve(make_service(self.app, ConnectionScheme::Http))
                    .await
            }
            Listener::Tls {
                listener,
                tls,
                cert_path,
                key_path,
            } => {
                // Setup SIGHUP handler for certificate reload
                shutdown::setup_reload_handler(tls.clone(), cert_path, key_path);

                axum_server::tls_rustls::from_tcp_rustls(listener, tls)
                    .handle(self.handle)
                    .serve(make_service(self.app, ConnectionScheme::Https))
                    .await
            }
        };

        result.map_err(ServerError::Serve)
    }
}

/// Router as a connection-aware service, tagged with the listener's scheme.
pub fn make_service(
    app: Router,
    scheme: ConnectionScheme,
) -> IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
    app.layer(Extension(scheme))
        .into_make_service_with_connect_info::<SocketAddr>()
}

/// Binds the listener for the resolved security options.
///
/// HTTPS failures fall back to plain HTTP and never surface as errors.
pub async fn launch(
    app: Router,
    security: &SecurityConfig,
    host: &str,
    port: u16,
) -> Result<Launched, ServerError> {
    let addr = resolve_addr(host, port).await?;

    if security.https.enabled {
        tracing::debug!(%addr, "Attempting HTTPS startup");
        match bind_tls(addr, &security.https).await {
            Ok((listener, tls)) => {
                let redirect = if security.https.redirect_http_to_https {
                    redirect::bind_redirect_listener(addr, security.https.redirect_port)
                } else {
                    None
                };
                let launched = Launched::new(
                    app,
                    Listener::Tls {
                        listener,
                        tls,
                        cert_path: security.https.cert_path.clone(),
                        key_path: security.https.key_path.clone(),
                    },
                    Transport::Https,
                    redirect,
                )?;
                tracing::info!(
                    addr = %launched.local_addr,
                    preset = %security.preset,
                    "HTTPS server listening"
                );
                return Ok(launched);
            }
            Err(e) => {
                tracing::error!(error = %e, "HTTPS startup failed, falling back to HTTP");
            }
        }
    }

    let fell_back = security.https.enabled;
    let launched = Launched::new(
        app,
        Listener::Plain(bind(addr)?),
        Transport::Http { fell_back },
        None,
    )?;

    if !security.https.enabled {
        tracing::warn!("TLS disabled - server running on plain HTTP (not recommended for production)");
    }
    tracing::info!(
        addr = %launched.local_addr,
        preset = %security.preset,
        "HTTP server listening"
    );

    Ok(launched)
}

async fn bind_tls(addr: SocketAddr, https: &HttpsConfig) -> Result<(TcpListener, RustlsConfig), ServerError> {
    tracing::info!(cert = %https.cert_path, key = %https.key_path, "Loading TLS certificates");

    let tls = RustlsConfig::from_pem_file(&https.cert_path, &https.key_path)
        .await
        .map_err(|e| ServerError::TlsConfig(format!("Failed to load certificates: {}", e)))?;

    let listener = bind(addr)?;
    Ok((listener, tls))
}

pub(super) fn bind(addr: SocketAddr) -> Result<TcpListener, std::io::Error> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let invalid = || ServerError::Address(format!("{}:{}", host, port));
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| invalid())?
        .next()
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn app() -> Router {
        Router::new().route("/health", get(|| async { "OK" }))
    }

    #[tokio::test]
    async fn test_plain_launch() {
        let security = SecurityConfig::default();
        let launched = launch(app(), &security, "127.0.0.1", 0).await.unwrap();

        assert_eq!(launched.transport(), Transport::Http { fell_back: false });
        assert_ne!(launched.local_addr().port(), 0);
        assert!(launched.redirect_addr().is_none());
    }

    #[tokio::test]
    async fn test_missing_certificates_fall_back_to_http() {
        let mut security = SecurityConfig::default();
        security.https.enabled = true;
        security.https.redirect_http_to_https = true;
        security.https.cert_path = "/nonexistent/cert.pem".to_string();
        security.https.key_path = "/nonexistent/key.pem".to_string();

        let launched = launch(app(), &security, "127.0.0.1", 0).await.unwrap();
        assert_eq!(launched.transport(), Transport::Http { fell_back: true });
        assert!(launched.redirect_addr().is_none());
    }

    #[tokio::test]
    async fn test_invalid_pem_falls_back_to_http() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "not a certificate").unwrap();
        std::fs::write(&key, "not a key").unwrap();

        let mut security = SecurityConfig::default();
        security.https.enabled = true;
        security.https.cert_path = cert.display().to_string();
        security.https.key_path = key.display().to_string();

        let launched = launch(app(), &security, "127.0.0.1", 0).await.unwrap();
        assert_eq!(launched.transport(), Transport::Http { fell_back: true });
    }

    #[tokio::test]
    async fn test_port_in_use_is_an_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = launch(app(), &SecurityConfig::default(), "127.0.0.1", port).await;
        assert!(matches!(result, Err(ServerError::Bind(_))));
    }
}
