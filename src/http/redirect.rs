//! Plain listener for HTTP to HTTPS redirects.
//!
//! Opened next to the HTTPS listener when redirects are enabled. It serves
//! the same router; the pipeline's redirect stage answers every request
//! because nothing on this listener arrives over TLS.

use std::net::{SocketAddr, TcpListener};

use axum::Router;
use axum_server::Handle;

use crate::security::ConnectionScheme;

use super::server::{bind, make_service};

/// Binds the redirect listener on the main listener's IP.
///
/// Failure is logged and not fatal: the HTTPS listener keeps running.
pub fn bind_redirect_listener(main_addr: SocketAddr, port: u16) -> Option<TcpListener> {
    let addr = SocketAddr::new(main_addr.ip(), port);
    match bind(addr) {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind HTTP redirect listener");
            None
        }
    }
}

/// Spawn the redirect server in the background.
pub fn spawn_redirect_server(listener: TcpListener, app: Router, handle: Handle) {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "HTTP (redirect) listening");
        }

        match axum_server::from_tcp(listener)
            .handle(handle)
            .serve(make_service(app, ConnectionScheme::Http))
            .await
        {
            Ok(()) => {
                tracing::debug!("HTTP redirect server stopped");
            }
            Err(e) => {
                tracing::error!(error = %e, "HTTP redirect server failed");
            }
        }
    });
}
