//! HTTP transport.
//!
//! Binds the listener chosen by the resolved security options:
//! - **HTTPS**: PEM certificate and key from disk, optionally with a plain
//!   listener that only redirects to HTTPS
//! - **HTTP**: plain listener, also used when HTTPS startup fails
//!
//! The server includes:
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Certificate hot-reload via SIGHUP (HTTPS only)

mod redirect;
mod server;
mod shutdown;
pub mod static_files;

pub use server::{launch, make_service, Launched, ServerError, Transport};
