//! syslib-server: a small web server with preset-driven security middleware.
//!
//! Startup resolves a named security preset into concrete options, builds
//! the request pipeline from them and launches the listener, preferring
//! HTTPS and falling back to plain HTTP.

pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod runner;
pub mod security;
pub mod state;
