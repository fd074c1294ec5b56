//! Client-side log sink.
//!
//! Browser pages report events with `GET /log?msg=...`. Messages are written
//! to the server log under the `client_log` target and never stored.

use axum::extract::Query;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    msg: Option<String>,
}

pub async fn client_log(Query(query): Query<LogQuery>) -> &'static str {
    let msg = query.msg.as_deref().unwrap_or("(empty)");
    tracing::info!(target: "client_log", "{}", msg);
    "OK"
}
