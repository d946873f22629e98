use std::{collections::BTreeMap, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, RawQuery},
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::debug;

/// Fixed payload served by `/test/download`.
pub const DOWNLOAD_BYTES: &[u8] = b"\x00\x01binary payload\xff\xfe\r\n";

/// How long `/test/slow` waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_secs(3);

/// What `/test/echo` saw.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/test/get", get(|| async { "test get success" }))
        .route("/test/post", axum::routing::post(|| async { "test post success" }))
        .route("/test/put", axum::routing::put(|| async { "test put success" }))
        .route("/test/delete", axum::routing::delete(|| async { "test delete success" }))
        .route("/test/patch", axum::routing::patch(|| async { "test patch success" }))
        .route("/test/head", get(head))
        .route("/test/echo", any(echo))
        .route("/test/status/{code}", any(status))
        .route("/test/download", get(|| async { DOWNLOAD_BYTES }))
        .route("/test/slow", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn head() -> ([(&'static str, &'static str); 1], &'static str) {
    ([("x-fixture", "head")], "head body")
}

async fn echo(
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Echo> {
    debug!(%method, ?query, "echo");
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        query,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_DELAY).await;
    "finally"
}
