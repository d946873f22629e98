//! The blocking transfer primitive behind `Curl`.
//!
//! # Design
//! `Transport` is the only seam that touches the network: it takes a
//! `PreparedRequest`, performs exactly one blocking round-trip, and reports
//! an `Outcome`. It never returns an error; a failed transfer is an outcome
//! with a non-zero code, the way `curl_errno` reports it. HTTP error statuses
//! are ordinary outcomes with a body.
//!
//! `UreqTransport` is the production implementation. Tests substitute their
//! own transport to observe what the client sends.

use std::io;
use std::net::ToSocketAddrs;

use tracing::{debug, warn};
use ureq::http::{self, Uri};

use crate::config::ClientConfig;
use crate::error::{ErrorCode, Result};
use crate::http::PreparedRequest;

/// Redirect cap used when `FollowLocation` is on without `MaxRedirects`.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Largest body `UreqTransport` will buffer.
pub const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

/// Result of one transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Captured body. Empty when the transfer failed.
    pub body: Vec<u8>,
    /// Zero on success, otherwise an `ErrorCode` value.
    pub error: u32,
    /// Empty on success.
    pub message: String,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
}

impl Outcome {
    pub fn success(status: u16, body: Vec<u8>) -> Self {
        Self {
            body,
            error: 0,
            message: String::new(),
            status: Some(status),
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            body: Vec::new(),
            error: code.as_u32(),
            message: message.into(),
            status: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error == 0
    }
}

/// Executes prepared requests.
pub trait Transport {
    /// Allocate a handle for `config`.
    fn open(config: &ClientConfig) -> Result<Self>
    where
        Self: Sized;

    /// Perform one blocking transfer.
    fn execute(&mut self, request: &PreparedRequest) -> Outcome;
}

/// `Transport` backed by a `ureq::Agent`.
///
/// The agent is kept across requests. TLS verification is an agent-level
/// setting in ureq, so the agent is rebuilt when a request asks for the
/// other verification mode.
#[derive(Debug)]
pub struct UreqTransport {
    agent: ureq::Agent,
    verify_peer: bool,
}

impl UreqTransport {
    fn build_agent(verify_peer: bool) -> ureq::Agent {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!verify_peer)
            .build();
        ureq::Agent::config_builder()
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .tls_config(tls)
            .build()
            .new_agent()
    }

    fn run<B: ureq::AsSendBody>(
        &self,
        request: http::Request<B>,
        prepared: &PreparedRequest,
    ) -> std::result::Result<Outcome, ureq::Error> {
        let mut configured = self
            .agent
            .configure_request(request)
            .timeout_global(prepared.timeout)
            .timeout_connect(prepared.connect_timeout);
        if let Some(follow) = prepared.follow_location {
            let max = if follow {
                prepared.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS)
            } else {
                0
            };
            configured = configured.max_redirects(max);
        }

        let mut response = self.agent.run(configured.build())?;
        let status = response.status();

        let mut captured = Vec::new();
        if prepared.include_headers {
            let status_line = format!("{:?} {}\r\n", response.version(), status);
            captured.extend_from_slice(status_line.as_bytes());
            for (name, value) in response.headers() {
                captured.extend_from_slice(name.as_str().as_bytes());
                captured.extend_from_slice(b": ");
                captured.extend_from_slice(value.as_bytes());
                captured.extend_from_slice(b"\r\n");
            }
            captured.extend_from_slice(b"\r\n");
        }
        if !prepared.no_body {
            let body = response
                .body_mut()
                .with_config()
                .limit(MAX_BODY_BYTES)
                .read_to_vec()?;
            captured.extend_from_slice(&body);
        }

        Ok(Outcome::success(status.as_u16(), captured))
    }
}

impl Transport for UreqTransport {
    fn open(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        debug!(verify_peer = config.verify_peer, "opening transport");
        Ok(Self {
            agent: Self::build_agent(config.verify_peer),
            verify_peer: config.verify_peer,
        })
    }

    fn execute(&mut self, prepared: &PreparedRequest) -> Outcome {
        if prepared.url.is_empty() {
            return Outcome::failure(ErrorCode::UrlMalformed, "no URL set");
        }
        let uri: Uri = match prepared.url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                return Outcome::failure(ErrorCode::UrlMalformed, format!("{}: {e}", prepared.url))
            }
        };

        if let Err(outcome) = resolve(&uri) {
            warn!(url = %prepared.url, error = %outcome.message, "host lookup failed");
            return outcome;
        }

        if prepared.verify_peer != self.verify_peer {
            self.agent = Self::build_agent(prepared.verify_peer);
            self.verify_peer = prepared.verify_peer;
        }

        let mut builder = http::Request::builder()
            .method(prepared.method.as_str())
            .uri(uri);
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(agent) = &prepared.user_agent {
            builder = builder.header(http::header::USER_AGENT, agent.as_str());
        }

        let result = match &prepared.body {
            Some(body) => builder
                .body(body.clone())
                .map_err(|e| Outcome::failure(ErrorCode::FailedInit, e.to_string()))
                .map(|request| self.run(request, prepared)),
            None => builder
                .body(())
                .map_err(|e| Outcome::failure(ErrorCode::FailedInit, e.to_string()))
                .map(|request| self.run(request, prepared)),
        };

        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                let code = error_code(&err);
                warn!(url = %prepared.url, code = code.as_u32(), error = %err, "transfer failed");
                Outcome::failure(code, err.to_string())
            }
            Err(outcome) => outcome,
        }
    }
}

/// Look up the request host. A lookup failure is `CouldNotResolveHost`;
/// ureq would surface it as a plain I/O error.
fn resolve(uri: &Uri) -> std::result::Result<(), Outcome> {
    let Some(host) = uri.host() else {
        return Err(Outcome::failure(ErrorCode::UrlMalformed, "no host in URL"));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let default_port = match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    };
    let port = uri.port_u16().unwrap_or(default_port);
    match (host, port).to_socket_addrs() {
        Ok(addrs) if addrs.clone().next().is_some() => Ok(()),
        Ok(_) => Err(Outcome::failure(
            ErrorCode::CouldNotResolveHost,
            format!("could not resolve host: {host}"),
        )),
        Err(e) => Err(Outcome::failure(
            ErrorCode::CouldNotResolveHost,
            format!("could not resolve host: {host}: {e}"),
        )),
    }
}

/// Map a ureq failure onto the curl error numbering.
pub fn error_code(err: &ureq::Error) -> ErrorCode {
    match err {
        ureq::Error::HostNotFound => ErrorCode::CouldNotResolveHost,
        ureq::Error::ConnectionFailed => ErrorCode::CouldNotConnect,
        ureq::Error::Timeout(_) => ErrorCode::OperationTimedOut,
        ureq::Error::BadUri(_) => ErrorCode::UrlMalformed,
        ureq::Error::TooManyRedirects => ErrorCode::TooManyRedirects,
        ureq::Error::Tls(_) => ErrorCode::SslConnectError,
        ureq::Error::BodyExceedsLimit(_) => ErrorCode::FileSizeExceeded,
        ureq::Error::Io(e) => io_error_code(e),
        _ => ErrorCode::RecvError,
    }
}

fn io_error_code(err: &io::Error) -> ErrorCode {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ErrorCode::CouldNotConnect,
        io::ErrorKind::TimedOut => ErrorCode::OperationTimedOut,
        _ => ErrorCode::RecvError,
    }
}
