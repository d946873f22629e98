//! Error types for the curl client.
//!
//! # Design
//! Ordinary request methods never return an error for a failed transfer:
//! the failure is recorded on the client and read back through
//! `Curl::error()` / `Curl::message()`. `CurlError` is only raised by
//! `download`, by construction with an unusable configuration, and by the
//! generic dispatcher when strict method checking rejects a method.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for fallible client operations.
pub type Result<T> = std::result::Result<T, CurlError>;

/// Code reported by `CurlError::Io` and `CurlError::Write`, in the style of
/// an HTTP server error.
pub const IO_ERROR_CODE: u32 = 500;

/// Errors raised by `Curl`.
#[derive(Debug, Error)]
pub enum CurlError {
    /// The transfer failed below HTTP (DNS, connect, timeout, TLS, ...).
    #[error("transport error {code}: {message}")]
    Transport { code: u32, message: String },

    /// The download destination could not be opened.
    #[error("cannot open file: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download destination was opened but writing the body failed.
    #[error("cannot write file: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client configuration cannot drive a transport.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Strict method checking rejected an unrecognised method.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

impl CurlError {
    /// Numeric code for this error. Transport errors carry the transfer's
    /// own code, I/O failures use `IO_ERROR_CODE`.
    pub fn code(&self) -> u32 {
        match self {
            CurlError::Transport { code, .. } => *code,
            CurlError::Io { .. } | CurlError::Write { .. } => IO_ERROR_CODE,
            CurlError::Configuration(_) => ErrorCode::FailedInit.as_u32(),
            CurlError::UnsupportedMethod(_) => ErrorCode::UnsupportedProtocol.as_u32(),
        }
    }
}

/// Transfer error codes, numbered the way libcurl numbers them so callers
/// used to `curl_errno` can keep their checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    UnsupportedProtocol = 1,
    FailedInit = 2,
    UrlMalformed = 3,
    CouldNotResolveHost = 6,
    CouldNotConnect = 7,
    WriteError = 23,
    OperationTimedOut = 28,
    SslConnectError = 35,
    TooManyRedirects = 47,
    RecvError = 56,
    FileSizeExceeded = 63,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::UnsupportedProtocol => "unsupported protocol",
            ErrorCode::FailedInit => "failed initialization",
            ErrorCode::UrlMalformed => "URL using bad/illegal format or missing URL",
            ErrorCode::CouldNotResolveHost => "could not resolve host name",
            ErrorCode::CouldNotConnect => "could not connect to server",
            ErrorCode::WriteError => "failed writing received data to disk/application",
            ErrorCode::OperationTimedOut => "timeout was reached",
            ErrorCode::SslConnectError => "SSL connect error",
            ErrorCode::TooManyRedirects => "number of redirects hit maximum amount",
            ErrorCode::RecvError => "failure when receiving data from the peer",
            ErrorCode::FileSizeExceeded => "maximum file size exceeded",
        };
        f.write_str(text)
    }
}
