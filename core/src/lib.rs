//! Fluent, blocking HTTP client modelled on a curl easy handle.
//!
//! # Overview
//! `Curl` accumulates per-request options (URL, query parameters, body,
//! headers, method) in an override tier, merges it over a fixed default tier,
//! performs one blocking transfer, and keeps the body, error code and error
//! message of that transfer until the next one.
//!
//! # Design
//! - The option table (`Options`) is the single source of configuration;
//!   named methods like `get` or `set_headers` are shorthands that write
//!   options, and `set_option` is the escape hatch for the rest.
//! - The table is resolved into a plain-data `PreparedRequest` before it
//!   reaches the network, so option semantics are testable without I/O.
//! - The network sits behind the `Transport` trait; `UreqTransport` is the
//!   default implementation.
//! - Transfer failures are recorded, not raised. Only `download` turns a
//!   failed transfer into an error.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod options;
pub mod transport;

pub use client::Curl;
pub use config::ClientConfig;
pub use error::{CurlError, ErrorCode, Result};
pub use http::{build_url, HeaderSet, Method, Payload, PreparedRequest};
pub use options::{merge_keep_keys, HttpOption, OptionValue, Options};
pub use transport::{Outcome, Transport, UreqTransport};
