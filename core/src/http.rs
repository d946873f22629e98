//! Plain-data request types sitting between the option table and the
//! transport.
//!
//! # Design
//! The client never hands the option table to the network layer directly.
//! `PreparedRequest::from_options` resolves the effective table into a
//! method, URL, header list, optional body and transfer settings, and the
//! transport only ever sees that value. This keeps option semantics (which
//! option wins over which) testable without a socket.
//!
//! All fields use owned types so a prepared request can be logged, cloned
//! into a fake transport, or inspected after the fact.

use std::fmt;
use std::time::Duration;

use url::form_urlencoded;

use crate::options::{HttpOption, Options};

/// Request method accepted by the generic dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    /// Anything else, sent verbatim as the request method.
    Custom(String),
}

impl Method {
    /// Parse a method name. Only the exact upper-case names are known
    /// methods; any other spelling, `"get"` included, becomes `Custom`.
    pub fn parse(name: &str) -> Method {
        match name {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "HEAD" => Method::Head,
            _ => Method::Custom(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Method::Custom(_))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// Sent as-is with no content type.
    Raw(Vec<u8>),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// Sent as `application/json`.
    Json(serde_json::Value),
}

impl Payload {
    /// Form payload from key/value pairs, kept in the given order.
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Payload::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// JSON payload from any serializable value.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Payload::Json)
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Payload::Form(_) => Some("application/x-www-form-urlencoded"),
            Payload::Json(_) => Some("application/json"),
            Payload::Empty | Payload::Raw(_) => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Empty => Vec::new(),
            Payload::Raw(bytes) => bytes.clone(),
            Payload::Form(pairs) => form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish()
                .into_bytes(),
            Payload::Json(value) => value.to_string().into_bytes(),
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Raw(v.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Raw(v.into_bytes())
    }
}

impl From<&[u8]> for Payload {
    fn from(v: &[u8]) -> Self {
        Payload::Raw(v.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Raw(v)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

impl From<&[(&str, &str)]> for Payload {
    fn from(v: &[(&str, &str)]) -> Self {
        Payload::form(v.iter().copied())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Payload {
    fn from(v: [(&str, &str); N]) -> Self {
        Payload::form(v)
    }
}

/// Append `params` to `base` as a form-encoded query string.
///
/// Returns `base` unchanged when `params` is empty. Pairs keep their order.
pub fn build_url(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().copied())
        .finish();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}

/// Header names to values, unique by name (ASCII case-insensitive), in the
/// order names were first added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `Name:Value` lines, the form stored under `HttpOption::HttpHeader`.
    pub fn to_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for HeaderSet {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

/// Split a `Name:Value` line. Lines without a colon or with an empty name
/// are not headers.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// A fully resolved request, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub verify_peer: bool,
    /// Skip reading the response body.
    pub no_body: bool,
    /// Prefix the status line and headers to the captured body.
    pub include_headers: bool,
    /// Capture the body; when false it is written to stdout instead.
    pub return_transfer: bool,
    pub user_agent: Option<String>,
    /// `None` leaves redirect handling to the transport's default.
    pub follow_location: Option<bool>,
    pub max_redirects: Option<u32>,
}

impl PreparedRequest {
    /// Resolve an effective option table.
    ///
    /// Method precedence: `CustomRequest`, then `HttpGet`, then `Post` or the
    /// presence of `PostFields`, else GET. A body is attached for every
    /// method except GET and HEAD. A zero or missing timeout means none.
    pub fn from_options(options: &Options) -> Self {
        let custom = options.str(HttpOption::CustomRequest).filter(|m| !m.is_empty());
        let http_get = options.bool(HttpOption::HttpGet).unwrap_or(false);
        let post = options.bool(HttpOption::Post).unwrap_or(false);
        let payload = options
            .get(HttpOption::PostFields)
            .and_then(|v| v.as_payload());

        let method = match custom {
            Some(m) => m.to_string(),
            None if http_get => "GET".to_string(),
            None if post || payload.is_some() => "POST".to_string(),
            None => "GET".to_string(),
        };

        let sends_body = !matches!(method.as_str(), "GET" | "HEAD");
        let payload = payload.filter(|_| sends_body);

        let mut headers: Vec<(String, String)> = options
            .get(HttpOption::HttpHeader)
            .and_then(|v| v.as_list())
            .unwrap_or_default()
            .iter()
            .filter_map(|line| parse_header_line(line))
            .collect();

        if let Some(content_type) = payload.as_ref().and_then(Payload::content_type) {
            let has_content_type = headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                headers.push(("Content-Type".to_string(), content_type.to_string()));
            }
        }

        Self {
            method,
            url: options.str(HttpOption::Url).unwrap_or_default().to_string(),
            headers,
            body: payload.map(|p| p.to_bytes()),
            timeout: seconds(options.int(HttpOption::Timeout)),
            connect_timeout: seconds(options.int(HttpOption::ConnectTimeout)),
            verify_peer: options.bool(HttpOption::SslVerifyPeer).unwrap_or(true),
            no_body: options.bool(HttpOption::NoBody).unwrap_or(false),
            include_headers: options.bool(HttpOption::IncludeHeaders).unwrap_or(false),
            return_transfer: options.bool(HttpOption::ReturnTransfer).unwrap_or(false),
            user_agent: options.str(HttpOption::UserAgent).map(str::to_string),
            follow_location: options.bool(HttpOption::FollowLocation),
            max_redirects: options
                .int(HttpOption::MaxRedirects)
                .and_then(|n| u32::try_from(n).ok()),
        }
    }
}

fn seconds(value: Option<i64>) -> Option<Duration> {
    value
        .filter(|s| *s > 0)
        .map(|s| Duration::from_secs(s.unsigned_abs()))
}
