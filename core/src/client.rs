//! Stateful, fluent HTTP client in the style of a curl easy handle.
//!
//! # Design
//! `Curl` owns one transport handle, an override option tier, a pending
//! header set and the outcome of the last transfer. Request methods write
//! their options into the override tier, execute once, record the outcome
//! and clear the override tier again, so nothing configured for one request
//! leaks into the next. The default tier comes from `ClientConfig` and is
//! never modified.
//!
//! Request methods return `&mut Self` and never fail: a transfer error is
//! read back through `error()` / `message()`. Only `download`, `new` and the
//! string-typed `request` return `Result`.
//!
//! A client is not meant to be shared between threads. `Curl::shared()`
//! hands out one process-wide instance behind a mutex for callers that want
//! a default client without threading one through.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{CurlError, ErrorCode, Result};
use crate::http::{build_url, HeaderSet, Method, Payload, PreparedRequest};
use crate::options::{merge_keep_keys, HttpOption, OptionValue, Options};
use crate::transport::{Outcome, Transport, UreqTransport};

static SHARED: OnceLock<Mutex<Curl>> = OnceLock::new();

/// Fluent HTTP client.
#[derive(Debug)]
pub struct Curl<T: Transport = UreqTransport> {
    config: ClientConfig,
    defaults: Options,
    overrides: Options,
    headers: HeaderSet,
    handle: Option<T>,
    outcome: Outcome,
}

impl Curl<UreqTransport> {
    /// Process-wide default client, created with `ClientConfig::default()`
    /// on first use. Requests through it are serialised by the mutex.
    pub fn shared() -> Result<&'static Mutex<Curl>> {
        if let Some(shared) = SHARED.get() {
            return Ok(shared);
        }
        let client = Self::new(ClientConfig::default())?;
        Ok(SHARED.get_or_init(move || Mutex::new(client)))
    }

    /// Create a client and open its ureq transport handle.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let handle = UreqTransport::open(&config)?;
        Ok(Self::assemble(config, handle))
    }
}

impl<T: Transport> Curl<T> {
    /// Create a client around an already opened transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, transport))
    }

    fn assemble(config: ClientConfig, handle: T) -> Self {
        Self {
            defaults: config.default_options(),
            config,
            overrides: Options::new(),
            headers: HeaderSet::new(),
            handle: Some(handle),
            outcome: Outcome::default(),
        }
    }

    pub fn get(&mut self, url: &str, params: &[(&str, &str)]) -> &mut Self {
        self.dispatch(Method::Get, url, Payload::Empty, params)
    }

    pub fn post(
        &mut self,
        url: &str,
        data: impl Into<Payload>,
        params: &[(&str, &str)],
    ) -> &mut Self {
        self.dispatch(Method::Post, url, data.into(), params)
    }

    pub fn put(
        &mut self,
        url: &str,
        data: impl Into<Payload>,
        params: &[(&str, &str)],
    ) -> &mut Self {
        self.dispatch(Method::Put, url, data.into(), params)
    }

    pub fn delete(&mut self, url: &str, params: &[(&str, &str)]) -> &mut Self {
        self.dispatch(Method::Delete, url, Payload::Empty, params)
    }

    pub fn patch(
        &mut self,
        url: &str,
        data: impl Into<Payload>,
        params: &[(&str, &str)],
    ) -> &mut Self {
        self.dispatch(Method::Patch, url, data.into(), params)
    }

    pub fn head(&mut self, url: &str, params: &[(&str, &str)]) -> &mut Self {
        self.dispatch(Method::Head, url, Payload::Empty, params)
    }

    /// Send `method` to `url`.
    ///
    /// GET, HEAD and DELETE carry no body. Every other method, including
    /// names this client does not recognise, is sent as a custom method with
    /// `data` as the body. With `ClientConfig::strict_methods` an
    /// unrecognised name is rejected and nothing is sent.
    pub fn request(
        &mut self,
        method: &str,
        url: &str,
        data: impl Into<Payload>,
        params: &[(&str, &str)],
    ) -> Result<&mut Self> {
        let method = Method::parse(method);
        if method.is_custom() && self.config.strict_methods {
            return Err(CurlError::UnsupportedMethod(method.as_str().to_string()));
        }
        Ok(self.dispatch(method, url, data.into(), params))
    }

    fn dispatch(
        &mut self,
        method: Method,
        url: &str,
        data: Payload,
        params: &[(&str, &str)],
    ) -> &mut Self {
        self.set_url(url, params);
        match method {
            Method::Get => {
                self.set_option(HttpOption::HttpGet, true);
            }
            Method::Post => {
                self.set_option(HttpOption::Post, true);
                self.set_option(HttpOption::PostFields, data);
            }
            Method::Head => {
                self.set_option(HttpOption::CustomRequest, "HEAD");
                self.set_option(HttpOption::NoBody, true);
            }
            Method::Delete => {
                self.set_option(HttpOption::CustomRequest, "DELETE");
            }
            other => {
                self.set_option(HttpOption::CustomRequest, other.as_str());
                self.set_option(HttpOption::PostFields, data);
            }
        }
        self.exec()
    }

    /// Download `url` into `path`.
    ///
    /// A failed transfer is returned as `CurlError::Transport` before the
    /// file system is touched. If the destination cannot be created the
    /// error is `CurlError::Io`. A write that fails part way is reported as
    /// `CurlError::Write` and removes the partial file when the destination
    /// is a regular file.
    pub fn download(&mut self, url: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.set_option(HttpOption::ReturnTransfer, true);
        self.get(url, &[]);

        if self.outcome.error != 0 {
            return Err(CurlError::Transport {
                code: self.outcome.error,
                message: self.outcome.message.clone(),
            });
        }

        let mut file = File::create(path).map_err(|source| CurlError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(source) = file.write_all(&self.outcome.body) {
            drop(file);
            if fs::metadata(path).is_ok_and(|meta| meta.is_file()) {
                debug!(path = %path.display(), "cleaning up partial file after error");
                let _ = fs::remove_file(path);
            }
            return Err(CurlError::Write {
                path: path.to_path_buf(),
                source,
            });
        }

        let bytes = self.outcome.body.len();
        info!(url, path = %path.display(), bytes, "download completed");
        Ok(())
    }

    /// Error code of the last transfer, zero on success.
    pub fn error(&self) -> u32 {
        self.outcome.error
    }

    /// Error message of the last transfer, empty on success.
    pub fn message(&self) -> &str {
        &self.outcome.message
    }

    /// Body of the last transfer.
    pub fn response(&self) -> &[u8] {
        &self.outcome.body
    }

    /// Body of the last transfer as text, with invalid UTF-8 replaced.
    pub fn response_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.outcome.body)
    }

    /// HTTP status of the last transfer, if a response arrived.
    pub fn status(&self) -> Option<u16> {
        self.outcome.status
    }

    pub fn set_option(&mut self, key: HttpOption, value: impl Into<OptionValue>) -> &mut Self {
        self.overrides.set(key, value);
        self
    }

    /// Apply each entry in order with `set_option`.
    pub fn set_options<I, V>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator<Item = (HttpOption, V)>,
        V: Into<OptionValue>,
    {
        for (key, value) in options {
            self.set_option(key, value);
        }
        self
    }

    /// Effective options: defaults with the overrides written on top.
    pub fn options(&self) -> Options {
        merge_keep_keys([&self.defaults, &self.overrides])
    }

    /// Drop every override and pending header. Runs after each transfer.
    pub fn reset_options(&mut self) -> &mut Self {
        self.overrides.clear();
        self.headers.clear();
        self
    }

    /// Set the target URL without sending anything.
    pub fn set_url(&mut self, url: &str, params: &[(&str, &str)]) -> &mut Self {
        self.set_option(HttpOption::Url, build_url(url, params))
    }

    /// Add headers for the next transfer. Headers set earlier for the same
    /// transfer are kept unless a name repeats, in which case the new value
    /// wins.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.extend(headers);
        let lines = self.headers.to_lines();
        self.set_option(HttpOption::HttpHeader, lines)
    }

    /// Replace every pending header with `headers`.
    pub fn replace_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.clear();
        self.set_headers(headers)
    }

    /// Pending headers as `Name:Value` lines.
    pub fn headers(&self) -> Vec<String> {
        self.headers.to_lines()
    }

    /// Run one transfer with the current options, then reset them.
    pub fn exec(&mut self) -> &mut Self {
        let prepared = PreparedRequest::from_options(&self.options());
        debug!(method = %prepared.method, url = %prepared.url, "executing request");

        let mut outcome = self.transfer(&prepared);
        if outcome.is_success() && !prepared.return_transfer {
            let written = io::stdout()
                .write_all(&outcome.body)
                .and_then(|()| io::stdout().flush());
            outcome = match written {
                Ok(()) => Outcome {
                    body: Vec::new(),
                    ..outcome
                },
                Err(e) => Outcome::failure(ErrorCode::WriteError, e.to_string()),
            };
        }
        debug!(
            status = ?outcome.status,
            error = outcome.error,
            bytes = outcome.body.len(),
            "request finished"
        );

        self.outcome = outcome;
        self.reset_options();
        self
    }

    fn transfer(&mut self, prepared: &PreparedRequest) -> Outcome {
        if self.handle.is_none() {
            match T::open(&self.config) {
                Ok(handle) => self.handle = Some(handle),
                Err(e) => {
                    warn!(error = %e, "failed to open transport");
                    return Outcome::failure(ErrorCode::FailedInit, e.to_string());
                }
            }
        }
        match self.handle.as_mut() {
            Some(handle) => handle.execute(prepared),
            None => Outcome::failure(ErrorCode::FailedInit, "transport handle unavailable"),
        }
    }

    /// Whether a transport handle is currently allocated.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Release the transport handle and clear the overrides. Calling it
    /// again is a no-op; the next request opens a fresh handle.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("transport closed");
        }
        self.reset_options();
    }
}

impl<T: Transport> Drop for Curl<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records every request and replays scripted outcomes.
    #[derive(Default)]
    struct FakeTransport {
        sent: Arc<Mutex<Vec<PreparedRequest>>>,
        script: VecDeque<Outcome>,
        dropped: Arc<AtomicUsize>,
    }

    impl FakeTransport {
        fn replying(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
            let mut transport = Self::default();
            transport.script = outcomes.into_iter().collect();
            transport
        }
    }

    impl Transport for FakeTransport {
        fn open(_config: &ClientConfig) -> Result<Self> {
            Ok(Self::default())
        }

        fn execute(&mut self, request: &PreparedRequest) -> Outcome {
            self.sent.lock().unwrap().push(request.clone());
            self.script
                .pop_front()
                .unwrap_or_else(|| Outcome::success(200, Vec::new()))
        }
    }

    impl Drop for FakeTransport {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    type Sent = Arc<Mutex<Vec<PreparedRequest>>>;

    fn client(transport: FakeTransport) -> (Curl<FakeTransport>, Sent) {
        let sent = transport.sent.clone();
        let curl = Curl::with_transport(ClientConfig::default(), transport).unwrap();
        (curl, sent)
    }

    #[test]
    fn set_options_overrides_defaults() {
        let (mut curl, _) = client(FakeTransport::default());
        curl.set_options([(HttpOption::Timeout, 12), (HttpOption::ConnectTimeout, 11)]);

        let options = curl.options();
        assert_eq!(options.int(HttpOption::Timeout), Some(12));
        assert_eq!(options.int(HttpOption::ConnectTimeout), Some(11));
        assert_eq!(options.bool(HttpOption::ReturnTransfer), Some(true));
    }

    #[test]
    fn later_entries_in_one_call_win() {
        let (mut curl, _) = client(FakeTransport::default());
        curl.set_options([(HttpOption::Timeout, 1), (HttpOption::Timeout, 2)]);
        assert_eq!(curl.options().int(HttpOption::Timeout), Some(2));
    }

    #[test]
    fn options_reset_after_every_request() {
        let (mut curl, _) = client(FakeTransport::default());
        let defaults = curl.options();

        curl.set_option(HttpOption::Timeout, 5)
            .set_headers([("X-Token", "abc")])
            .post("http://localhost/test/post", [("data", "post")], &[]);

        assert_eq!(curl.options(), defaults);
        assert!(curl.headers().is_empty());
    }

    #[test]
    fn get_builds_query_and_marks_get() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.get("http://localhost/test/get", &[("a", "1"), ("b", "2")]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "GET");
        assert_eq!(sent[0].url, "http://localhost/test/get?a=1&b=2");
        assert!(sent[0].body.is_none());
        assert_eq!(sent[0].timeout, Some(std::time::Duration::from_secs(10)));
        assert!(!sent[0].verify_peer);
    }

    #[test]
    fn post_sends_form_body() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.post("http://localhost/test/post", [("data", "post")], &[]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].body.as_deref(), Some(&b"data=post"[..]));
    }

    #[test]
    fn head_and_delete_send_no_body() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.head("http://localhost/test/head", &[]);
        curl.delete("http://localhost/test/delete", &[]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].method, "HEAD");
        assert!(sent[0].no_body);
        assert!(sent[0].body.is_none());
        assert_eq!(sent[1].method, "DELETE");
        assert!(sent[1].body.is_none());
        assert!(!sent[1].no_body);
    }

    #[test]
    fn put_and_patch_are_custom_methods_with_body() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.put("http://localhost/test/put", "raw", &[]);
        curl.patch("http://localhost/test/patch", serde_json::json!({"data": "patch"}), &[]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].method, "PUT");
        assert_eq!(sent[0].body.as_deref(), Some(&b"raw"[..]));
        assert_eq!(sent[1].method, "PATCH");
        assert_eq!(sent[1].body.as_deref(), Some(&br#"{"data":"patch"}"#[..]));
        assert!(sent[1]
            .headers
            .contains(&("Content-Type".to_string(), "application/json".to_string())));
    }

    #[test]
    fn unknown_method_falls_through_to_custom() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.request("PURGE", "http://localhost/cache", "x", &[]).unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].method, "PURGE");
        assert_eq!(sent[0].body.as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn method_names_keep_their_spelling() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.request("get", "http://localhost/x", "body", &[]).unwrap();
        curl.request("HEAD", "http://localhost/x", "body", &[]).unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].method, "get");
        assert_eq!(sent[0].body.as_deref(), Some(&b"body"[..]));
        assert_eq!(sent[1].method, "HEAD");
        assert!(sent[1].no_body);
        assert!(sent[1].body.is_none());
    }

    #[test]
    fn strict_mode_rejects_unknown_method_without_sending() {
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut curl =
            Curl::with_transport(ClientConfig::default().strict_methods(true), transport).unwrap();

        let err = curl.request("GTE", "http://localhost/x", (), &[]).err().unwrap();
        assert!(matches!(err, CurlError::UnsupportedMethod(ref m) if m == "GTE"));
        assert!(sent.lock().unwrap().is_empty());

        let err = curl.request("get", "http://localhost/x", (), &[]).err().unwrap();
        assert!(matches!(err, CurlError::UnsupportedMethod(ref m) if m == "get"));
        assert!(sent.lock().unwrap().is_empty());

        curl.request("GET", "http://localhost/x", (), &[]).unwrap();
        assert_eq!(sent.lock().unwrap()[0].method, "GET");
    }

    #[test]
    fn set_headers_accumulates() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.set_headers([("X-Token", "abc")]);
        curl.set_headers([("X-Other", "1")]);
        assert_eq!(curl.headers(), vec!["X-Token:abc", "X-Other:1"]);
        assert_eq!(
            curl.options().get(HttpOption::HttpHeader).and_then(|v| v.as_list()),
            Some(&["X-Token:abc".to_string(), "X-Other:1".to_string()][..])
        );

        curl.get("http://localhost/test/get", &[]);
        let sent = sent.lock().unwrap();
        assert_eq!(
            sent[0].headers,
            vec![
                ("X-Token".to_string(), "abc".to_string()),
                ("X-Other".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn replace_headers_discards_earlier_headers() {
        let (mut curl, _) = client(FakeTransport::default());
        curl.set_headers([("X-Token", "abc")]);
        curl.replace_headers([("X-Other", "1")]);
        assert_eq!(curl.headers(), vec!["X-Other:1"]);
    }

    #[test]
    fn headers_do_not_leak_into_next_request() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.set_headers([("X-Token", "abc")]).get("http://localhost/a", &[]);
        curl.get("http://localhost/b", &[]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].headers.len(), 1);
        assert!(sent[1].headers.is_empty());
    }

    #[test]
    fn set_url_then_exec() {
        let (mut curl, sent) = client(FakeTransport::default());
        curl.set_url("http://localhost/test/get", &[("q", "rust")])
            .set_option(HttpOption::CustomRequest, "OPTIONS")
            .exec();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].url, "http://localhost/test/get?q=rust");
        assert_eq!(sent[0].method, "OPTIONS");
    }

    #[test]
    fn outcome_accessors_report_last_transfer() {
        let (mut curl, _) = client(FakeTransport::replying([
            Outcome::success(404, b"not here".to_vec()),
            Outcome::failure(ErrorCode::CouldNotConnect, "connection refused"),
        ]));

        curl.get("http://localhost/missing", &[]);
        assert_eq!(curl.error(), 0);
        assert_eq!(curl.message(), "");
        assert_eq!(curl.status(), Some(404));
        assert_eq!(curl.response_text(), "not here");

        curl.get("http://localhost:1/", &[]);
        assert_eq!(curl.error(), 7);
        assert_eq!(curl.message(), "connection refused");
        assert!(curl.response().is_empty());
        assert_eq!(curl.status(), None);
    }

    #[test]
    fn disabled_return_transfer_captures_nothing() {
        let reply = Outcome::success(200, b"printed".to_vec());
        let (mut curl, _) = client(FakeTransport::replying([reply]));
        curl.set_option(HttpOption::ReturnTransfer, false)
            .get("http://localhost/test/get", &[]);
        assert_eq!(curl.error(), 0);
        assert!(curl.response().is_empty());
    }

    #[test]
    fn download_writes_body() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("file.bin");
        let reply = Outcome::success(200, vec![0, 1, 2, 255]);
        let (mut curl, _) = client(FakeTransport::replying([reply]));

        curl.download("http://localhost/test/download", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), vec![0, 1, 2, 255]);
    }

    #[test]
    fn download_transport_error_never_touches_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("file.bin");
        let (mut curl, _) = client(FakeTransport::replying([Outcome::failure(
            ErrorCode::CouldNotResolveHost,
            "could not resolve host",
        )]));

        let err = curl.download("http://nowhere.invalid/file", &target).unwrap_err();
        assert!(matches!(err, CurlError::Transport { code: 6, .. }));
        assert!(!target.exists());
    }

    #[test]
    fn download_to_unwritable_path_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("missing-dir").join("file.bin");
        let reply = Outcome::success(200, b"data".to_vec());
        let (mut curl, _) = client(FakeTransport::replying([reply]));

        let err = curl.download("http://localhost/test/download", &target).unwrap_err();
        assert!(matches!(err, CurlError::Io { .. }));
        assert_eq!(err.code(), 500);
        assert!(err.to_string().starts_with("cannot open file"));
        assert!(!target.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn download_write_failure_is_a_write_error() {
        let target = Path::new("/dev/full");
        let reply = Outcome::success(200, b"data".to_vec());
        let (mut curl, _) = client(FakeTransport::replying([reply]));

        let err = curl.download("http://localhost/test/download", target).unwrap_err();
        assert!(matches!(err, CurlError::Write { ref path, .. } if path == target));
        assert_eq!(err.code(), 500);
        assert!(err.to_string().starts_with("cannot write file"));
        assert!(target.exists());
    }

    #[test]
    fn close_is_idempotent_and_reopens_on_demand() {
        let transport = FakeTransport::default();
        let dropped = transport.dropped.clone();
        let (mut curl, _) = client(transport);

        curl.set_option(HttpOption::Timeout, 3);
        curl.close();
        assert!(!curl.is_open());
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(curl.options(), ClientConfig::default().default_options());

        curl.close();
        assert_eq!(dropped.load(Ordering::SeqCst), 1);

        curl.get("http://localhost/test/get", &[]);
        assert!(curl.is_open());
        assert_eq!(curl.error(), 0);
    }

    #[test]
    fn drop_releases_transport() {
        let transport = FakeTransport::default();
        let dropped = transport.dropped.clone();
        let (curl, _) = client(transport);
        drop(curl);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = ClientConfig::default().user_agent("a\nb");
        let result = Curl::with_transport(config, FakeTransport::default());
        assert!(matches!(result, Err(CurlError::Configuration(_))));

        let result = Curl::new(ClientConfig::default().connect_timeout_secs(0));
        assert!(matches!(result, Err(CurlError::Configuration(_))));
    }

    #[test]
    fn new_opens_the_handle_eagerly() {
        let mut curl = Curl::new(ClientConfig::default()).unwrap();
        assert!(curl.is_open());
        curl.close();
        assert!(!curl.is_open());
    }

    #[test]
    fn shared_client_is_a_single_instance() {
        let first = Curl::shared().unwrap();
        let second = Curl::shared().unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
