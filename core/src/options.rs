//! The option table that drives every transfer.
//!
//! # Design
//! Options are a flat map from `HttpOption` to `OptionValue`, mirroring the
//! way a curl easy handle is configured one option at a time. The client
//! keeps two of these: a default tier derived from `ClientConfig` and an
//! override tier filled by the request methods. The effective table is the
//! defaults with the overrides written on top.

use std::collections::btree_map::{self, BTreeMap};

use crate::http::Payload;

/// Identifier of a transfer option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpOption {
    /// Target URL, including any query string.
    Url,
    /// Force a plain GET.
    HttpGet,
    /// Send a POST.
    Post,
    /// Request body.
    PostFields,
    /// Method string overriding `HttpGet` / `Post`.
    CustomRequest,
    /// Do not read the response body.
    NoBody,
    /// Request headers as `Name:Value` lines.
    HttpHeader,
    /// Whole-transfer timeout in seconds.
    Timeout,
    /// Connect timeout in seconds.
    ConnectTimeout,
    /// Verify the peer's TLS certificate.
    SslVerifyPeer,
    /// Capture the body instead of writing it to stdout.
    ReturnTransfer,
    /// Prefix the status line and response headers to the captured body.
    IncludeHeaders,
    UserAgent,
    FollowLocation,
    MaxRedirects,
}

/// Value stored against an `HttpOption`.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
    Body(Payload),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            OptionValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            OptionValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Body payload. A plain string is accepted as a raw body.
    pub fn as_payload(&self) -> Option<Payload> {
        match self {
            OptionValue::Body(p) => Some(p.clone()),
            OptionValue::Str(s) => Some(Payload::from(s.as_str())),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(v: Vec<String>) -> Self {
        OptionValue::List(v)
    }
}

impl From<Payload> for OptionValue {
    fn from(v: Payload) -> Self {
        OptionValue::Body(v)
    }
}

/// A map of options. Keys are unique and the last write wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    entries: BTreeMap<HttpOption, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: HttpOption, value: impl Into<OptionValue>) {
        self.entries.insert(key, value.into());
    }

    pub fn get(&self, key: HttpOption) -> Option<&OptionValue> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: HttpOption) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, HttpOption, OptionValue> {
        self.entries.iter()
    }

    pub fn bool(&self, key: HttpOption) -> Option<bool> {
        self.get(key).and_then(OptionValue::as_bool)
    }

    pub fn int(&self, key: HttpOption) -> Option<i64> {
        self.get(key).and_then(OptionValue::as_int)
    }

    pub fn str(&self, key: HttpOption) -> Option<&str> {
        self.get(key).and_then(OptionValue::as_str)
    }

    /// Write every entry of `other` into `self`.
    pub fn extend_from(&mut self, other: &Options) {
        for (key, value) in other.iter() {
            self.entries.insert(*key, value.clone());
        }
    }
}

impl<V: Into<OptionValue>> FromIterator<(HttpOption, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (HttpOption, V)>>(iter: I) -> Self {
        let mut options = Options::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}

impl<'a> IntoIterator for &'a Options {
    type Item = (&'a HttpOption, &'a OptionValue);
    type IntoIter = btree_map::Iter<'a, HttpOption, OptionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Merge option maps left to right, keeping keys. A key present in a later
/// map overwrites the value from an earlier one.
pub fn merge_keep_keys<'a, I>(maps: I) -> Options
where
    I: IntoIterator<Item = &'a Options>,
{
    let mut merged = Options::new();
    for map in maps {
        merged.extend_from(map);
    }
    merged
}
