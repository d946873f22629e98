//! Client configuration and the default option tier it produces.

use serde::Deserialize;

use crate::error::{CurlError, Result};
use crate::options::{HttpOption, Options};

/// Settings every request starts from.
///
/// Deserializes from JSON with every field optional, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whole-transfer timeout in seconds. Must be non-zero.
    pub timeout_secs: u64,
    /// Connect timeout in seconds. Must be non-zero.
    pub connect_timeout_secs: u64,
    pub verify_peer: bool,
    /// Capture bodies rather than printing them to stdout.
    pub return_transfer: bool,
    /// Prefix status line and headers to captured bodies.
    pub include_headers: bool,
    pub user_agent: Option<String>,
    /// Reject methods other than GET/POST/PUT/DELETE/PATCH/HEAD in
    /// `Curl::request` instead of sending them as custom methods.
    pub strict_methods: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_timeout_secs: 10,
            verify_peer: false,
            return_transfer: true,
            include_headers: false,
            user_agent: None,
            strict_methods: false,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document. Missing keys take their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_json::from_str(raw).map_err(|e| CurlError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn strict_methods(mut self, strict: bool) -> Self {
        self.strict_methods = strict;
        self
    }

    /// Check that a transport can be built from this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(CurlError::Configuration(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if let Some(agent) = &self.user_agent {
            if agent.is_empty() || agent.chars().any(char::is_control) {
                return Err(CurlError::Configuration(format!(
                    "user agent {agent:?} is not a valid header value"
                )));
            }
        }
        Ok(())
    }

    /// The default option tier.
    pub fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.set(HttpOption::IncludeHeaders, self.include_headers);
        options.set(HttpOption::ReturnTransfer, self.return_transfer);
        options.set(HttpOption::Timeout, clamp_secs(self.timeout_secs));
        options.set(HttpOption::ConnectTimeout, clamp_secs(self.connect_timeout_secs));
        options.set(HttpOption::SslVerifyPeer, self.verify_peer);
        if let Some(agent) = &self.user_agent {
            options.set(HttpOption::UserAgent, agent.as_str());
        }
        options
    }
}

fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
