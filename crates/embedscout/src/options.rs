// ABOUTME: Configuration options for the embed resolver plus its fluent builder.
// ABOUTME: ResolverBuilder mirrors reqwest-style chained configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::extract::patterns::PatternSet;
use crate::resolver::{Resolver, StreamSource};
use crate::resource::USER_AGENT;

/// Configuration options for the embed resolver.
#[derive(Clone)]
pub struct Options {
    pub timeout: Duration,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub http_client: Option<reqwest::Client>,
    pub patterns: Option<PatternSet>,
    pub delegate: Option<Arc<dyn StreamSource>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_string(),
            allow_private_networks: false,
            http_client: None,
            patterns: None,
            delegate: None,
        }
    }
}

/// Builder for constructing Resolver instances with custom configuration.
#[derive(Clone, Default)]
pub struct ResolverBuilder {
    opts: Options,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Replace the extraction pattern table.
    pub fn patterns(mut self, patterns: PatternSet) -> Self {
        self.opts.patterns = Some(patterns);
        self
    }

    /// Install a stream source the VidSrc-family variant delegates to when
    /// a structured identifier can be parsed from the embed URL.
    pub fn delegate(mut self, delegate: Arc<dyn StreamSource>) -> Self {
        self.opts.delegate = Some(delegate);
        self
    }

    /// Build the Resolver with the configured options.
    pub fn build(self) -> Resolver {
        Resolver::new(self.opts)
    }
}
