//! Transport backed by a reqwest client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{CACHE_CONTROL, COOKIE, HeaderValue, SET_COOKIE};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;

use super::{
    CacheDirectives, Credentials, Revalidate, Transport, TransportRequest, TransportResponse,
};
use crate::error::{FetchError, Result};

/// Configuration for the reqwest transport.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Per-exchange timeout enforced by reqwest.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// User agent.
    pub user_agent: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Some(Duration::from_secs(10)),
            max_redirects: 10,
            user_agent: Some(format!(
                "HorizonLattice-GraphQL/{} (Rust)",
                env!("CARGO_PKG_VERSION")
            )),
            proxy: None,
        }
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Default)]
pub struct ReqwestTransportBuilder {
    config: TransportConfig,
    jar: Option<Arc<Jar>>,
}

impl ReqwestTransportBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-exchange timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set a proxy URL.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Share a cookie jar with other clients.
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport> {
        let mut builder =
            reqwest::Client::builder().redirect(Policy::limited(self.config.max_redirects));

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }
        if let Some(ref proxy_url) = self.config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| FetchError::Transport(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        // Cookies are handled per request from the jar, depending on
        // `Credentials`, so the client itself keeps no store.
        let client = builder.build()?;

        Ok(ReqwestTransport {
            client,
            jar: self.jar.unwrap_or_default(),
            config: self.config,
        })
    }
}

/// The default [`Transport`]: a reqwest client plus a cookie jar.
///
/// Cheaply cloneable; clones share the connection pool and the jar.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    jar: Arc<Jar>,
    config: TransportConfig,
}

impl ReqwestTransport {
    /// Create a transport with default configuration.
    pub fn new() -> Result<Self> {
        ReqwestTransportBuilder::new().build()
    }

    /// Create a builder for configuring a transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    /// The transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The cookie jar used for `Credentials::Include`.
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }
}

fn cache_control(cache: &CacheDirectives) -> Option<String> {
    if let Some(directive) = cache.mode.and_then(|mode| mode.cache_control()) {
        return Some(directive.to_string());
    }
    match cache.revalidate {
        Some(Revalidate::Seconds(seconds)) => Some(format!("max-age={seconds}")),
        _ => None,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
            credentials,
            cache,
        } = request;

        let mut builder = self
            .client
            .request(method.to_reqwest(), url.clone())
            .headers(headers);

        if credentials == Credentials::Include
            && let Some(cookies) = self.jar.cookies(&url)
        {
            builder = builder.header(COOKIE, cookies);
        }

        if let Some(value) = cache.as_ref().and_then(cache_control) {
            builder = builder.header(CACHE_CONTROL, HeaderValue::from_str(&value)?);
        }

        if let Some(body) = body {
            builder = builder.body(body);
        }

        tracing::trace!(
            target: "horizon_lattice_graphql::transport",
            %method,
            %url,
            "sending request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if credentials == Credentials::Include {
            let mut set_cookies = headers.get_all(SET_COOKIE).iter().peekable();
            if set_cookies.peek().is_some() {
                self.jar.set_cookies(&mut set_cookies, &url);
            }
        }

        let body = response.bytes().await?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("config", &self.config)
            .finish()
    }
}
