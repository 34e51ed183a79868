//! The fetch-like transport the dispatchers send requests through.
//!
//! The negotiation logic only ever sees [`Transport`]; [`ReqwestTransport`]
//! is the default implementation and tests substitute their own.

mod reqwest_transport;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

use crate::error::Result;

pub use reqwest_transport::{ReqwestTransport, ReqwestTransportBuilder, TransportConfig};

/// HTTP methods used by the GraphQL wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Persisted query probe.
    Get,
    /// Full request body.
    Post,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Which cookies and auth state accompany a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    /// Always send stored cookies and store the ones the server sets.
    Include,
    /// Leave credential handling to the transport's defaults.
    #[default]
    SameOrigin,
    /// Never send or store cookies.
    Omit,
}

/// Request cache mode, forwarded verbatim to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Transport default behaviour.
    Default,
    /// Never store the response.
    NoStore,
    /// Bypass any cache and update it.
    Reload,
    /// Revalidate before using a cached response.
    NoCache,
    /// Prefer a cached response of any age.
    ForceCache,
    /// Only answer from cache.
    OnlyIfCached,
}

impl CacheMode {
    /// The `Cache-Control` request directive this mode maps to, if any.
    pub fn cache_control(self) -> Option<&'static str> {
        match self {
            Self::NoStore => Some("no-store"),
            Self::Reload | Self::NoCache => Some("no-cache"),
            Self::OnlyIfCached => Some("only-if-cached"),
            Self::Default | Self::ForceCache => None,
        }
    }
}

/// Revalidation hint for a cached response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Revalidate {
    /// Revalidate after this many seconds.
    Seconds(u64),
    /// `false`: cache indefinitely.
    Never(bool),
}

/// Cache directives passed through to the transport untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheDirectives {
    /// Cache mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CacheMode>,
    /// Revalidation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revalidate: Option<Revalidate>,
    /// Cache tags for targeted invalidation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl CacheDirectives {
    /// Directives with only a cache mode.
    pub fn mode(mode: CacheMode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    /// Directives that revalidate after `seconds`.
    pub fn revalidate(seconds: u64) -> Self {
        Self {
            revalidate: Some(Revalidate::Seconds(seconds)),
            ..Self::default()
        }
    }

    /// Add a cache tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Derive directives that forbid caching.
    ///
    /// Drops the revalidation hint, forces `no-store` and keeps tags. The
    /// receiver is left as it was.
    pub fn without_caching(&self) -> Self {
        Self {
            mode: Some(CacheMode::NoStore),
            revalidate: None,
            tags: self.tags.clone(),
        }
    }
}

/// One HTTP exchange as the dispatchers describe it.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// Full URL including the query string.
    pub url: Url,
    /// Request headers.
    pub headers: http::HeaderMap,
    /// JSON body for POST requests.
    pub body: Option<String>,
    /// Cookie handling.
    pub credentials: Credentials,
    /// Cache directives, if the dispatcher has any.
    pub cache: Option<CacheDirectives>,
}

/// A fully received HTTP response.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Raw body.
    pub body: Bytes,
}

impl TransportResponse {
    /// A response with the canonical reason phrase for `status`.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        let status_text = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            headers: http::HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A fetch-like function.
///
/// Implementations must report network failures as errors and every
/// received response, whatever its status, as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP exchange.
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse> {
        (**self).fetch(request).await
    }
}
