//! Network side of the controller
//!
//! Defines the intercepted request, the response value shared with the cache
//! store, and the `Fetcher` seam. `HttpFetcher` is the production fetcher:
//! a blocking `ureq` agent driven from tokio's blocking pool.

use crate::config::schema::NetworkConfig;
use crate::error::FetchError;
use crate::manifest::ResourceId;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// An outgoing resource request made by the hosted application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Upper-case HTTP method
    pub method: String,
    /// Request identity (cache key)
    pub id: ResourceId,
    /// Request headers, forwarded on a network fetch
    pub headers: Vec<(String, String)>,
    /// Request body, forwarded for methods that carry one
    pub body: Vec<u8>,
}

impl Request {
    /// A plain GET for `id`
    pub fn get(id: ResourceId) -> Self {
        Self::new("GET", id)
    }

    pub fn new(method: &str, id: ResourceId) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            id,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A full response: status, ordered headers and body bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 2xx, the only statuses accepted while provisioning
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with this name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Performs live network fetches
///
/// A non-2xx status is still a response. Only a fetch that produced no
/// response at all is an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// HTTP fetcher resolving identifiers against a fixed origin
pub struct HttpFetcher {
    agent: ureq::Agent,
    origin: String,
    user_agent: String,
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// Create a fetcher for `origin` using the network settings
    pub fn new(origin: impl Into<String>, config: &NetworkConfig) -> Self {
        let origin: String = origin.into();
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            origin: origin.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let agent = self.agent.clone();
        let url = request.id.url(&self.origin);
        let mut request = request.clone();
        if !request
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
        {
            request
                .headers
                .push(("user-agent".to_string(), self.user_agent.clone()));
        }
        let limit = self.max_body_bytes;

        debug!("Fetching {} {}", request.method, url);
        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &url, &request, limit))
            .await
            .map_err(|e| FetchError::Aborted(e.to_string()))?
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn fetch_blocking(
    agent: &ureq::Agent,
    url: &str,
    request: &Request,
    max_body_bytes: u64,
) -> Result<Response, FetchError> {
    let headers = &request.headers;
    let body = request.body.as_slice();

    let result = match request.method.as_str() {
        "GET" => with_headers(agent.get(url), headers).call(),
        "HEAD" => with_headers(agent.head(url), headers).call(),
        "DELETE" => with_headers(agent.delete(url), headers).call(),
        "OPTIONS" => with_headers(agent.options(url), headers).call(),
        "POST" => with_headers(agent.post(url), headers).send(body),
        "PUT" => with_headers(agent.put(url), headers).send(body),
        "PATCH" => with_headers(agent.patch(url), headers).send(body),
        other => return Err(FetchError::UnsupportedMethod(other.to_string())),
    };

    let transport = |e: ureq::Error| FetchError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let mut response = result.map_err(transport)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .body_mut()
        .with_config()
        .limit(max_body_bytes)
        .read_to_vec()
        .map_err(transport)?;

    debug!("{} {} -> {} ({} bytes)", request.method, url, status, body.len());
    Ok(Response {
        status,
        headers,
        body,
    })
}
