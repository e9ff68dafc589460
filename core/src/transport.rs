//! Executes `HttpRequest` values over the network.
//!
//! # Design
//! A transport returns every HTTP status as data. Deciding whether a
//! status is a soft `false`, an empty result or an `HttpError` belongs to
//! the clients, so `UreqTransport` disables ureq's status-as-error
//! behavior. Only failures that produce no response at all come back as
//! `ApiError::TransportError`.

use std::io::Read;
use std::time::Duration;

use tracing::debug;
use ureq::tls::TlsConfig;
use ureq::typestate::WithBody;
use ureq::{Agent, RequestBuilder};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Anything able to perform one HTTP round-trip.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<F> Transport for F
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync,
{
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// Build an agent with a global timeout. `verify_tls = false` accepts
    /// any server certificate, which on-premise farms with self-signed
    /// certificates need.
    pub fn new(verify_tls: bool, timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .tls_config(
                TlsConfig::builder()
                    .disable_verification(!verify_tls)
                    .build(),
            )
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, url = %request.url, "executing request");

        let result = match request.method {
            HttpMethod::Get => {
                with_headers(self.agent.get(&request.url), &request.headers).call()
            }
            HttpMethod::Delete => {
                with_headers(self.agent.delete(&request.url), &request.headers).call()
            }
            HttpMethod::Post => send_body(
                with_headers(self.agent.post(&request.url), &request.headers),
                request.body.as_deref(),
            ),
            HttpMethod::Put => send_body(
                with_headers(self.agent.put(&request.url), &request.headers),
                request.body.as_deref(),
            ),
        };
        let response = result.map_err(|e| ApiError::TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let mut body = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| ApiError::TransportError(format!("failed to read response body: {e}")))?;

        debug!(status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: RequestBuilder<WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}
