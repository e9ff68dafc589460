//! Request digest (form digest) cache for on-premise farms.
//!
//! On-premise SharePoint rejects state-changing calls that lack a valid
//! `X-RequestDigest` header. The digest is obtained from
//! `POST /_api/contextinfo` and stays valid for the number of seconds the
//! server reports alongside it.
//!
//! Lifecycle: `Absent -> Valid -> Expired -> Valid`. Only the owning client
//! moves it forward, and only when it is about to send a mutating request.

use chrono::{DateTime, Duration, Utc};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::odata::check_status;
use crate::types::{ContextInfoEnvelope, ContextWebInformation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestState {
    Absent,
    Valid,
    Expired,
}

/// A digest value and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDigest {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DigestCache {
    current: Option<RequestDigest>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> DigestState {
        match &self.current {
            None => DigestState::Absent,
            Some(digest) if now < digest.expires_at => DigestState::Valid,
            Some(_) => DigestState::Expired,
        }
    }

    /// The held value, if it is still valid at `now`.
    pub fn fresh_value(&self, now: DateTime<Utc>) -> Option<&str> {
        match self.state_at(now) {
            DigestState::Valid => self.current.as_ref().map(|d| d.value.as_str()),
            _ => None,
        }
    }

    /// Replace the held digest with one fetched at `now`.
    pub fn store(&mut self, info: ContextWebInformation, now: DateTime<Utc>) -> &RequestDigest {
        let lifetime = Duration::seconds(info.form_digest_timeout_seconds.max(0));
        self.current.insert(RequestDigest {
            value: info.form_digest_value,
            expires_at: now + lifetime,
        })
    }

    pub fn current(&self) -> Option<&RequestDigest> {
        self.current.as_ref()
    }
}

/// `POST <site>/_api/contextinfo` with the client's base headers.
pub fn build_context_info(url: &str, base_headers: &[(String, String)]) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Post,
        url: url.to_string(),
        headers: base_headers.to_vec(),
        body: None,
    }
}

pub fn parse_context_info(response: &HttpResponse) -> Result<ContextWebInformation, ApiError> {
    check_status(response)?;
    let envelope: ContextInfoEnvelope = serde_json::from_slice(&response.body)
        .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
    Ok(envelope.d.web_information)
}
