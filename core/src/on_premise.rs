//! Client for on-premise SharePoint farms.
//!
//! # Design
//! Requests address `<site url>/_api/Web/<action>`. Every POST or PUT
//! carries an `X-RequestDigest` header taken from the client's
//! `DigestCache`; when the cache is empty or expired, a context-info call
//! refreshes it first. Reads never touch the digest.
//!
//! Folders on the exclusion list are protected: `create_folder` and
//! `delete` on them report success without contacting the server.
//!
//! The digest is mutated in place with no locking. Mutating operations
//! take `&mut self`, so sharing one client across threads requires the
//! caller to serialise access.

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::OnPremiseConfig;
use crate::digest::{build_context_info, parse_context_info, DigestCache};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::odata::{check_status, parse_flag, parse_object, parse_results};
use crate::path::{normalize_path, split_parent};
use crate::requests::SiteRequests;
use crate::store::DocumentStore;
use crate::transport::{Transport, UreqTransport};
use crate::types::{Metadata, ResourceKind};
use crate::upload::{upload_in_chunks, Dispatch};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct OnPremiseClient {
    config: OnPremiseConfig,
    requests: SiteRequests,
    transport: Arc<dyn Transport>,
    context_info_url: String,
    excluded: Vec<String>,
    digest: DigestCache,
    clock: Clock,
}

impl OnPremiseClient {
    pub fn new(config: OnPremiseConfig) -> Result<Self, ApiError> {
        let transport = UreqTransport::new(config.verify_tls, config.timeout());
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: OnPremiseConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        config.validate()?;
        let requests = SiteRequests::new(
            &config.api_root(),
            &config.folder_root(),
            config.access_token.as_deref(),
        );
        let excluded = config
            .excluded_folders
            .iter()
            .map(|p| normalize_path(p))
            .collect();
        Ok(Self {
            context_info_url: config.context_info_url(),
            config,
            requests,
            transport,
            excluded,
            digest: DigestCache::new(),
            clock: Arc::new(Utc::now),
        })
    }

    /// Replace the time source used for digest expiry.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OnPremiseConfig {
        &self.config
    }

    pub fn digest(&self) -> &DigestCache {
        &self.digest
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.excluded.iter().any(|p| *p == path)
    }

    /// Return a digest valid now, fetching a new one if needed.
    pub fn request_digest(&mut self) -> Result<String, ApiError> {
        let now = (self.clock)();
        if let Some(value) = self.digest.fresh_value(now) {
            return Ok(value.to_string());
        }

        let request = build_context_info(&self.context_info_url, self.requests.base_headers());
        debug!(url = %request.url, state = ?self.digest.state_at(now), "refreshing request digest");
        let info = parse_context_info(&self.transport.execute(&request)?)?;
        let digest = self.digest.store(info, now);
        debug!(expires_at = %digest.expires_at, "request digest refreshed");
        Ok(digest.value.clone())
    }

    fn send(&mut self, mut request: HttpRequest) -> Result<HttpResponse, ApiError> {
        if request.method.is_mutating() {
            let digest = self.request_digest()?;
            request.set_header("X-RequestDigest", digest);
        }
        self.get(request)
    }

    fn get(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, url = %request.url, "sharepoint request");
        self.transport.execute(&request)
    }

    fn skip_excluded(&self, path: &str, operation: &str) -> bool {
        if self.is_excluded(path) {
            info!(operation, path, "path is excluded, skipping request");
            return true;
        }
        false
    }
}

impl fmt::Debug for OnPremiseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnPremiseClient")
            .field("site_url", &self.config.site_url)
            .field("excluded", &self.excluded)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

impl Dispatch for OnPremiseClient {
    fn requests(&self) -> &SiteRequests {
        &self.requests
    }

    fn dispatch(&mut self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.send(request)
    }
}

impl DocumentStore for OnPremiseClient {
    fn create_folder(&mut self, path: &str) -> Result<bool, ApiError> {
        if self.skip_excluded(path, "create_folder") {
            return Ok(true);
        }
        let request = self.requests.build_create_folder(path)?;
        Ok(parse_flag(&self.send(request)?, "create_folder"))
    }

    fn delete(&mut self, path: &str) -> Result<bool, ApiError> {
        if self.skip_excluded(path, "delete") {
            return Ok(true);
        }
        let request = self.requests.build_delete(path);
        Ok(parse_flag(&self.send(request)?, "delete"))
    }

    fn get_metadata(&self, path: &str, kind: ResourceKind) -> Result<Metadata, ApiError> {
        let request = self.requests.build_get_metadata(path, kind);
        parse_object(&self.get(request)?)
    }

    fn list_folder(&self, path: &str, _recursive: bool) -> Result<Vec<Value>, ApiError> {
        let request = self.requests.build_list_folder(path);
        parse_results(&self.get(request)?)
    }

    fn copy(&mut self, from: &str, to: &str, kind: ResourceKind) -> Result<bool, ApiError> {
        let request = self.requests.build_copy(from, to, kind);
        Ok(parse_flag(&self.send(request)?, "copy"))
    }

    fn move_item(&mut self, from: &str, to: &str, kind: ResourceKind) -> Result<bool, ApiError> {
        let request = self.requests.build_move(from, to, kind);
        Ok(parse_flag(&self.send(request)?, "move"))
    }

    /// The file is added to its parent folder under its own name.
    fn upload(&mut self, path: &str, contents: Vec<u8>) -> Result<Metadata, ApiError> {
        let (folder, name) = split_parent(path);
        let request = self.requests.build_add_file(&folder, &name, contents);
        parse_object(&self.send(request)?)
    }

    fn upload_chunked(
        &mut self,
        path: &str,
        reader: &mut dyn Read,
        chunk_size: usize,
    ) -> Result<Metadata, ApiError> {
        let (folder, name) = split_parent(path);
        upload_in_chunks(self, &folder, &name, reader, chunk_size)
    }

    fn download(&self, path: &str) -> Result<Box<dyn Read + Send>, ApiError> {
        let request = self.requests.build_download(path);
        let response = self.get(request)?;
        check_status(&response)?;
        Ok(Box::new(Cursor::new(response.body)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::http::HttpMethod;

    type Log = Arc<Mutex<Vec<HttpRequest>>>;

    const CONTEXT_INFO: &str =
        r#"{"d":{"GetContextWebInformation":{"FormDigestValue":"0xDIGEST","FormDigestTimeoutSeconds":1800}}}"#;

    /// Answers context-info calls with a digest and everything else with
    /// `status`.
    fn farm(status: u16) -> (Arc<dyn Transport>, Log) {
        let log: Log = Arc::default();
        let seen = Arc::clone(&log);
        let transport = move |request: &HttpRequest| -> Result<HttpResponse, ApiError> {
            seen.lock().unwrap().push(request.clone());
            let body = if request.url.ends_with("/_api/contextinfo") {
                CONTEXT_INFO
            } else {
                r#"{"d":{"results":[]}}"#
            };
            let status = if request.url.ends_with("/_api/contextinfo") { 200 } else { status };
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            })
        };
        (Arc::new(transport), log)
    }

    fn config() -> OnPremiseConfig {
        let mut config = OnPremiseConfig::new("https://farm.corp");
        config.excluded_folders = vec!["Forms/".to_string(), "/System".to_string()];
        config
    }

    fn digest_fetches(log: &Log) -> usize {
        log.lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with("/_api/contextinfo"))
            .count()
    }

    #[test]
    fn mutating_calls_within_validity_fetch_digest_once() {
        let (transport, log) = farm(200);
        let mut client = OnPremiseClient::with_transport(config(), transport).unwrap();
        assert!(client.create_folder("a").unwrap());
        assert!(client.create_folder("b").unwrap());

        assert_eq!(digest_fetches(&log), 1);
        let sent = log.lock().unwrap();
        let folders: Vec<_> = sent.iter().filter(|r| r.url.ends_with("/folders")).collect();
        assert_eq!(folders.len(), 2);
        assert!(folders.iter().all(|r| r.header("X-RequestDigest") == Some("0xDIGEST")));
        assert_eq!(folders[0].url, "https://farm.corp/_api/Web/folders");
    }

    #[test]
    fn expired_digest_is_refreshed_exactly_once() {
        let (transport, log) = farm(200);
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let now = Arc::new(Mutex::new(start));
        let clock_now = Arc::clone(&now);
        let mut client = OnPremiseClient::with_transport(config(), transport)
            .unwrap()
            .with_clock(Arc::new(move || *clock_now.lock().unwrap()));

        client.create_folder("a").unwrap();
        assert_eq!(digest_fetches(&log), 1);

        *now.lock().unwrap() = start + Duration::seconds(1800);
        client.create_folder("b").unwrap();
        client.delete("b").unwrap();
        assert_eq!(digest_fetches(&log), 2);
    }

    #[test]
    fn reads_never_fetch_a_digest() {
        let (transport, log) = farm(200);
        let client = OnPremiseClient::with_transport(config(), transport).unwrap();
        client.list_folder("", false).unwrap();
        client.get_metadata("a.txt", ResourceKind::File).unwrap();
        assert_eq!(digest_fetches(&log), 0);
        assert!(log.lock().unwrap().iter().all(|r| r.method == HttpMethod::Get));
        assert!(client.digest().current().is_none());
    }

    #[test]
    fn excluded_paths_short_circuit() {
        let (transport, log) = farm(500);
        let mut client = OnPremiseClient::with_transport(config(), transport).unwrap();
        assert!(client.create_folder("/Forms").unwrap());
        assert!(client.delete("System/").unwrap());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn non_excluded_failure_is_soft() {
        let (transport, _) = farm(409);
        let mut client = OnPremiseClient::with_transport(config(), transport).unwrap();
        assert!(!client.create_folder("Forms/Sub").unwrap());
    }

    #[test]
    fn context_info_failure_aborts_mutation() {
        let transport = |request: &HttpRequest| -> Result<HttpResponse, ApiError> {
            let status = if request.url.ends_with("/_api/contextinfo") { 401 } else { 200 };
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: b"unauthorized".to_vec(),
            })
        };
        let mut client = OnPremiseClient::with_transport(config(), Arc::new(transport)).unwrap();
        let err = client.create_folder("a").unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn upload_splits_folder_and_file_name() {
        let (transport, log) = farm(200);
        let mut client = OnPremiseClient::with_transport(config(), transport).unwrap();
        client.upload("/Reports/2024/q1.csv", b"1,2".to_vec()).unwrap();
        let sent = log.lock().unwrap();
        let upload = sent.last().unwrap();
        assert_eq!(
            upload.url,
            "https://farm.corp/_api/Web/GetFolderByServerRelativeUrl('/Shared%20Documents/Reports/2024')\
             /Files/add(url='q1.csv',%20overwrite=true)"
        );
        assert_eq!(upload.header("X-RequestDigest"), Some("0xDIGEST"));
    }

    #[test]
    fn request_digest_reuses_fresh_value() {
        let (transport, log) = farm(200);
        let mut client = OnPremiseClient::with_transport(config(), transport).unwrap();
        assert_eq!(client.request_digest().unwrap(), "0xDIGEST");
        assert_eq!(client.request_digest().unwrap(), "0xDIGEST");
        assert_eq!(digest_fetches(&log), 1);
    }
}
