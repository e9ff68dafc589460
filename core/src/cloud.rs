//! Client for hosted (SharePoint Online) tenants.
//!
//! Requests go to absolute URLs under `<site url>/sites/<name>/_api/Web`
//! and authenticate with a static bearer token. Every operation is one
//! request and one response.

use std::io::{Cursor, Read};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::CloudConfig;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::odata::{check_status, parse_flag, parse_object, parse_results};
use crate::requests::SiteRequests;
use crate::store::DocumentStore;
use crate::transport::{Transport, UreqTransport};
use crate::types::{Metadata, ResourceKind};
use crate::upload::{upload_in_chunks, Dispatch};

pub struct CloudClient {
    config: CloudConfig,
    requests: SiteRequests,
    transport: Arc<dyn Transport>,
}

impl CloudClient {
    pub fn new(config: CloudConfig) -> Result<Self, ApiError> {
        let transport = UreqTransport::new(config.verify_tls, config.timeout());
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: CloudConfig, transport: Arc<dyn Transport>) -> Result<Self, ApiError> {
        config.validate()?;
        let requests = SiteRequests::new(
            &config.api_root(),
            &config.folder_root(),
            config.access_token.as_deref(),
        );
        Ok(Self {
            config,
            requests,
            transport,
        })
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    pub fn requests(&self) -> &SiteRequests {
        &self.requests
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, url = %request.url, "sharepoint request");
        self.transport.execute(&request)
    }
}

impl Dispatch for CloudClient {
    fn requests(&self) -> &SiteRequests {
        &self.requests
    }

    fn dispatch(&mut self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.send(request)
    }
}

impl DocumentStore for CloudClient {
    fn create_folder(&mut self, path: &str) -> Result<bool, ApiError> {
        let request = self.requests.build_create_folder(path)?;
        Ok(parse_flag(&self.send(request)?, "create_folder"))
    }

    fn delete(&mut self, path: &str) -> Result<bool, ApiError> {
        let request = self.requests.build_delete(path);
        Ok(parse_flag(&self.send(request)?, "delete"))
    }

    fn get_metadata(&self, path: &str, kind: ResourceKind) -> Result<Metadata, ApiError> {
        let request = self.requests.build_get_metadata(path, kind);
        parse_object(&self.send(request)?)
    }

    fn list_folder(&self, path: &str, _recursive: bool) -> Result<Vec<Value>, ApiError> {
        let request = self.requests.build_list_folder(path);
        parse_results(&self.send(request)?)
    }

    fn copy(&mut self, from: &str, to: &str, kind: ResourceKind) -> Result<bool, ApiError> {
        let request = self.requests.build_copy(from, to, kind);
        Ok(parse_flag(&self.send(request)?, "copy"))
    }

    fn move_item(&mut self, from: &str, to: &str, kind: ResourceKind) -> Result<bool, ApiError> {
        let request = self.requests.build_move(from, to, kind);
        Ok(parse_flag(&self.send(request)?, "move"))
    }

    /// The whole path becomes the file URL inside the library root.
    fn upload(&mut self, path: &str, contents: Vec<u8>) -> Result<Metadata, ApiError> {
        let request = self
            .requests
            .build_add_file("", path.trim_matches('/'), contents);
        parse_object(&self.send(request)?)
    }

    fn upload_chunked(
        &mut self,
        path: &str,
        reader: &mut dyn Read,
        chunk_size: usize,
    ) -> Result<Metadata, ApiError> {
        upload_in_chunks(self, "", path.trim_matches('/'), reader, chunk_size)
    }

    fn download(&self, path: &str) -> Result<Box<dyn Read + Send>, ApiError> {
        let request = self.requests.build_download(path);
        let response = self.send(request)?;
        check_status(&response)?;
        Ok(Box::new(Cursor::new(response.body)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::http::HttpMethod;

    type Log = Arc<Mutex<Vec<HttpRequest>>>;

    /// Transport answering every request with the same status and body.
    fn scripted(status: u16, body: &'static str) -> (Arc<dyn Transport>, Log) {
        let log: Log = Arc::default();
        let seen = Arc::clone(&log);
        let transport = move |request: &HttpRequest| -> Result<HttpResponse, ApiError> {
            seen.lock().unwrap().push(request.clone());
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            })
        };
        (Arc::new(transport), log)
    }

    fn client(transport: Arc<dyn Transport>) -> CloudClient {
        let config = CloudConfig::new("team", "https://contoso.sharepoint.com", "tok");
        CloudClient::with_transport(config, transport).unwrap()
    }

    #[test]
    fn create_folder_true_on_200() {
        let (transport, log) = scripted(200, "{}");
        assert!(client(transport).create_folder("Reports").unwrap());
        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].url, "https://contoso.sharepoint.com/sites/team/_api/Web/folders");
        assert_eq!(sent[0].header("Authorization"), Some("Bearer tok"));
        assert!(sent[0].header("X-RequestDigest").is_none());
    }

    #[test]
    fn create_folder_false_on_conflict() {
        let (transport, _) = scripted(409, "exists");
        assert!(!client(transport).create_folder("Reports").unwrap());
    }

    #[test]
    fn transport_failure_carries_response_text() {
        let transport = |_: &HttpRequest| -> Result<HttpResponse, ApiError> {
            let response = HttpResponse {
                status: 500,
                headers: Vec::new(),
                body: b"boom".to_vec(),
            };
            Err(ApiError::HttpError {
                status: 500,
                message: response.to_message_string(),
            })
        };
        let err = client(Arc::new(transport)).create_folder("x").unwrap_err();
        assert!(err.to_string().contains("500 Internal Server Error"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn delete_and_copy_report_status() {
        let (transport, log) = scripted(200, "");
        let mut c = client(transport);
        assert!(c.delete("Old").unwrap());
        assert!(c.copy("a.txt", "b.txt", ResourceKind::File).unwrap());
        assert!(c.move_item("a", "b", ResourceKind::Folder).unwrap());
        assert_eq!(log.lock().unwrap().len(), 3);

        let (transport, _) = scripted(404, "");
        assert!(!client(transport).delete("Missing").unwrap());
    }

    #[test]
    fn list_folder_without_envelope_is_empty() {
        let (transport, _) = scripted(200, r#"{"error":null}"#);
        assert!(client(transport).list_folder("", true).unwrap().is_empty());
    }

    #[test]
    fn list_folder_returns_results() {
        let (transport, _) = scripted(200, r#"{"d":{"results":[{"Name":"A"},{"Name":"B"}]}}"#);
        let folders = client(transport).list_folder("/", false).unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0]["Name"], "A");
    }

    #[test]
    fn get_metadata_error_status_is_http_error() {
        let (transport, _) = scripted(404, "not here");
        let err = client(transport)
            .get_metadata("a.txt", ResourceKind::File)
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().ends_with("not here"));
    }

    #[test]
    fn upload_uses_full_path_as_file_url() {
        let (transport, log) = scripted(200, r#"{"d":{"Name":"c.txt","Length":"2"}}"#);
        let meta = client(transport).upload("/a/b/c.txt", b"hi".to_vec()).unwrap();
        assert_eq!(meta["Name"], "c.txt");
        let sent = log.lock().unwrap();
        assert!(sent[0].url.ends_with(
            "GetFolderByServerRelativeUrl('/sites/team/Shared%20Documents')/Files/add(url='a/b/c.txt',%20overwrite=true)"
        ));
    }

    #[test]
    fn upload_reader_sends_small_input_in_one_request() {
        let (transport, log) = scripted(200, r#"{"d":{"Name":"r.txt"}}"#);
        let mut reader = Cursor::new(vec![7u8; 1024]);
        let meta = client(transport).upload_reader("r.txt", &mut reader).unwrap();
        assert_eq!(meta["Name"], "r.txt");
        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].url.contains("/Files/add(url='r.txt'"));
        assert_eq!(sent[0].body.as_ref().map(Vec::len), Some(1024));
    }

    #[test]
    fn download_returns_body_reader() {
        let (transport, _) = scripted(200, "file bytes");
        let mut reader = client(transport).download("a.txt").unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "file bytes");
    }
}
