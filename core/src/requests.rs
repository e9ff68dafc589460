//! Construction of SharePoint REST requests.
//!
//! # Design
//! `SiteRequests` knows where a site's API lives (`api_root`) and which
//! server-relative folder is the document root (`folder_root`). Every
//! `build_*` method normalises its paths, assembles the OData action,
//! percent-encodes it, and returns plain `HttpRequest` data. Nothing here
//! touches the network or any mutable state; the cloud and on-premise
//! clients differ only in the roots they pass in and in what they do
//! around sending.

use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::path::{encode_action, normalize_path, odata_literal};
use crate::types::{CreateFolder, ResourceKind};

pub const ODATA_VERBOSE: &str = "application/json;odata=verbose";
const OCTET_STREAM: &str = "application/octet-stream";

/// Request builder bound to one site and document library.
#[derive(Debug, Clone)]
pub struct SiteRequests {
    api_root: String,
    folder_root: String,
    base_headers: Vec<(String, String)>,
}

impl SiteRequests {
    /// `api_root` is the `.../_api/Web` URL, `folder_root` the unencoded
    /// server-relative URL of the document library.
    pub fn new(api_root: &str, folder_root: &str, access_token: Option<&str>) -> Self {
        let mut base_headers = vec![("Accept".to_string(), ODATA_VERBOSE.to_string())];
        if let Some(token) = access_token.filter(|t| !t.trim().is_empty()) {
            base_headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        Self {
            api_root: api_root.trim_end_matches('/').to_string(),
            folder_root: format!("/{}", folder_root.trim_matches('/')),
            base_headers,
        }
    }

    pub fn folder_root(&self) -> &str {
        &self.folder_root
    }

    /// Headers sent with every request.
    pub fn base_headers(&self) -> &[(String, String)] {
        &self.base_headers
    }

    /// Server-relative URL of `path` below the document library.
    ///
    /// Opaque identifiers (`id:...`, `rev:...`, `ns:<digits>...`) are not
    /// slash-prefixed by `normalize_path`, so they are appended to the
    /// library root verbatim: `id:abc` becomes `/<root>id:abc`.
    pub fn server_relative(&self, path: &str) -> String {
        format!("{}{}", self.folder_root, normalize_path(path))
    }

    pub fn build_create_folder(&self, path: &str) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_vec(&CreateFolder::new(self.server_relative(path)))
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(self.request(
            HttpMethod::Post,
            "folders",
            &[("Content-Type", ODATA_VERBOSE)],
            Some(body),
        ))
    }

    pub fn build_delete(&self, path: &str) -> HttpRequest {
        self.delete_request(ResourceKind::Folder, path)
    }

    pub fn build_delete_file(&self, path: &str) -> HttpRequest {
        self.delete_request(ResourceKind::File, path)
    }

    pub fn build_get_metadata(&self, path: &str, kind: ResourceKind) -> HttpRequest {
        self.request(HttpMethod::Get, &self.locate(kind, path), &[], None)
    }

    pub fn build_list_folder(&self, path: &str) -> HttpRequest {
        let action = format!("{}/Folders", self.locate(ResourceKind::Folder, path));
        self.request(HttpMethod::Get, &action, &[], None)
    }

    pub fn build_copy(&self, from: &str, to: &str, kind: ResourceKind) -> HttpRequest {
        let action = format!(
            "{}/copyTo(strNewUrl={}, bOverWrite=true)",
            self.locate(kind, from),
            odata_literal(&self.server_relative(to))
        );
        self.request(HttpMethod::Post, &action, &[], None)
    }

    /// Files are moved with `flags=1` (overwrite); folders take no flags.
    pub fn build_move(&self, from: &str, to: &str, kind: ResourceKind) -> HttpRequest {
        let destination = odata_literal(&self.server_relative(to));
        let call = match kind {
            ResourceKind::Folder => format!("moveTo(newUrl={destination})"),
            ResourceKind::File => format!("moveTo(newUrl={destination}, flags=1)"),
        };
        let action = format!("{}/{call}", self.locate(kind, from));
        self.request(HttpMethod::Post, &action, &[], None)
    }

    /// Add (or overwrite) `file_name` inside `folder`, a path below the
    /// document library.
    pub fn build_add_file(&self, folder: &str, file_name: &str, contents: Vec<u8>) -> HttpRequest {
        let action = format!(
            "{}/Files/add(url={}, overwrite=true)",
            self.locate(ResourceKind::Folder, folder),
            odata_literal(file_name)
        );
        self.request(
            HttpMethod::Post,
            &action,
            &[("Content-Type", OCTET_STREAM)],
            Some(contents),
        )
    }

    pub fn build_download(&self, path: &str) -> HttpRequest {
        let action = format!("{}/$value", self.locate(ResourceKind::File, path));
        self.request(HttpMethod::Get, &action, &[], None)
    }

    pub fn build_start_upload(&self, path: &str, upload_id: Uuid, chunk: Vec<u8>) -> HttpRequest {
        let action = format!(
            "{}/StartUpload(uploadId=guid'{upload_id}')",
            self.locate(ResourceKind::File, path)
        );
        self.chunk_request(&action, chunk)
    }

    pub fn build_continue_upload(
        &self,
        path: &str,
        upload_id: Uuid,
        offset: u64,
        chunk: Vec<u8>,
    ) -> HttpRequest {
        let action = format!(
            "{}/ContinueUpload(uploadId=guid'{upload_id}',fileOffset={offset})",
            self.locate(ResourceKind::File, path)
        );
        self.chunk_request(&action, chunk)
    }

    pub fn build_finish_upload(
        &self,
        path: &str,
        upload_id: Uuid,
        offset: u64,
        chunk: Vec<u8>,
    ) -> HttpRequest {
        let action = format!(
            "{}/FinishUpload(uploadId=guid'{upload_id}',fileOffset={offset})",
            self.locate(ResourceKind::File, path)
        );
        self.chunk_request(&action, chunk)
    }

    /// Discard an upload session; the file keeps its pre-session content.
    pub fn build_cancel_upload(&self, path: &str, upload_id: Uuid) -> HttpRequest {
        let action = format!(
            "{}/CancelUpload(uploadId=guid'{upload_id}')",
            self.locate(ResourceKind::File, path)
        );
        self.request(HttpMethod::Post, &action, &[], None)
    }

    fn delete_request(&self, kind: ResourceKind, path: &str) -> HttpRequest {
        let action = self.locate(kind, path);
        self.request(
            HttpMethod::Post,
            &action,
            &[("IF-MATCH", "etag"), ("X-HTTP-Method", "DELETE")],
            None,
        )
    }

    fn chunk_request(&self, action: &str, chunk: Vec<u8>) -> HttpRequest {
        self.request(
            HttpMethod::Post,
            action,
            &[("Content-Type", OCTET_STREAM)],
            Some(chunk),
        )
    }

    /// `Get{File,Folder}ByServerRelativeUrl('<root><path>')`.
    fn locate(&self, kind: ResourceKind, path: &str) -> String {
        format!(
            "{}({})",
            kind.accessor(),
            odata_literal(&self.server_relative(path))
        )
    }

    fn request(
        &self,
        method: HttpMethod,
        action: &str,
        extra_headers: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> HttpRequest {
        let mut headers = self.base_headers.clone();
        headers.extend(
            extra_headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        HttpRequest {
            method,
            url: format!("{}/{}", self.api_root, encode_action(action)),
            headers,
            body,
        }
    }
}
