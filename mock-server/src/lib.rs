//! In-memory emulator of the SharePoint REST endpoints the client uses.
//!
//! Serves both URL layouts (`/sites/<name>/_api/...` for hosted tenants and
//! `/_api/...` for on-premise farms) from one store of folders and files
//! keyed by server-relative URL. OData actions such as
//! `GetFolderByServerRelativeUrl('<path>')/Folders` contain slashes inside
//! their string literals, so instead of axum path routes a single fallback
//! handler decodes and parses the action itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Server-side state, shared with tests so they can seed and inspect it.
#[derive(Debug)]
pub struct Farm {
    pub folders: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<u8>>,
    /// Upload id -> (file path, bytes received so far).
    pub uploads: HashMap<String, (String, Vec<u8>)>,
    /// When set, every request must carry `Authorization: Bearer <token>`.
    pub access_token: Option<String>,
    /// When set, POSTs to `/_api/Web` must carry the last issued digest.
    pub require_digest: bool,
    pub digest_timeout_secs: i64,
    pub issued_digest: Option<String>,
    pub digest_requests: usize,
    pub api_requests: usize,
}

impl Default for Farm {
    fn default() -> Self {
        Self {
            folders: BTreeSet::new(),
            files: BTreeMap::new(),
            uploads: HashMap::new(),
            access_token: None,
            require_digest: false,
            digest_timeout_secs: 1800,
            issued_digest: None,
            digest_requests: 0,
            api_requests: 0,
        }
    }
}

pub type Db = Arc<RwLock<Farm>>;

pub fn app() -> Router {
    app_with(Db::default())
}

pub fn app_with(db: Db) -> Router {
    Router::new().fallback(handle).with_state(db)
}

pub async fn run(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(db)).await
}

async fn handle(
    State(db): State<Db>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    debug!(%method, path, "mock request");
    let mut farm = db.write().await;

    if let Some(token) = farm.access_token.as_deref() {
        let expected = format!("Bearer {token}");
        if header(&headers, "authorization") != Some(expected.as_str()) {
            return error(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
        }
    }

    if path.ends_with("/_api/contextinfo") {
        if method != Method::POST {
            return error(StatusCode::METHOD_NOT_ALLOWED, "contextinfo requires POST");
        }
        return context_info(&mut farm);
    }

    let Some((_, encoded)) = path.split_once("/_api/Web/") else {
        return error(StatusCode::NOT_FOUND, "unknown endpoint");
    };
    let action = percent_decode_str(encoded).decode_utf8_lossy().into_owned();
    farm.api_requests += 1;

    if method == Method::POST && farm.require_digest {
        let sent = header(&headers, "x-requestdigest");
        if sent.is_none() || sent != farm.issued_digest.as_deref() {
            return error(StatusCode::FORBIDDEN, "the security validation for this page is invalid");
        }
    }

    let overridden = header(&headers, "x-http-method").unwrap_or(method.as_str()).to_ascii_uppercase();
    match Action::parse(&action) {
        Some(action) => farm.apply(action, &overridden, body),
        None => error(StatusCode::BAD_REQUEST, &format!("unsupported action: {action}")),
    }
}

fn context_info(farm: &mut Farm) -> Response {
    farm.digest_requests += 1;
    let digest = format!("0x{}", Uuid::new_v4().simple());
    farm.issued_digest = Some(digest.clone());
    Json(json!({
        "d": {
            "GetContextWebInformation": {
                "FormDigestValue": digest,
                "FormDigestTimeoutSeconds": farm.digest_timeout_secs,
            }
        }
    }))
    .into_response()
}

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Folder,
    File,
}

/// A decoded `_api/Web/...` action.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    CreateFolder,
    Resource {
        target: Target,
        path: String,
        call: Option<Call>,
    },
}

/// A trailing `/Segment` or `/Name(key=value, ...)` after a resource.
#[derive(Debug, PartialEq, Eq)]
struct Call {
    name: String,
    args: HashMap<String, String>,
}

impl Action {
    fn parse(action: &str) -> Option<Action> {
        if action == "folders" {
            return Some(Action::CreateFolder);
        }
        let (target, rest) = if let Some(rest) = action.strip_prefix("GetFolderByServerRelativeUrl(") {
            (Target::Folder, rest)
        } else {
            (Target::File, action.strip_prefix("GetFileByServerRelativeUrl(")?)
        };
        let (path, rest) = read_literal(rest)?;
        let rest = rest.strip_prefix(')')?;
        let call = match rest.strip_prefix('/') {
            None if rest.is_empty() => None,
            None => return None,
            Some(call) => Some(Call::parse(call)?),
        };
        Some(Action::Resource { target, path, call })
    }
}

impl Call {
    fn parse(call: &str) -> Option<Call> {
        let Some(open) = call.find('(') else {
            return Some(Call {
                name: call.to_string(),
                args: HashMap::new(),
            });
        };
        // `Files/add(...)` keeps its collection prefix in the name.
        let name = call[..open].to_string();
        let inner = call[open + 1..].strip_suffix(')')?;
        let mut args = HashMap::new();
        for part in split_args(inner) {
            let (key, value) = part.split_once('=')?;
            args.insert(key.trim().to_string(), unquote(value.trim()));
        }
        Some(Call { name, args })
    }

    fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }
}

/// Read `'...'` with `''` escapes from the start of `s`.
fn read_literal(s: &str) -> Option<(String, &str)> {
    let mut chars = s.strip_prefix('\'')?.char_indices().peekable();
    let body = &s[1..];
    let mut value = String::new();
    while let Some((i, c)) = chars.next() {
        if c != '\'' {
            value.push(c);
            continue;
        }
        if matches!(chars.peek(), Some((_, '\''))) {
            chars.next();
            value.push('\'');
            continue;
        }
        return Some((value, &body[i + 1..]));
    }
    None
}

/// Split on commas outside of quoted literals.
fn split_args(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !inner[start..].trim().is_empty() {
        parts.push(&inner[start..]);
    }
    parts
}

fn unquote(value: &str) -> String {
    let value = value.strip_prefix("guid").unwrap_or(value);
    match value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => value.to_string(),
    }
}

#[derive(Deserialize)]
struct FolderBody {
    #[serde(rename = "ServerRelativeUrl")]
    server_relative_url: String,
}

impl Farm {
    fn apply(&mut self, action: Action, method: &str, body: Bytes) -> Response {
        match action {
            Action::CreateFolder => self.create_folder(&body),
            Action::Resource { target, path, call } => {
                let call = call.as_ref().map(|c| (c.name.as_str(), c));
                match (target, call, method) {
                    (Target::Folder, None, "GET") => self.folder_metadata(&path),
                    (Target::Folder, None, "DELETE") => self.delete_folder(&path),
                    (Target::Folder, Some(("Folders", _)), "GET") => self.list_folders(&path),
                    (Target::Folder, Some(("Files/add", call)), "POST") => match call.arg("url") {
                        Some(name) => self.add_file(&path, name, body.to_vec()),
                        None => error(StatusCode::BAD_REQUEST, "Files/add needs url"),
                    },
                    (Target::File, None, "GET") => self.file_metadata(&path),
                    (Target::File, None, "DELETE") => self.delete_file(&path),
                    (Target::File, Some(("$value", _)), "GET") => self.file_contents(&path),
                    (_, Some(("copyTo", call)), "POST") => match call.arg("strNewUrl") {
                        Some(to) => self.copy_tree(&path, to, false),
                        None => error(StatusCode::BAD_REQUEST, "copyTo needs strNewUrl"),
                    },
                    (_, Some(("moveTo", call)), "POST") => match call.arg("newUrl") {
                        Some(to) => self.copy_tree(&path, to, true),
                        None => error(StatusCode::BAD_REQUEST, "moveTo needs newUrl"),
                    },
                    (
                        Target::File,
                        Some((
                            step @ ("StartUpload" | "ContinueUpload" | "FinishUpload" | "CancelUpload"),
                            call,
                        )),
                        "POST",
                    ) => self.upload_step(&path, step, call, body.to_vec()),
                    _ => error(StatusCode::BAD_REQUEST, "unsupported method for action"),
                }
            }
        }
    }

    fn create_folder(&mut self, body: &[u8]) -> Response {
        let Ok(input) = serde_json::from_slice::<FolderBody>(body) else {
            return error(StatusCode::BAD_REQUEST, "invalid folder body");
        };
        let path = input.server_relative_url.trim_end_matches('/').to_string();
        if !self.folders.insert(path.clone()) {
            return error(StatusCode::CONFLICT, "a folder with that name already exists");
        }
        Json(json!({ "d": self.folder_json(&path) })).into_response()
    }

    fn folder_metadata(&self, path: &str) -> Response {
        if !self.folders.contains(path) {
            return error(StatusCode::NOT_FOUND, "folder not found");
        }
        Json(json!({ "d": self.folder_json(path) })).into_response()
    }

    fn file_metadata(&self, path: &str) -> Response {
        match self.files.get(path) {
            Some(contents) => Json(json!({ "d": file_json(path, contents.len()) })).into_response(),
            None => error(StatusCode::NOT_FOUND, "file not found"),
        }
    }

    fn file_contents(&self, path: &str) -> Response {
        match self.files.get(path) {
            Some(contents) => (StatusCode::OK, contents.clone()).into_response(),
            None => error(StatusCode::NOT_FOUND, "file not found"),
        }
    }

    fn list_folders(&self, path: &str) -> Response {
        let results: Vec<Value> = self
            .folders
            .iter()
            .filter(|f| is_direct_child(path, f))
            .map(|f| self.folder_json(f))
            .collect();
        Json(json!({ "d": { "results": results } })).into_response()
    }

    fn delete_folder(&mut self, path: &str) -> Response {
        if !self.folders.remove(path) {
            return error(StatusCode::NOT_FOUND, "folder not found");
        }
        self.folders.retain(|f| !is_within(path, f));
        self.files.retain(|f, _| !is_within(path, f));
        StatusCode::OK.into_response()
    }

    fn delete_file(&mut self, path: &str) -> Response {
        match self.files.remove(path) {
            Some(_) => StatusCode::OK.into_response(),
            None => error(StatusCode::NOT_FOUND, "file not found"),
        }
    }

    fn add_file(&mut self, folder: &str, name: &str, contents: Vec<u8>) -> Response {
        let path = format!("{}/{}", folder.trim_end_matches('/'), name.trim_matches('/'));
        let len = contents.len();
        self.files.insert(path.clone(), contents);
        Json(json!({ "d": file_json(&path, len) })).into_response()
    }

    fn copy_tree(&mut self, from: &str, to: &str, remove_source: bool) -> Response {
        let relocate = |p: &str| format!("{to}{}", &p[from.len()..]);
        let folders: Vec<String> = self
            .folders
            .iter()
            .filter(|f| *f == from || is_within(from, f))
            .cloned()
            .collect();
        let files: Vec<(String, Vec<u8>)> = self
            .files
            .iter()
            .filter(|(f, _)| *f == from || is_within(from, f))
            .map(|(f, c)| (f.clone(), c.clone()))
            .collect();
        if folders.is_empty() && files.is_empty() {
            return error(StatusCode::NOT_FOUND, "source not found");
        }
        for folder in folders {
            if remove_source {
                self.folders.remove(&folder);
            }
            self.folders.insert(relocate(&folder));
        }
        for (file, contents) in files {
            if remove_source {
                self.files.remove(&file);
            }
            self.files.insert(relocate(&file), contents);
        }
        StatusCode::OK.into_response()
    }

    fn upload_step(&mut self, path: &str, step: &str, call: &Call, chunk: Vec<u8>) -> Response {
        let Some(id) = call.arg("uploadId").map(str::to_string) else {
            return error(StatusCode::BAD_REQUEST, "uploadId is required");
        };
        if step == "StartUpload" {
            if !self.files.contains_key(path) {
                return error(StatusCode::NOT_FOUND, "file not found");
            }
            let len = chunk.len();
            self.uploads.insert(id, (path.to_string(), chunk));
            return Json(json!({ "d": { "StartUpload": len.to_string() } })).into_response();
        }
        if step == "CancelUpload" {
            return match self.uploads.remove(&id) {
                Some(_) => StatusCode::OK.into_response(),
                None => error(StatusCode::NOT_FOUND, "upload session not found"),
            };
        }

        let offset: Option<usize> = call.arg("fileOffset").and_then(|o| o.parse().ok());
        let Some((target, received)) = self.uploads.get_mut(&id) else {
            return error(StatusCode::NOT_FOUND, "upload session not found");
        };
        if target.as_str() != path || offset != Some(received.len()) {
            return error(StatusCode::BAD_REQUEST, "file offset does not match upload session");
        }
        received.extend_from_slice(&chunk);

        if step == "ContinueUpload" {
            let len = received.len();
            return Json(json!({ "d": { "ContinueUpload": len.to_string() } })).into_response();
        }
        let Some((target, contents)) = self.uploads.remove(&id) else {
            return error(StatusCode::NOT_FOUND, "upload session not found");
        };
        let len = contents.len();
        self.files.insert(target.clone(), contents);
        Json(json!({ "d": file_json(&target, len) })).into_response()
    }

    fn folder_json(&self, path: &str) -> Value {
        let items = self.files.keys().filter(|f| is_direct_child(path, f)).count()
            + self.folders.iter().filter(|f| is_direct_child(path, f)).count();
        json!({
            "__metadata": { "type": "SP.Folder" },
            "Name": leaf(path),
            "ServerRelativeUrl": path,
            "ItemCount": items,
        })
    }
}

fn file_json(path: &str, len: usize) -> Value {
    json!({
        "__metadata": { "type": "SP.File" },
        "Name": leaf(path),
        "ServerRelativeUrl": path,
        "Length": len.to_string(),
    })
}

fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_within(parent: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn is_direct_child(parent: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn error(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "error": {
            "code": format!("-{}, Microsoft.SharePoint.SPException", status.as_u16()),
            "message": { "lang": "en-US", "value": message },
        }
    });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(action: &str) -> (Target, String, Option<Call>) {
        match Action::parse(action) {
            Some(Action::Resource { target, path, call }) => (target, path, call),
            other => panic!("unexpected parse of {action}: {other:?}"),
        }
    }

    #[test]
    fn parses_folder_collection() {
        assert_eq!(Action::parse("folders"), Some(Action::CreateFolder));
    }

    #[test]
    fn parses_plain_resource() {
        let (target, path, call) = resource("GetFolderByServerRelativeUrl('/Shared Documents/a')");
        assert_eq!(target, Target::Folder);
        assert_eq!(path, "/Shared Documents/a");
        assert!(call.is_none());
    }

    #[test]
    fn parses_escaped_quotes_in_literal() {
        let (_, path, _) = resource("GetFileByServerRelativeUrl('/Docs/O''Brien.txt')/$value");
        assert_eq!(path, "/Docs/O'Brien.txt");
    }

    #[test]
    fn parses_call_arguments() {
        let (target, _, call) = resource(
            "GetFileByServerRelativeUrl('/Docs/a.txt')/copyTo(strNewUrl='/Docs/b, c.txt', bOverWrite=true)",
        );
        let call = call.unwrap();
        assert_eq!(target, Target::File);
        assert_eq!(call.name, "copyTo");
        assert_eq!(call.arg("strNewUrl"), Some("/Docs/b, c.txt"));
        assert_eq!(call.arg("bOverWrite"), Some("true"));
    }

    #[test]
    fn parses_guid_arguments() {
        let (_, _, call) = resource(
            "GetFileByServerRelativeUrl('/Docs/big.bin')/ContinueUpload(uploadId=guid'0000-1',fileOffset=4)",
        );
        let call = call.unwrap();
        assert_eq!(call.arg("uploadId"), Some("0000-1"));
        assert_eq!(call.arg("fileOffset"), Some("4"));
    }

    #[test]
    fn rejects_unknown_actions() {
        assert!(Action::parse("lists").is_none());
        assert!(Action::parse("GetFolderByServerRelativeUrl('/a'").is_none());
    }

    #[test]
    fn direct_children_exclude_grandchildren() {
        assert!(is_direct_child("/Docs", "/Docs/a"));
        assert!(!is_direct_child("/Docs", "/Docs/a/b"));
        assert!(!is_direct_child("/Docs", "/Docsx"));
        assert!(is_within("/Docs", "/Docs/a/b"));
        assert!(!is_within("/Docs", "/Docs"));
    }
}
