//! Chunked uploads through SharePoint upload sessions.
//!
//! A session is `StartUpload` with the first chunk, `ContinueUpload` for
//! every middle chunk and `FinishUpload` with the last one. Each call
//! reports the server's byte offset, which `UploadSession` checks against
//! the bytes actually sent.
//!
//! The session writes to a staging file next to the target
//! (`<name>.<upload id>.uploading`). Only after `FinishUpload` succeeds is
//! the staging file moved onto the target with overwrite, so an existing
//! file keeps its content when the upload fails. On failure the session is
//! cancelled and the staging file deleted.

use std::io::{ErrorKind, Read};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::odata::{check_status, parse_object, parse_offset};
use crate::requests::SiteRequests;
use crate::types::{Metadata, ResourceKind};

/// Chunk size used by `DocumentStore::upload_reader`.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Cursor through a multi-chunk upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_id: Uuid,
    pub offset: u64,
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            upload_id: Uuid::new_v4(),
            offset: 0,
        }
    }

    /// Record that `sent` bytes were accepted and the server now reports
    /// `reported` as its offset.
    pub fn advance(&mut self, sent: usize, reported: u64) -> Result<(), ApiError> {
        let expected = self.offset + sent as u64;
        if reported != expected {
            return Err(ApiError::UploadOffset {
                expected,
                actual: reported,
            });
        }
        self.offset = reported;
        Ok(())
    }

    /// Name of the file the session writes to before it is moved onto
    /// `file_name`.
    pub fn staging_name(&self, file_name: &str) -> String {
        format!(
            "{}.{}.uploading",
            file_name.trim_matches('/'),
            self.upload_id.simple()
        )
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

/// What the chunk driver needs from a client: its request builder and a
/// way to send (which, on-premise, also attaches the digest).
pub(crate) trait Dispatch {
    fn requests(&self) -> &SiteRequests;
    fn dispatch(&mut self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Upload `reader` into `folder/file_name`, in `chunk_size` pieces when it
/// does not fit in one.
pub(crate) fn upload_in_chunks<D, R>(
    client: &mut D,
    folder: &str,
    file_name: &str,
    reader: &mut R,
    chunk_size: usize,
) -> Result<Metadata, ApiError>
where
    D: Dispatch + ?Sized,
    R: Read + ?Sized,
{
    if chunk_size == 0 {
        return Err(ApiError::ConfigError("chunk size must be greater than zero".to_string()));
    }

    let first = read_chunk(reader, chunk_size)?;
    let second = if first.len() < chunk_size {
        Vec::new()
    } else {
        read_chunk(reader, chunk_size)?
    };
    if second.is_empty() {
        let request = client.requests().build_add_file(folder, file_name, first);
        return parse_object(&client.dispatch(request)?);
    }

    let mut session = UploadSession::new();
    let staging_name = session.staging_name(file_name);
    let target = join(folder, file_name);
    let staging = join(folder, &staging_name);
    info!(upload_id = %session.upload_id, path = %target, "starting chunked upload");

    let request = client.requests().build_add_file(folder, &staging_name, Vec::new());
    check_status(&client.dispatch(request)?)?;

    if let Err(err) = run_session(client, &mut session, &staging, first, second, reader, chunk_size) {
        warn!(upload_id = %session.upload_id, error = %err, "chunked upload failed, cancelling");
        discard(client, &staging, Some(session.upload_id));
        return Err(err);
    }

    let request = client.requests().build_move(&staging, &target, ResourceKind::File);
    if let Err(err) = client.dispatch(request).and_then(|r| check_status(&r)) {
        warn!(upload_id = %session.upload_id, error = %err, "could not move staged upload onto target");
        discard(client, &staging, None);
        return Err(err);
    }
    debug!(upload_id = %session.upload_id, bytes = session.offset, "chunked upload finished");

    let request = client.requests().build_get_metadata(&target, ResourceKind::File);
    parse_object(&client.dispatch(request)?)
}

/// Stream every chunk into the staging file. `first` and `second` are
/// already read and non-empty.
fn run_session<D, R>(
    client: &mut D,
    session: &mut UploadSession,
    staging: &str,
    first: Vec<u8>,
    second: Vec<u8>,
    reader: &mut R,
    chunk_size: usize,
) -> Result<(), ApiError>
where
    D: Dispatch + ?Sized,
    R: Read + ?Sized,
{
    let sent = first.len();
    let request = client
        .requests()
        .build_start_upload(staging, session.upload_id, first);
    let reported = parse_offset(&client.dispatch(request)?, "StartUpload")?;
    session.advance(sent, reported)?;

    let mut next = second;
    loop {
        let current = next;
        next = read_chunk(reader, chunk_size)?;
        let sent = current.len();

        if next.is_empty() {
            let request = client.requests().build_finish_upload(
                staging,
                session.upload_id,
                session.offset,
                current,
            );
            check_status(&client.dispatch(request)?)?;
            session.offset += sent as u64;
            return Ok(());
        }

        let request = client.requests().build_continue_upload(
            staging,
            session.upload_id,
            session.offset,
            current,
        );
        let reported = parse_offset(&client.dispatch(request)?, "ContinueUpload")?;
        session.advance(sent, reported)?;
    }
}

/// Cancel the session (when one is open) and delete the staging file.
/// Failures are logged; the caller already has an error to return.
fn discard<D: Dispatch + ?Sized>(client: &mut D, staging: &str, upload_id: Option<Uuid>) {
    if let Some(id) = upload_id {
        let request = client.requests().build_cancel_upload(staging, id);
        if let Err(err) = client.dispatch(request).and_then(|r| check_status(&r)) {
            warn!(upload_id = %id, error = %err, "cancel upload failed");
        }
    }
    let request = client.requests().build_delete_file(staging);
    if let Err(err) = client.dispatch(request).and_then(|r| check_status(&r)) {
        warn!(path = %staging, error = %err, "could not delete staging file");
    }
}

fn join(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_matches('/'), name.trim_matches('/'))
}

/// Fill up to `size` bytes, stopping early only at end of input.
fn read_chunk<R: Read + ?Sized>(reader: &mut R, size: usize) -> Result<Vec<u8>, ApiError> {
    let mut buf = vec![0; size];
    let mut filled = 0;
    while filled < size {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
