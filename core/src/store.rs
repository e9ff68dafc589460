//! The document store capability shared by the cloud and on-premise clients.

use std::io::Read;
use std::sync::Arc;

use serde_json::Value;

use crate::cloud::CloudClient;
use crate::config::StoreConfig;
use crate::error::ApiError;
use crate::on_premise::OnPremiseClient;
use crate::transport::Transport;
use crate::types::{Metadata, ResourceKind};
use crate::upload::DEFAULT_CHUNK_SIZE;

/// Folder and file operations against one document library.
///
/// Paths are logical and relative to the library root; they are
/// normalised before use. Operations that change server state take
/// `&mut self`, since the on-premise client refreshes its request digest
/// in place. Boolean results mean "the server answered 200"; any other
/// status yields `false` rather than an error.
pub trait DocumentStore {
    fn create_folder(&mut self, path: &str) -> Result<bool, ApiError>;

    /// Deleting a folder removes its contents too.
    fn delete(&mut self, path: &str) -> Result<bool, ApiError>;

    fn get_metadata(&self, path: &str, kind: ResourceKind) -> Result<Metadata, ApiError>;

    /// Direct subfolders of `path`. `recursive` is accepted for interface
    /// compatibility and currently has no effect.
    fn list_folder(&self, path: &str, recursive: bool) -> Result<Vec<Value>, ApiError>;

    /// Copy, overwriting the destination.
    fn copy(&mut self, from: &str, to: &str, kind: ResourceKind) -> Result<bool, ApiError>;

    fn move_item(&mut self, from: &str, to: &str, kind: ResourceKind) -> Result<bool, ApiError>;

    /// Create or overwrite a file, returning its metadata.
    fn upload(&mut self, path: &str, contents: Vec<u8>) -> Result<Metadata, ApiError>;

    /// Like `upload`, streaming `reader` through an upload session when it
    /// is larger than `chunk_size`.
    fn upload_chunked(
        &mut self,
        path: &str,
        reader: &mut dyn Read,
        chunk_size: usize,
    ) -> Result<Metadata, ApiError>;

    /// `upload_chunked` with `DEFAULT_CHUNK_SIZE`.
    fn upload_reader(&mut self, path: &str, reader: &mut dyn Read) -> Result<Metadata, ApiError> {
        self.upload_chunked(path, reader, DEFAULT_CHUNK_SIZE)
    }

    fn download(&self, path: &str) -> Result<Box<dyn Read + Send>, ApiError>;
}

/// Build the client a configuration asks for, talking over `ureq`.
pub fn connect(config: StoreConfig) -> Result<Box<dyn DocumentStore>, ApiError> {
    config.validate()?;
    Ok(match config {
        StoreConfig::Cloud(config) => Box::new(CloudClient::new(config)?),
        StoreConfig::OnPremise(config) => Box::new(OnPremiseClient::new(config)?),
    })
}

/// Like `connect`, with a caller-supplied transport.
pub fn connect_with_transport(
    config: StoreConfig,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn DocumentStore>, ApiError> {
    config.validate()?;
    Ok(match config {
        StoreConfig::Cloud(config) => Box::new(CloudClient::with_transport(config, transport)?),
        StoreConfig::OnPremise(config) => {
            Box::new(OnPremiseClient::with_transport(config, transport)?)
        }
    })
}
