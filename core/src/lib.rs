//! Synchronous client for SharePoint document libraries.
//!
//! # Overview
//! Folder and file operations (create, delete, copy, move, list, upload,
//! download, metadata) against the SharePoint REST API, for hosted tenants
//! (`CloudClient`) and on-premise farms (`OnPremiseClient`). Both implement
//! `DocumentStore`; `connect` picks one from a `StoreConfig`.
//!
//! # Design
//! - Requests are built as plain `HttpRequest` data by `SiteRequests` and
//!   executed by a `Transport` (`UreqTransport` by default), so request
//!   construction is testable without a network and callers can inject
//!   their own transport.
//! - Responses are verbose OData envelopes; `odata` unwraps them and treats
//!   a missing envelope as an empty result.
//! - The on-premise client owns a `DigestCache` and refreshes the request
//!   digest before any POST/PUT once it has expired.
//! - Boolean operations report `false` for any status other than 200.
//!   Read operations return `ApiError::HttpError` with the serialized
//!   response for non-2xx statuses.
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod cloud;
pub mod config;
pub mod digest;
pub mod error;
pub mod http;
pub mod odata;
pub mod on_premise;
pub mod path;
pub mod requests;
pub mod store;
pub mod transport;
pub mod types;
pub mod upload;

pub use cloud::CloudClient;
pub use config::{CloudConfig, OnPremiseConfig, StoreConfig};
pub use digest::{DigestCache, DigestState, RequestDigest};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use on_premise::OnPremiseClient;
pub use path::normalize_path;
pub use requests::SiteRequests;
pub use store::{connect, connect_with_transport, DocumentStore};
pub use transport::{Transport, UreqTransport};
pub use types::{Metadata, ResourceKind};
pub use upload::{UploadSession, DEFAULT_CHUNK_SIZE};
