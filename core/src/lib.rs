//! Synchronous WebDAV client core.
//!
//! # Overview
//! Builds protocol-correct requests for the WebDAV verbs (PROPFIND, MKCOL,
//! PUT, DELETE, COPY, MOVE, LOCK, UNLOCK, OPTIONS, HEAD, PROPPATCH, GET) and
//! executes them, returning the status line, headers and drained body.
//!
//! # Design
//! - `WebDavClient` holds read-only configuration only; credentials are
//!   injected at construction through a `CredentialProvider`.
//! - Each verb has a pure `build_*` method producing a `DavRequest` and an
//!   executing method that sends it through the `Executor`.
//! - Failures come back as `DavError`: an error-class status keeps the whole
//!   response, transport failures carry the underlying cause.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod http;

pub use client::{WebDavClient, LOCK_TIMEOUT};
pub use crate::config::{load_settings, ClientConfig, Settings};
pub use credentials::{AuthScheme, CredentialCache, CredentialProvider, Credentials, StaticCredentials};
pub use error::{DavError, TransportError};
pub use executor::Executor;
pub use crate::http::{CachePolicy, DavMethod, DavRequest, DavResponse, XML_CONTENT_TYPE};
