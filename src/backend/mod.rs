//! Secret-management backend boundary.
//!
//! The reconciler only ever issues three operations against the backend:
//! read a document, replace a document, delete a document. Paths are the
//! backend's logical paths (e.g. `auth/cert/certs/team5-app1-production`),
//! documents are JSON objects.
//!
//! Two implementations ship with the crate:
//!
//! - [`HttpBackend`] talks to a Vault server over its HTTP API.
//! - [`InMemoryBackend`] keeps documents in a `DashMap`; used by tests and
//!   dry runs.
//!
//! Every request made through [`HttpBackend`] carries the configured timeout;
//! there is no retry at this layer.

mod http;
mod memory;

pub use self::http::HttpBackend;
pub use self::memory::InMemoryBackend;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::Result;

/// A JSON object as exchanged with the backend.
pub type Document = Map<String, Value>;

/// Request/response document store.
///
/// Implementations must be `Send + Sync` because a single engine may be
/// shared across tasks.
#[async_trait]
pub trait SecretBackend: Send + Sync + 'static {
    /// Fetch the document at `path`.
    ///
    /// Returns `Ok(None)` when nothing exists at `path`.
    async fn read(&self, path: &str) -> Result<Option<Document>>;

    /// Replace the document at `path`.
    async fn write(&self, path: &str, document: &Document) -> Result<()>;

    /// Delete the document at `path`. Deleting an absent path succeeds.
    async fn delete(&self, path: &str) -> Result<()>;
}
