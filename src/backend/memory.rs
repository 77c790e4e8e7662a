//! In-memory backend.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Document, SecretBackend};
use crate::Result;

/// Backend keeping documents in a `DashMap`, keyed by path.
///
/// Documents are stored and returned verbatim. Write and delete calls are
/// counted so callers can observe whether an operation touched the store.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    documents: DashMap<String, Document>,
    writes: AtomicU64,
}

impl InMemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write and delete calls served so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Paths currently holding a document, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.documents.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}

fn key(path: &str) -> String {
    path.trim_matches('/').to_string()
}

#[async_trait]
impl SecretBackend for InMemoryBackend {
    async fn read(&self, path: &str) -> Result<Option<Document>> {
        Ok(self.documents.get(&key(path)).map(|e| e.value().clone()))
    }

    async fn write(&self, path: &str, document: &Document) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.documents.insert(key(path), document.clone());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.documents.remove(&key(path));
        Ok(())
    }
}
