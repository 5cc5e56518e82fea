// ============================
// crates/backend-lib/src/store.rs
// ============================
//! Document store abstraction with a flat-file implementation.
//!
//! The store is the only persistence boundary in the system. Every
//! mutation goes through an atomic find-and-update that returns the
//! post-update document; this is the single-document atomicity the sync
//! pipeline relies on (concurrent room writers are last-write-wins).

use async_trait::async_trait;
use smartdoor_common::DisplayDocument;
use std::collections::HashMap;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Mutator applied to a document while the store holds its write lock.
pub type Mutator = Box<dyn FnOnce(&mut DisplayDocument) + Send>;

/// Trait for display-document backends
#[async_trait]
pub trait DisplayStore: Send + Sync {
    /// Insert a new document. Fails with `Conflict` if the id exists.
    async fn insert(&self, doc: DisplayDocument) -> Result<(), AppError>;

    /// Look up a document by its room code.
    async fn find_by_room_code(&self, code: &str) -> Result<Option<DisplayDocument>, AppError>;

    /// Look up a document by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<DisplayDocument>, AppError>;

    /// Look up the document whose session set contains `code`.
    async fn find_by_session(&self, code: &str) -> Result<Option<DisplayDocument>, AppError>;

    /// Atomically mutate the document scoped by room code, returning the
    /// post-update document. `Ok(None)` when no document matches.
    async fn update_by_room_code(
        &self,
        code: &str,
        mutate: Mutator,
    ) -> Result<Option<DisplayDocument>, AppError>;

    /// Atomically mutate the document owning session `code`, returning
    /// the post-update document.
    async fn update_by_session(
        &self,
        code: &str,
        mutate: Mutator,
    ) -> Result<Option<DisplayDocument>, AppError>;
}

/// Flat-file implementation of [`DisplayStore`].
///
/// The in-process map is the authoritative copy; every mutation is
/// flushed to `<root>/displays/<id>.json` before the lock is released.
pub struct FlatFileStore {
    root: PathBuf,
    docs: RwLock<HashMap<String, DisplayDocument>>,
}

impl FlatFileStore {
    /// Open the store, loading any documents already on disk.
    pub fn open<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let dir = root.join("displays");
        fs::create_dir_all(&dir)?;

        let mut docs = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path)?;
                let doc: DisplayDocument = serde_json::from_str(&content)?;
                docs.insert(doc.id.clone(), doc);
            }
        }

        Ok(Self {
            root,
            docs: RwLock::new(docs),
        })
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.root.join("displays").join(format!("{id}.json"))
    }

    async fn flush(&self, doc: &DisplayDocument) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(self.doc_path(&doc.id), json).await?;
        Ok(())
    }

    async fn update_where<F>(&self, matches: F, mutate: Mutator) -> Result<Option<DisplayDocument>, AppError>
    where
        F: Fn(&DisplayDocument) -> bool,
    {
        let mut docs = self.docs.write().await;
        let Some(doc) = docs.values_mut().find(|doc| matches(doc)) else {
            return Ok(None);
        };
        mutate(doc);
        let updated = doc.clone();
        self.flush(&updated).await?;
        Ok(Some(updated))
    }
}

#[async_trait]
impl DisplayStore for FlatFileStore {
    async fn insert(&self, doc: DisplayDocument) -> Result<(), AppError> {
        let mut docs = self.docs.write().await;
        if docs.contains_key(&doc.id) {
            return Err(AppError::Conflict(format!("document {} exists", doc.id)));
        }
        docs.insert(doc.id.clone(), doc.clone());
        self.flush(&doc).await
    }

    async fn find_by_room_code(&self, code: &str) -> Result<Option<DisplayDocument>, AppError> {
        let docs = self.docs.read().await;
        Ok(docs.values().find(|doc| doc.room_code == code).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<DisplayDocument>, AppError> {
        let docs = self.docs.read().await;
        Ok(docs
            .values()
            .find(|doc| doc.username.as_deref() == Some(username))
            .cloned())
    }

    async fn find_by_session(&self, code: &str) -> Result<Option<DisplayDocument>, AppError> {
        let docs = self.docs.read().await;
        Ok(docs
            .values()
            .find(|doc| doc.sessions.iter().any(|s| s.code == code))
            .cloned())
    }

    async fn update_by_room_code(
        &self,
        code: &str,
        mutate: Mutator,
    ) -> Result<Option<DisplayDocument>, AppError> {
        self.update_where(|doc| doc.room_code == code, mutate).await
    }

    async fn update_by_session(
        &self,
        code: &str,
        mutate: Mutator,
    ) -> Result<Option<DisplayDocument>, AppError> {
        self.update_where(|doc| doc.sessions.iter().any(|s| s.code == code), mutate)
            .await
    }
}
