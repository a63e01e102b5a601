//! In-memory document store backend.
//!
//! The production deployment fronts a hosted document store; tests and the
//! sandbox run against this map-backed implementation. Both sit behind the
//! same [`UserDocumentStore`](super::UserDocumentStore) seam.

use super::{StoreFuture, UserDocumentStore};
use crate::records::UserDoc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Map-of-maps backend: collection name → phone → document.
#[derive(Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, HashMap<String, UserDoc>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserDocumentStore for MemoryStore {
    fn get(&self, collection: &str, phone: &str) -> StoreFuture<'_, Option<UserDoc>> {
        let collection = collection.to_string();
        let phone = phone.to_string();
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let guard = collections.read().await;
            Ok(guard
                .get(&collection)
                .and_then(|docs| docs.get(&phone))
                .cloned())
        })
    }

    fn put(&self, collection: &str, phone: &str, doc: UserDoc) -> StoreFuture<'_, ()> {
        let collection = collection.to_string();
        let phone = phone.to_string();
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let mut guard = collections.write().await;
            guard.entry(collection).or_default().insert(phone, doc);
            Ok(())
        })
    }

    fn delete(&self, collection: &str, phone: &str) -> StoreFuture<'_, ()> {
        let collection = collection.to_string();
        let phone = phone.to_string();
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let mut guard = collections.write().await;
            if let Some(docs) = guard.get_mut(&collection) {
                docs.remove(&phone);
            }
            Ok(())
        })
    }

    fn list(&self, collection: &str) -> StoreFuture<'_, Vec<(String, UserDoc)>> {
        let collection = collection.to_string();
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let guard = collections.read().await;
            Ok(guard
                .get(&collection)
                .map(|docs| {
                    docs.iter()
                        .map(|(phone, doc)| (phone.clone(), doc.clone()))
                        .collect()
                })
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = MemoryStore::new();
        let doc = UserDoc::new(Utc::now());

        store.put("users", "9725", doc).await.unwrap();
        assert!(store.get("users", "9725").await.unwrap().is_some());
        // Collections do not bleed into each other.
        assert!(store.get("test_users", "9725").await.unwrap().is_none());

        store.delete("users", "9725").await.unwrap();
        assert!(store.get("users", "9725").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_enumerates_collection() {
        let store = MemoryStore::new();
        store
            .put("users", "a", UserDoc::new(Utc::now()))
            .await
            .unwrap();
        store
            .put("users", "b", UserDoc::new(Utc::now()))
            .await
            .unwrap();

        let mut phones: Vec<String> = store
            .list("users")
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        phones.sort();
        assert_eq!(phones, ["a", "b"]);
        assert!(store.list("empty").await.unwrap().is_empty());
    }
}
