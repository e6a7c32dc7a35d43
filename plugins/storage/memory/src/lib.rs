use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use stag_api::{DocumentStore, StagError};

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_documents() -> usize {
    1_000_000
}

#[derive(Debug, serde::Deserialize)]
pub struct MemoryStoreConfig {
    /// Лимит документов на коллекцию. Put сверх лимита (новый ключ) → ошибка store.
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_documents: default_max_documents(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

/// In-memory document store: collection → key → JSON document.
/// Для тестов и инсталляций без внешней БД; при рестарте всё теряется.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
    max_documents: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            max_documents: config.max_documents,
        }
    }

    /// Число документов в коллекции.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }
}

impl MemoryStore {
    async fn write(
        &self,
        collection: String,
        key: String,
        document: serde_json::Value,
        overwrite: bool,
    ) -> Result<(), StagError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.clone()).or_default();
        if docs.contains_key(&key) {
            if !overwrite {
                return Err(StagError::Conflict(format!("{collection}/{key}")));
            }
        } else if docs.len() >= self.max_documents {
            tracing::warn!(%collection, limit = self.max_documents, "memory store is full");
            return Err(StagError::TransientStore(format!(
                "collection '{collection}' reached {} documents",
                self.max_documents
            )));
        }
        docs.insert(key, document);
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn put(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), StagError>> + Send + '_>> {
        Box::pin(self.write(collection.to_string(), key.to_string(), document, true))
    }

    fn insert(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), StagError>> + Send + '_>> {
        Box::pin(self.write(collection.to_string(), key.to_string(), document, false))
    }

    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, StagError>> + Send + '_>> {
        let collection = collection.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let guard = self.collections.read().await;
            guard
                .get(&collection)
                .and_then(|docs| docs.get(&key))
                .cloned()
                .ok_or_else(|| StagError::NotFound(format!("{collection}/{key}")))
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
