//! In-memory queue store for tests and embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{QueueDocument, QueueError};
use crate::ports::QueueStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, QueueDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load(&self, queue_file: &str) -> Result<Option<QueueDocument>, QueueError> {
        Ok(self.docs.read().await.get(queue_file).cloned())
    }

    async fn save(&self, queue_file: &str, doc: &QueueDocument) -> Result<(), QueueError> {
        self.docs
            .write()
            .await
            .insert(queue_file.to_string(), doc.clone());
        Ok(())
    }
}
