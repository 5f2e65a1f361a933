use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use reviewlens_common::{AnalysisStatus, ProductKey, ProductRecord, ReviewLensError};

use super::ProductStore;

/// In-process store for tests and database-less runs.
#[derive(Default)]
pub struct MemoryProductStore {
    records: RwLock<HashMap<ProductKey, ProductRecord>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn load(&self, key: &ProductKey) -> Result<Option<ProductRecord>, ReviewLensError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn save(&self, record: &ProductRecord) -> Result<(), ReviewLensError> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        key: &ProductKey,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> Result<(), ReviewLensError> {
        let mut records = self.records.write().await;
        let record = records
            .entry(key.clone())
            .or_insert_with(|| ProductRecord::new(key.clone()));
        record.status = status;
        record.error_message = error_message.map(str::to_string);
        Ok(())
    }
}
