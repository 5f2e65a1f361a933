pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use reviewlens_common::{AnalysisStatus, ProductKey, ProductRecord, ReviewLensError};

pub use memory::MemoryProductStore;
pub use postgres::PgProductStore;

/// Durable home of product records. Writes are last-writer-wins per key.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn load(&self, key: &ProductKey) -> Result<Option<ProductRecord>, ReviewLensError>;

    /// Replace the whole record.
    async fn save(&self, record: &ProductRecord) -> Result<(), ReviewLensError>;

    /// Atomically set status and error message, leaving every other field
    /// untouched. Creates a bare record if the key is new.
    async fn update_status(
        &self,
        key: &ProductKey,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> Result<(), ReviewLensError>;
}
