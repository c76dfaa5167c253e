use async_trait::async_trait;
use thiserror::Error;

use leadgate_core::domain::record::{LeadRecord, RecordTag};

pub mod lead_log;
pub mod memory;

pub use lead_log::SqlLeadLog;
pub use memory::{InMemoryLeadLog, NoopLeadLog};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Append-only store of lead records. There is no update or delete.
#[async_trait]
pub trait LeadLog: Send + Sync {
    async fn append(&self, record: LeadRecord) -> Result<(), RepositoryError>;

    /// Newest first, optionally filtered by tag.
    async fn recent(
        &self,
        limit: u32,
        tag: Option<RecordTag>,
    ) -> Result<Vec<LeadRecord>, RepositoryError>;

    /// Short backend label reported by health and doctor checks.
    fn backend(&self) -> &'static str;
}
