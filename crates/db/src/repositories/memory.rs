use async_trait::async_trait;
use tokio::sync::RwLock;

use leadgate_core::domain::record::{LeadRecord, RecordTag};

use super::{LeadLog, RepositoryError};

#[derive(Default)]
pub struct InMemoryLeadLog {
    records: RwLock<Vec<LeadRecord>>,
}

impl InMemoryLeadLog {
    pub async fn records(&self) -> Vec<LeadRecord> {
        self.records.read().await.clone()
    }

    pub async fn count_tagged(&self, tag: RecordTag) -> usize {
        self.records.read().await.iter().filter(|record| record.tag == tag).count()
    }
}

#[async_trait]
impl LeadLog for InMemoryLeadLog {
    async fn append(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn recent(
        &self,
        limit: u32,
        tag: Option<RecordTag>,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|record| tag.map_or(true, |tag| record.tag == tag))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Stand-in when no lead log is configured: writes succeed silently.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLeadLog;

#[async_trait]
impl LeadLog for NoopLeadLog {
    async fn append(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        tracing::debug!(
            event_name = "lead_log.append.skipped",
            correlation_id = %record.correlation_id,
            tag = %record.tag,
            "lead log disabled; record dropped"
        );
        Ok(())
    }

    async fn recent(
        &self,
        _limit: u32,
        _tag: Option<RecordTag>,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        Ok(Vec::new())
    }

    fn backend(&self) -> &'static str {
        "disabled"
    }
}
