use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use leadgate_core::domain::record::{LeadRecord, RecordTag};

use super::{LeadLog, RepositoryError};
use crate::DbPool;

pub struct SqlLeadLog {
    pool: DbPool,
}

impl SqlLeadLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadLog for SqlLeadLog {
    async fn append(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO lead_log (
                id, recorded_at, organization, pain_and_contact, tech_stack,
                budget_confirmed, urgency, tag, source, correlation_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.recorded_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(&record.organization)
        .bind(&record.pain_and_contact)
        .bind(&record.tech_stack)
        .bind(record.budget_label())
        .bind(&record.urgency)
        .bind(record.tag.as_str())
        .bind(&record.source)
        .bind(&record.correlation_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(
        &self,
        limit: u32,
        tag: Option<RecordTag>,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, recorded_at, organization, pain_and_contact, tech_stack,
                budget_confirmed, urgency, tag, source, correlation_id
            FROM lead_log
            WHERE (? IS NULL OR tag = ?)
            ORDER BY recorded_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(tag.map(|tag| tag.as_str()))
        .bind(tag.map(|tag| tag.as_str()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(lead_record_from_row).collect()
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

fn lead_record_from_row(row: &SqliteRow) -> Result<LeadRecord, RepositoryError> {
    let id: String = row.try_get("id")?;
    let recorded_at: String = row.try_get("recorded_at")?;
    let budget_confirmed: String = row.try_get("budget_confirmed")?;
    let tag: String = row.try_get("tag")?;

    Ok(LeadRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| RepositoryError::Decode(format!("invalid id `{id}`: {e}")))?,
        recorded_at: parse_timestamp("recorded_at", recorded_at)?,
        organization: row.try_get("organization")?,
        pain_and_contact: row.try_get("pain_and_contact")?,
        tech_stack: row.try_get("tech_stack")?,
        budget_confirmed: match budget_confirmed.as_str() {
            "yes" => true,
            "no" => false,
            other => {
                return Err(RepositoryError::Decode(format!("invalid budget_confirmed: {other}")))
            }
        },
        urgency: row.try_get("urgency")?,
        tag: tag.parse::<RecordTag>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        source: row.try_get("source")?,
        correlation_id: row.try_get("correlation_id")?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}

#[cfg(test)]
mod tests {
    use leadgate_core::domain::lead::{LeadMemory, Urgency};
    use leadgate_core::domain::record::{LeadRecord, RecordTag};

    use super::SqlLeadLog;
    use crate::repositories::{LeadLog, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn qualified_memory() -> LeadMemory {
        LeadMemory {
            organization: Some("Logística del Norte".to_string()),
            pain: Some("inventarios perdidos".to_string()),
            contact: Some("email: ana@norte.mx".to_string()),
            urgency: Some(Urgency::High),
            budget_confirmed: Some(true),
            ..LeadMemory::default()
        }
    }

    #[tokio::test]
    async fn appended_record_round_trips_through_sqlite() {
        let log = SqlLeadLog::new(setup_pool().await);
        let record = LeadRecord::from_memory(&qualified_memory(), RecordTag::Qualified, "req-1");

        log.append(record.clone()).await.expect("append");
        let stored = log.recent(10, None).await.expect("recent");

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, record.id);
        assert_eq!(stored[0].organization, "Logística del Norte");
        assert_eq!(stored[0].pain_and_contact, "inventarios perdidos | email: ana@norte.mx");
        assert!(stored[0].budget_confirmed);
        assert_eq!(stored[0].tag, RecordTag::Qualified);
        assert_eq!(stored[0].correlation_id, "req-1");
        assert_eq!(log.backend(), "sqlite");
    }

    #[tokio::test]
    async fn recent_filters_by_tag_and_orders_newest_first() {
        let log = SqlLeadLog::new(setup_pool().await);
        let memory = LeadMemory::default();

        for (tag, correlation) in [
            (RecordTag::RescuedContact, "req-a"),
            (RecordTag::SystemFailure, "req-b"),
            (RecordTag::RescuedContact, "req-c"),
        ] {
            log.append(LeadRecord::from_memory(&memory, tag, correlation))
                .await
                .expect("append");
        }

        let rescued = log.recent(10, Some(RecordTag::RescuedContact)).await.expect("recent");
        assert_eq!(rescued.len(), 2);
        assert_eq!(rescued[0].correlation_id, "req-c");
        assert_eq!(rescued[1].correlation_id, "req-a");

        let limited = log.recent(1, None).await.expect("recent");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn append_without_schema_surfaces_database_error() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        let log = SqlLeadLog::new(pool);

        let result = log
            .append(LeadRecord::from_memory(&LeadMemory::default(), RecordTag::Qualified, "r"))
            .await;

        assert!(matches!(result, Err(RepositoryError::Database(_))));
    }
}
