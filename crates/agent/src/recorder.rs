use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use leadgate_core::domain::record::LeadRecord;
use leadgate_db::LeadLog;

/// Fire-and-forget writer in front of the lead log. Writes never block or
/// fail the response path; errors and timeouts are logged and dropped.
pub struct LeadRecorder {
    log: Arc<dyn LeadLog>,
    write_timeout: Duration,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl LeadRecorder {
    pub fn new(log: Arc<dyn LeadLog>, write_timeout: Duration) -> Self {
        Self { log, write_timeout, in_flight: Mutex::new(Vec::new()) }
    }

    pub fn backend(&self) -> &'static str {
        self.log.backend()
    }

    pub fn log(&self) -> Arc<dyn LeadLog> {
        self.log.clone()
    }

    /// Must be called from within a tokio runtime.
    pub fn record(&self, record: LeadRecord) {
        let log = self.log.clone();
        let write_timeout = self.write_timeout;

        let handle = tokio::spawn(async move {
            let correlation_id = record.correlation_id.clone();
            let tag = record.tag;
            match tokio::time::timeout(write_timeout, log.append(record)).await {
                Ok(Ok(())) => debug!(
                    event_name = "lead_log.append.completed",
                    correlation_id = %correlation_id,
                    tag = %tag,
                    "lead record persisted"
                ),
                Ok(Err(error)) => warn!(
                    event_name = "lead_log.append.failed",
                    correlation_id = %correlation_id,
                    tag = %tag,
                    error = %error,
                    "lead record write failed"
                ),
                Err(_) => warn!(
                    event_name = "lead_log.append.timed_out",
                    correlation_id = %correlation_id,
                    tag = %tag,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "lead record write timed out"
                ),
            }
        });

        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(handle);
    }

    /// Waits for outstanding writes, up to `within`. Returns how many were
    /// still pending when draining started.
    pub async fn drain(&self, within: Duration) -> usize {
        let pending = {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *in_flight)
        };
        let count = pending.iter().filter(|handle| !handle.is_finished()).count();

        let wait_all = async {
            for handle in pending {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(within, wait_all).await.is_err() {
            warn!(
                event_name = "lead_log.drain.timed_out",
                pending = count,
                "lead log drain timed out; some writes may be lost"
            );
        }
        count
    }
}
