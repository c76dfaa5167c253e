use anyhow::Context;
use leadgate_core::domain::record::{LeadRecord, RecordTag};
use leadgate_db::{LeadLog, SqlLeadLog};
use serde::Serialize;

use crate::commands::{open_lead_log, CommandResult};

const MAX_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
struct LeadsReport {
    command: &'static str,
    status: &'static str,
    tag: Option<RecordTag>,
    count: usize,
    records: Vec<LeadRecord>,
}

pub fn run(tag: Option<&str>, limit: u32) -> CommandResult {
    let tag = match tag.map(str::parse::<RecordTag>).transpose() {
        Ok(tag) => tag,
        Err(error) => return CommandResult::failure("leads", "invalid_tag", error.to_string(), 2),
    };
    let limit = limit.clamp(1, MAX_LIMIT);

    let (_config, runtime, pool) = match open_lead_log("leads") {
        Ok(opened) => opened,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let log = SqlLeadLog::new(pool.clone());
        let records = log.recent(limit, tag).await.context("failed to read lead log")?;
        pool.close().await;
        Ok::<_, anyhow::Error>(records)
    });

    let records = match result {
        Ok(records) => records,
        Err(error) => return CommandResult::failure("leads", "lead_log_read", format!("{error:#}"), 4),
    };

    let report = LeadsReport { command: "leads", status: "ok", tag, count: records.len(), records };
    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("leads", "serialization", error.to_string(), 6),
    }
}
