use crate::commands::{open_lead_log, CommandResult};
use leadgate_db::migrations;

pub fn run() -> CommandResult {
    let (_config, runtime, pool) = match open_lead_log("migrate") {
        Ok(opened) => opened,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let outcome = migrations::run_pending(&pool).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("applied pending migrations ({} known)", migrations::known_migrations()),
        ),
        Err(error) => CommandResult::failure("migrate", "migration", error.to_string(), 5),
    }
}
