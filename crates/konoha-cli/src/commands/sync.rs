use konoha_core::SyncReport;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, open_engine, CliContext, ConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(context: &CliContext) -> Result<(), CliError> {
    let (engine, remote) = open_engine(context).await?;
    let report = engine.sync_now().await?;
    print_sync_report(&report);
    remote.persist()?;
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let (engine, _remote) = open_engine(context).await?;
    let conflicts = engine.conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No check-in conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: {} committed, {} conflict(s), {} deferred",
        report.committed,
        report.conflicts.len(),
        report.deferred
    )];
    lines.extend(format_conflict_lines(&report.conflicts));
    lines
}

pub fn print_sync_report(report: &SyncReport) {
    for line in format_sync_report(report) {
        println!("{line}");
    }
}
