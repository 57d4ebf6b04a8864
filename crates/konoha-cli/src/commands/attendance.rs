use crate::commands::common::{
    attendance_to_item, format_attendance_lines, open_engine, parse_event_id, CliContext,
};
use crate::error::CliError;

pub async fn run_attendance(
    event: &str,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let event_id = parse_event_id(event)?;
    let (engine, _remote) = open_engine(context).await?;
    let summary = engine.attendance(&event_id).await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&attendance_to_item(&summary))?
        );
        return Ok(());
    }

    for line in format_attendance_lines(&summary) {
        println!("{line}");
    }
    Ok(())
}
