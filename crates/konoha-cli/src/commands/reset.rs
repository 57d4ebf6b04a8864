use crate::commands::common::{open_engine, parse_event_id, CliContext};
use crate::error::CliError;

pub async fn run_reset(event: &str, confirmed: bool, context: &CliContext) -> Result<(), CliError> {
    let event_id = parse_event_id(event)?;
    if !confirmed {
        return Err(CliError::ConfirmationRequired(event_id.to_string()));
    }

    let (engine, remote) = open_engine(context).await?;
    let removed = engine.reset_event(&event_id).await?;
    remote.persist()?;
    println!("Reset {event_id}: removed {removed} remote check-in(s)");
    Ok(())
}
