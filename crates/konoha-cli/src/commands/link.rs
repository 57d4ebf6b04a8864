use konoha_core::token::event_link;

use crate::commands::common::parse_event_id;
use crate::error::CliError;

pub fn run_link(event_id: &str) -> Result<(), CliError> {
    println!("{}", render_link(event_id)?);
    Ok(())
}

pub fn render_link(event_id: &str) -> Result<String, CliError> {
    Ok(event_link(&parse_event_id(event_id)?))
}
