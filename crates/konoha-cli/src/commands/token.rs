use konoha_core::token::{decode_fields, TokenSigner};
use serde::Serialize;

use crate::commands::common::{
    format_timestamp, load_config, parse_attendee_id, parse_event_id, CliContext,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct TokenInspection {
    pub event_id: String,
    pub attendee_id: String,
    pub issued_at: i64,
    pub issued_at_iso: String,
    pub signature_valid: bool,
}

fn signer(context: &CliContext) -> Result<TokenSigner, CliError> {
    let config = load_config(context.config_path.as_deref())?;
    Ok(TokenSigner::new(config.signing_key.as_bytes())?)
}

pub fn run_token_issue(
    event: &str,
    attendee: &str,
    issued_at: Option<i64>,
    context: &CliContext,
) -> Result<(), CliError> {
    let payload = issue_payload(&signer(context)?, event, attendee, issued_at)?;
    println!("{payload}");
    Ok(())
}

pub fn run_token_inspect(payload: &str, context: &CliContext) -> Result<(), CliError> {
    let inspection = inspect_payload(&signer(context)?, payload)?;
    println!("{}", serde_json::to_string_pretty(&inspection)?);
    Ok(())
}

pub fn issue_payload(
    signer: &TokenSigner,
    event: &str,
    attendee: &str,
    issued_at: Option<i64>,
) -> Result<String, CliError> {
    let event_id = parse_event_id(event)?;
    let attendee_id = parse_attendee_id(attendee)?;
    let issued_at = issued_at.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    Ok(signer.issue(&event_id, &attendee_id, issued_at).to_payload())
}

/// Decode a payload; a bad signature is reported, not an error
pub fn inspect_payload(signer: &TokenSigner, payload: &str) -> Result<TokenInspection, CliError> {
    let token = decode_fields(payload)?;
    let signature_valid = signer.verify(&token)?;
    Ok(TokenInspection {
        event_id: token.event_id.to_string(),
        attendee_id: token.attendee_id.to_string(),
        issued_at: token.issued_at,
        issued_at_iso: format_timestamp(token.issued_at),
        signature_valid,
    })
}
