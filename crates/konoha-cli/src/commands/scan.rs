use std::path::Path;

use konoha_core::scan::{Frame, TextFrameDetector};
use konoha_core::ScanResult;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::common::{format_scan_result, open_engine, parse_event_id, CliContext};
use crate::commands::sync::print_sync_report;
use crate::error::CliError;

/// Counts printed after a scan run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanTally {
    pub recorded: usize,
    pub rejected: usize,
}

pub async fn run_scan(
    event: &str,
    input: Option<&Path>,
    sync_after: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let event_id = parse_event_id(event)?;
    let (engine, remote) = open_engine(context).await?;

    let (frames_tx, frames_rx) = mpsc::channel(16);
    let mut session = engine
        .start_scan_session(&event_id, TextFrameDetector, frames_rx)
        .await?;

    let feeder = match input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            tokio::spawn(feed_lines(BufReader::new(file), frames_tx))
        }
        None => tokio::spawn(feed_lines(BufReader::new(tokio::io::stdin()), frames_tx)),
    };

    let mut tally = ScanTally::default();
    while let Some(result) = session.next_result().await {
        println!("{}", format_scan_result(&result));
        match result {
            ScanResult::Recorded(_) => tally.recorded += 1,
            ScanResult::Rejected(_) => tally.rejected += 1,
            ScanResult::DecodeUnavailable(message) => {
                return Err(konoha_core::Error::DecodeUnavailable(message).into());
            }
        }
    }

    feeder
        .await
        .map_err(|error| CliError::Io(std::io::Error::other(error)))??;
    engine.stop_scan_session().await;
    println!(
        "Recorded {} check-in(s), rejected {}",
        tally.recorded, tally.rejected
    );

    if sync_after {
        let report = engine.sync_now().await?;
        print_sync_report(&report);
    }

    remote.persist()?;
    Ok(())
}

/// Forward each non-empty line as a text frame until input ends
pub async fn feed_lines<R>(reader: R, frames: mpsc::Sender<Frame>) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if frames.send(Frame::from_text(line)).await.is_err() {
            break;
        }
    }
    Ok(())
}
