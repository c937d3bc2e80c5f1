//! Implementation of the `doclock list` command.

use super::{DynamicRepository, Listing, describe_lock};
use crate::cli::ListArgs;
use crate::error::Result;
use chrono::Utc;
use std::fmt::Write;

/// Execute the `doclock list` command.
///
/// Documents that fail to decode are reported after the listing so an
/// operator can still find and release them.
pub async fn cmd_list(repository: &DynamicRepository, args: ListArgs) -> Result<String> {
    let stream = match args.state {
        None => repository.stream_all(),
        Some(state) => repository.get_by_state(state.states()),
    };
    let Listing {
        records,
        undecodable,
    } = Listing::collect(stream).await?;

    let mut out = String::new();
    if records.is_empty() && undecodable.is_empty() {
        let _ = writeln!(out, "No entities found.");
        return Ok(out);
    }

    let now = Utc::now();
    let width = records.iter().map(|r| r.id.len()).max().unwrap_or(0);
    for record in &records {
        let _ = writeln!(
            out,
            "{:width$}  {}",
            record.id,
            describe_lock(record, now),
            width = width
        );
    }

    if !undecodable.is_empty() {
        if !records.is_empty() {
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "{} entity(s) could not be decoded:", undecodable.len());
        for error in &undecodable {
            let _ = writeln!(out, "  - {}", error);
        }
    }
    Ok(out)
}
