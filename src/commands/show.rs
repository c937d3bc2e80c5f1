//! Implementation of the `doclock show` command.
//!
//! Displays the stored document of a specific entity and its lock state.

use super::{DynamicRepository, describe_lock};
use crate::cli::ShowArgs;
use crate::error::{DocLockError, Result};
use chrono::Utc;
use std::fmt::Write;

/// Execute the `doclock show` command.
pub async fn cmd_show(repository: &DynamicRepository, args: ShowArgs) -> Result<String> {
    let record = repository.get_one(&args.id).await?.ok_or_else(|| {
        DocLockError::UserError(format!(
            "entity '{}' not found.\n\n\
             Use `doclock list` to see all entities.",
            args.id
        ))
    })?;

    let now = Utc::now();
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", record.id, record.state_at(now));
    let _ = writeln!(out, "Lock:        {}", describe_lock(&record, now));

    if let Some(lock) = &record.lock {
        let _ = writeln!(out, "Lock key:    {}", lock.lock_key);
        let _ = writeln!(
            out,
            "Locked at:   {}",
            lock.lock_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "Expires at:  {}",
            lock.expire_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(trace) = lock
            .exception_info
            .as_ref()
            .and_then(|info| info.stack_trace.as_deref())
        {
            let _ = writeln!(out, "Trace:");
            for line in trace.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
    }
    let _ = writeln!(out, "Unlocks:     {}", record.unlock_counter);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", serde_json::to_string_pretty(&record.entity)?);
    Ok(out)
}
