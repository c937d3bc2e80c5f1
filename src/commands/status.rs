//! Implementation of the `doclock status` command.
//!
//! Displays entity counts per lock state and highlights exception holds,
//! which never lapse on their own.

use super::{DynamicRepository, Listing, describe_lock};
use crate::error::Result;
use crate::lock::LockedMode;
use crate::repository::LockStateCounts;
use chrono::Utc;
use std::fmt::Write;

/// Execute the `doclock status` command.
///
/// Displays:
/// - Entity counts per lock state
/// - Entities held with exception info
/// - Entities whose unlock counter reached the warning threshold
/// - Documents that do not decode
pub async fn cmd_status(repository: &DynamicRepository) -> Result<String> {
    let counts = repository.count_by_state().await?;
    let exceptions = Listing::collect(repository.get_locked(LockedMode::Exception))
        .await?
        .records;
    let threshold = repository.settings().unlock_warn_threshold;
    let all = Listing::collect(repository.stream_all()).await?;
    let chronic: Vec<_> = all
        .records
        .iter()
        .filter(|record| record.unlock_counter >= threshold)
        .collect();

    let now = Utc::now();
    let mut out = render_counts(&counts);

    let mut issues: Vec<String> = Vec::new();
    if !exceptions.is_empty() {
        issues.push(format!(
            "{} entity(s) held with exception info:",
            exceptions.len()
        ));
        for record in &exceptions {
            issues.push(format!("  - {} [{}]", record.id, describe_lock(record, now)));
        }
    }
    if !chronic.is_empty() {
        issues.push(format!(
            "{} entity(s) force-unlocked {} or more times:",
            chronic.len(),
            threshold
        ));
        for record in &chronic {
            issues.push(format!("  - {} ({} unlocks)", record.id, record.unlock_counter));
        }
    }
    if !all.undecodable.is_empty() {
        issues.push(format!(
            "{} entity(s) could not be decoded:",
            all.undecodable.len()
        ));
        for error in &all.undecodable {
            issues.push(format!("  - {}", error));
        }
    }

    let _ = writeln!(out);
    if issues.is_empty() {
        let _ = writeln!(out, "No issues detected.");
    } else {
        let _ = writeln!(out, "Issues:");
        for issue in issues {
            let _ = writeln!(out, "{}", issue);
        }
    }
    Ok(out)
}

fn render_counts(counts: &LockStateCounts) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Lock Status");
    let _ = writeln!(out, "===========");
    let _ = writeln!(out);
    for (label, count) in [
        ("unlocked", counts.unlocked),
        ("active", counts.active),
        ("expired", counts.expired),
        ("exception", counts.exception),
    ] {
        let _ = writeln!(out, "  {:10} {:>4}", label, count);
    }
    let _ = writeln!(out, "  ----------");
    let _ = writeln!(out, "  {:10} {:>4}", "total", counts.total());
    out
}
