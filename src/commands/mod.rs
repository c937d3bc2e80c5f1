//! Command implementations for doclock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command runs against a [`FileStore`] collection
//! opened from the loaded config.

mod add;
mod list;
mod release;
mod show;
mod status;

#[cfg(test)]
mod tests;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::{DocLockError, Result};
use crate::lock::{LockState, format_duration};
use crate::repository::{DynamicEntity, LockableEntity, Repository};
use crate::store::FileStore;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use std::path::Path;
use std::sync::Arc;

/// Entity type the operator commands work with.
pub type DynamicRepository = Repository<DynamicEntity>;

/// Open the repository the CLI operates on.
///
/// A missing config file means defaults; `collection` overrides the
/// configured collection.
pub fn open_repository(config_path: &Path, collection: Option<&str>) -> Result<DynamicRepository> {
    let config = Config::load_or_default(config_path)?;
    let collection = collection.unwrap_or(&config.collection);

    let store = FileStore::open(&config.store_dir, collection)?
        .with_mutex_timeout(config.store_mutex_timeout());
    tracing::debug!(store = %store.dir().display(), "opened collection");

    Ok(Repository::from_config(Arc::new(store), &config))
}

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Each command
/// is routed to its handler function.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let repository = open_repository(&cli.config, cli.collection.as_deref())?;
    run(&repository, cli.command).await
}

/// Run a command against an open repository.
pub async fn run(repository: &DynamicRepository, command: Command) -> Result<()> {
    let output = match command {
        Command::Status => status::cmd_status(repository).await?,
        Command::List(args) => list::cmd_list(repository, args).await?,
        Command::Show(args) => show::cmd_show(repository, args).await?,
        Command::Release(args) => release::cmd_release(repository, args).await?,
        Command::ReleaseAll(args) => release::cmd_release_all(repository, args).await?,
        Command::Add(args) => add::cmd_add(repository, args).await?,
    };
    print!("{}", output);
    Ok(())
}

/// Records a view yielded, plus the documents that did not decode.
struct Listing {
    records: Vec<LockableEntity<DynamicEntity>>,
    undecodable: Vec<DocLockError>,
}

impl Listing {
    /// Drain `stream`, setting aside undecodable documents. Other errors abort.
    async fn collect(
        mut stream: BoxStream<'static, Result<LockableEntity<DynamicEntity>>>,
    ) -> Result<Self> {
        let mut listing = Listing {
            records: Vec::new(),
            undecodable: Vec::new(),
        };
        while let Some(item) = stream.next().await {
            match item {
                Ok(record) => listing.records.push(record),
                Err(e @ DocLockError::Undecodable { .. }) => {
                    tracing::warn!(error = %e, "skipping undecodable entity");
                    listing.undecodable.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(listing)
    }
}

/// One-line summary of an entity's lock, as shown by `list` and `status`.
fn describe_lock(record: &LockableEntity<DynamicEntity>, now: DateTime<Utc>) -> String {
    let state = record.state_at(now);
    let Some(lock) = &record.lock else {
        return state.to_string();
    };

    match state {
        LockState::Active => format!(
            "{} by {}, {} left",
            state,
            lock.holder(),
            format_duration(&lock.expire_time.signed_duration_since(now))
        ),
        LockState::Expired => format!(
            "{} (held by {}, lapsed {} ago)",
            state,
            lock.holder(),
            format_duration(&now.signed_duration_since(lock.expire_time))
        ),
        LockState::Exception => match &lock.exception_info {
            Some(info) => format!("{} ({}: {})", state, info.kind, info.message),
            None => state.to_string(),
        },
        LockState::Unlocked => state.to_string(),
    }
}
