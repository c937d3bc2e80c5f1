//! CLI argument parsing for doclock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::lock::{LockState, ReleaseMode};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Doclock: operator tool for lease-locked documents.
///
/// Documents live in a directory-backed store, one JSON file per document.
/// Each document may carry an embedded lease lock:
/// - Workers acquire a lease, edit, and commit or abandon
/// - Leases lapse on their own once expired
/// - Exception holds stay until an operator releases them
#[derive(Parser, Debug)]
#[command(name = "doclock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Collection to operate on, overriding the config.
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Log protocol activity at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for doclock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show entity counts per lock state.
    ///
    /// Lists exception holds, which need an operator to release them.
    Status,

    /// List entities, optionally only those in one lock state.
    List(ListArgs),

    /// Show a single entity and its lock.
    Show(ShowArgs),

    /// Clear the lock on one entity.
    ///
    /// Bypasses the lease holder's fencing token and increments the entity's
    /// unlock counter.
    Release(ReleaseArgs),

    /// Clear the lock on every entity selected by the mode.
    ReleaseAll(ReleaseAllArgs),

    /// Add a new, unlocked entity.
    Add(AddArgs),
}

/// Lock state filter for the `list` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    /// Unlocked or expired: available to acquire.
    Unlocked,
    /// Held by an active lease.
    Locked,
    /// Lease lapsed without release.
    Expired,
    /// Held by recorded exception info.
    Exception,
}

impl StateArg {
    /// States this filter selects.
    pub fn states(self) -> &'static [LockState] {
        match self {
            StateArg::Unlocked => LockState::ACQUIRABLE,
            StateArg::Locked => &[LockState::Active],
            StateArg::Expired => &[LockState::Expired],
            StateArg::Exception => &[LockState::Exception],
        }
    }
}

/// Release mode accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Any lock.
    Any,
    /// Only exception holds.
    ExceptionOnly,
    /// Only plain leases, active or expired.
    LockOnly,
}

impl From<ModeArg> for ReleaseMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Any => ReleaseMode::Any,
            ModeArg::ExceptionOnly => ReleaseMode::ExceptionOnly,
            ModeArg::LockOnly => ReleaseMode::LockOnly,
        }
    }
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list entities in this state.
    #[arg(short, long, value_enum)]
    pub state: Option<StateArg>,
}

/// Arguments for the `show` command.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Entity id.
    pub id: String,
}

/// Arguments for the `release` command.
#[derive(Parser, Debug)]
pub struct ReleaseArgs {
    /// Entity id.
    pub id: String,

    /// Which locks may be cleared.
    #[arg(short, long, value_enum, default_value = "any")]
    pub mode: ModeArg,
}

/// Arguments for the `release-all` command.
#[derive(Parser, Debug)]
pub struct ReleaseAllArgs {
    /// Which locks may be cleared.
    #[arg(short, long, value_enum)]
    pub mode: ModeArg,
}

/// Arguments for the `add` command.
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Id of the new entity.
    pub id: String,

    /// Entity fields as a JSON object.
    #[arg(short, long, default_value = "{}")]
    pub data: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
