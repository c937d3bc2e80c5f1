//! Implementation of the `doclock release` and `doclock release-all` commands.

use super::DynamicRepository;
use crate::cli::{ReleaseAllArgs, ReleaseArgs};
use crate::error::{DocLockError, Result};
use crate::lock::ReleaseMode;
use crate::store::document_state;
use chrono::Utc;

/// Execute the `doclock release` command.
///
/// Fails if the entity does not exist; an entity without a matching lock is
/// reported but is not an error. The document is read raw, so a malformed
/// lock can still be cleared.
pub async fn cmd_release(repository: &DynamicRepository, args: ReleaseArgs) -> Result<String> {
    let mode = ReleaseMode::from(args.mode);
    let Some(document) = repository.store().find_one(&args.id).await? else {
        return Err(DocLockError::UserError(format!(
            "entity '{}' not found.",
            args.id
        )));
    };
    let state = document_state(&document, Utc::now());

    if repository.release_one(&args.id, mode).await? {
        Ok(format!(
            "Released lock on '{}' (was {}).\n",
            args.id,
            state
        ))
    } else {
        Ok(format!(
            "No lock on '{}' matches mode '{}' (state: {}).\n",
            args.id,
            mode,
            state
        ))
    }
}

/// Execute the `doclock release-all` command.
pub async fn cmd_release_all(
    repository: &DynamicRepository,
    args: ReleaseAllArgs,
) -> Result<String> {
    let mode = ReleaseMode::from(args.mode);
    let released = repository.release_all(mode).await?;
    Ok(format!(
        "Released {} lock(s) with mode '{}'.\n",
        released, mode
    ))
}
