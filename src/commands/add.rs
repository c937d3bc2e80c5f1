//! Implementation of the `doclock add` command.
//!
//! Creates a new, unlocked entity from a JSON object of fields.

use super::DynamicRepository;
use crate::cli::AddArgs;
use crate::error::{DocLockError, Result};
use crate::lock::{LOCK_FIELD, UNLOCK_COUNTER_FIELD};
use crate::repository::DynamicEntity;
use crate::store::ID_FIELD;
use serde_json::Value;

/// Fields the lock protocol owns.
const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, LOCK_FIELD, UNLOCK_COUNTER_FIELD];

/// Execute the `doclock add` command.
pub async fn cmd_add(repository: &DynamicRepository, args: AddArgs) -> Result<String> {
    let fields = match serde_json::from_str::<Value>(&args.data) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => {
            return Err(DocLockError::UserError(
                "--data must be a JSON object".to_string(),
            ));
        }
        Err(e) => {
            return Err(DocLockError::UserError(format!(
                "--data is not valid JSON: {}",
                e
            )));
        }
    };

    if let Some(field) = RESERVED_FIELDS.iter().find(|f| fields.contains_key(**f)) {
        return Err(DocLockError::UserError(format!(
            "field '{}' is reserved and cannot be set with --data",
            field
        )));
    }

    let entity = DynamicEntity {
        id: args.id.clone(),
        fields,
    };
    repository.add(entity).await?;
    Ok(format!("Added entity '{}'.\n", args.id))
}
