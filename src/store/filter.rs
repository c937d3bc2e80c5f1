//! Store-side filters and updates.
//!
//! Paths are dotted field names (`lock.lock_key`). Lock-state predicates are
//! evaluated through [`classify`] at the instant carried by the filter, so the
//! store and the protocol agree on what "unlocked" means.

use super::{Document, ID_FIELD, document_lock};
use crate::error::{DocLockError, Result};
use crate::lock::{LOCK_FIELD, LockKey, LockState, classify};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Predicate over a single document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Matches the document with this id.
    Id(String),
    /// Matches when the value at `path` equals `value`.
    Eq(String, Value),
    /// Matches when a non-null value exists at `path`.
    Exists(String),
    /// Matches when the embedded lock carries this fencing token.
    LockKey(LockKey),
    /// Matches when the document's classification at `at` is one of `states`.
    LockState {
        states: Vec<LockState>,
        at: DateTime<Utc>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Filter::Id(id.into())
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(path.into(), value.into())
    }

    pub fn lock_state(states: &[LockState], at: DateTime<Utc>) -> Self {
        Filter::LockState {
            states: states.to_vec(),
            at,
        }
    }

    /// Documents an acquire may claim at `at`.
    pub fn acquirable(at: DateTime<Utc>) -> Self {
        Filter::lock_state(LockState::ACQUIRABLE, at)
    }

    /// Intersect with another filter, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut a), Filter::And(b)) => {
                a.extend(b);
                Filter::And(a)
            }
            (Filter::And(mut a), f) => {
                a.push(f);
                Filter::And(a)
            }
            (f, Filter::And(mut b)) => {
                b.insert(0, f);
                Filter::And(b)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    /// Id every match must have, when the filter pins one.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Filter::Id(id) => Some(id.as_str()),
            Filter::And(filters) => filters.iter().find_map(Filter::target_id),
            _ => None,
        }
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(id) => document.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()),
            Filter::Eq(path, value) => get_path(document, path) == Some(value),
            Filter::Exists(path) => get_path(document, path).is_some_and(|v| !v.is_null()),
            Filter::LockKey(key) => match document_lock(document) {
                Ok(Some(lock)) => lock.lock_key == *key,
                _ => false,
            },
            Filter::LockState { states, at } => states.contains(&document_state(document, *at)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(document)),
            Filter::Not(filter) => !filter.matches(document),
        }
    }
}

/// Classification of a stored document.
///
/// A lock field that cannot be decoded is reported as `Exception`: the document
/// stays held until an operator clears it.
pub fn document_state(document: &Document, at: DateTime<Utc>) -> LockState {
    match document_lock(document) {
        Ok(lock) => classify(lock.as_ref(), at),
        Err(_) => LockState::Exception,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum UpdateOp {
    Set(String, Value),
    Unset(String),
    Inc(String, i64),
}

impl UpdateOp {
    fn path(&self) -> &str {
        match self {
            UpdateOp::Set(path, _) | UpdateOp::Unset(path) | UpdateOp::Inc(path, _) => path,
        }
    }
}

/// Ordered list of field modifications applied to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value at `path`, creating intermediate objects.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(path.into(), value.into()));
        self
    }

    /// Remove the value at `path`, if present.
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(path.into()));
        self
    }

    /// Add `by` to the integer at `path`; a missing value counts as zero.
    pub fn inc(mut self, path: impl Into<String>, by: i64) -> Self {
        self.ops.push(UpdateOp::Inc(path.into(), by));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether any operation writes `field` or something beneath it.
    pub fn touches(&self, field: &str) -> bool {
        self.ops.iter().any(|op| {
            let path = op.path();
            path == field
                || path.starts_with(&format!("{}.", field))
                || field.starts_with(&format!("{}.", path))
        })
    }

    /// Apply every operation in order. The document is left untouched on error.
    pub fn apply(&self, document: &mut Document) -> Result<()> {
        if self.touches(ID_FIELD) {
            return Err(DocLockError::UserError(format!(
                "updates may not modify '{}'",
                ID_FIELD
            )));
        }

        let mut working = document.clone();
        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => set_path(&mut working, path, value.clone())?,
                UpdateOp::Unset(path) => unset_path(&mut working, path),
                UpdateOp::Inc(path, by) => {
                    let current = match get_path(&working, path) {
                        None | Some(Value::Null) => 0,
                        Some(value) => value.as_i64().ok_or_else(|| {
                            DocLockError::UserError(format!(
                                "cannot increment non-integer field '{}'",
                                path
                            ))
                        })?,
                    };
                    set_path(&mut working, path, Value::from(current + by))?;
                }
            }
        }
        *document = working;
        Ok(())
    }
}

/// Update that installs a lock record.
pub(crate) fn set_lock(lock: &crate::lock::Lock) -> Result<Update> {
    Ok(Update::new().set(LOCK_FIELD, serde_json::to_value(lock)?))
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = document.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn set_path(document: &mut Document, path: &str, value: Value) -> Result<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| DocLockError::UserError("empty update path".to_string()))?;

    let mut current = document;
    for part in parents {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().ok_or_else(|| {
            DocLockError::UserError(format!(
                "cannot set '{}': '{}' is not an object",
                path, part
            ))
        })?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn unset_path(document: &mut Document, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = document;
    for part in parents {
        match current.get_mut(*part).and_then(Value::as_object_mut) {
            Some(next) => current = next,
            None => return,
        }
    }
    current.remove(*last);
}
