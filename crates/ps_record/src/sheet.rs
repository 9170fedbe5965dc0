use alloc::string::String;
use alloc::sync::Arc;

use hashbrown::HashMap;
use thiserror::Error;

use crate::Value;

// -----------------------------------------------------------------------------
// PropertySheet

/// A string-keyed map of [`Value`]s with read-through parent chaining.
///
/// A sheet only stores the entries set on it; a lookup that misses locally
/// falls through to the parent chain, and a local entry shadows a parent
/// entry with the same key. This is the carrier for per-call *hints*
/// throughout the framework: strategies, writers, and readers receive a
/// sheet and may interpret its entries freely or ignore them.
///
/// Sheets can be frozen. A frozen sheet rejects every mutation, which makes
/// it safe to share one configuration sheet across many calls.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ps_record::{PropertySheet, Value};
///
/// let mut base = PropertySheet::new();
/// base.set("encoding", "utf-8").unwrap();
/// base.freeze();
///
/// let mut local = PropertySheet::with_parent(Arc::new(base));
/// local.set("strict", true).unwrap();
///
/// assert_eq!(local.get("strict"), Some(&Value::Bool(true)));
/// assert_eq!(local.get("encoding"), Some(&Value::Text("utf-8".into())));
/// assert_eq!(local.get("missing"), None);
/// ```
#[derive(Clone, Debug, Default)]
pub struct PropertySheet {
    parent: Option<Arc<PropertySheet>>,
    entries: HashMap<String, Value>,
    frozen: bool,
}

impl PropertySheet {
    /// Creates an empty sheet with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty sheet chained over the given parent.
    pub fn with_parent(parent: Arc<PropertySheet>) -> Self {
        Self {
            parent: Some(parent),
            entries: HashMap::new(),
            frozen: false,
        }
    }

    /// Looks up a key, falling through to the parent chain on a local miss.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut sheet = self;
        loop {
            if let Some(value) = sheet.entries.get(key) {
                return Some(value);
            }
            match &sheet.parent {
                Some(parent) => sheet = parent.as_ref(),
                None => return None,
            }
        }
    }

    /// Looks up a key, returning `default` if the whole chain misses.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Sets a local entry, shadowing any parent entry with the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), SheetError> {
        if self.frozen {
            return Err(SheetError::Frozen);
        }
        let key = key.into();
        if key.is_empty() {
            return Err(SheetError::EmptyKey);
        }
        self.entries.insert(key, value.into());
        Ok(())
    }

    /// Removes a local entry, returning its value.
    ///
    /// Parent entries are never removed through a child sheet.
    pub fn clear_key(&mut self, key: &str) -> Result<Option<Value>, SheetError> {
        if self.frozen {
            return Err(SheetError::Frozen);
        }
        Ok(self.entries.remove(key))
    }

    /// Merges the local entries of `other` into this sheet.
    ///
    /// Entries from `other` win on key collisions. `other`'s parent chain is
    /// not merged.
    pub fn merge(&mut self, other: &PropertySheet) -> Result<(), SheetError> {
        if self.frozen {
            return Err(SheetError::Frozen);
        }
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    /// Makes the sheet permanently immutable.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns `true` if the sheet has been frozen.
    #[inline]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns `true` if a key resolves anywhere in the chain.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of local entries, excluding the parent chain.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the sheet has no local entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// -----------------------------------------------------------------------------
// SheetError

/// A rejected property sheet mutation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SheetError {
    #[error("the property sheet is frozen")]
    Frozen,

    #[error("property sheet keys must not be empty")]
    EmptyKey,
}

// -----------------------------------------------------------------------------
// Tests
