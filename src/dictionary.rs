//! Dictionary encoding for field names and string values.
//!
//! Both dictionaries are bijections between a normalized string and a dense
//! integer ID, contiguous from 0. IDs are stable for the lifetime of a model;
//! dictionaries are populated during compilation and frozen when the model is
//! built. Numeric and boolean attribute values are never interned.
//!
//! ## Normalization
//!
//! Field names are normalized to UPPER_SNAKE_CASE: hyphens become
//! underscores, all characters are upper-cased, and nested map keys are
//! joined with `.` in traversal order. String values are folded to upper
//! case before lookup so equality comparison is case-insensitive.

use std::collections::HashMap;
use std::sync::Arc;

/// Sentinel returned by [`Dictionary::lookup`] misses via `Option`; kept as
/// a named constant for the few call sites that store raw ids.
pub const NO_ID: u32 = u32::MAX;

/// A bijection between strings and dense IDs.
///
/// Lookup never fails: a missing entry returns `None` rather than an error,
/// and re-interning an existing string is idempotent.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    index: HashMap<Arc<str>, u32>,
    entries: Vec<Arc<str>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Intern a string, returning its existing ID if present or assigning
    /// the next sequential ID (0-based).
    pub fn encode(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.entries.len() as u32;
        let entry: Arc<str> = Arc::from(name);
        self.entries.push(Arc::clone(&entry));
        self.index.insert(entry, id);
        id
    }

    /// Look up an ID without interning.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Reverse lookup.
    pub fn decode(&self, id: u32) -> Option<&str> {
        self.entries.get(id as usize).map(|s| s.as_ref())
    }

    /// Number of interned entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalize a field path to UPPER_SNAKE_CASE with `.` separators.
///
/// `-` becomes `_`, every character is upper-cased, and `.` is preserved as
/// the nesting separator. The function is a fixed point: normalizing an
/// already-normalized name returns it unchanged.
pub fn normalize_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '-' => out.push('_'),
            c => out.extend(c.to_uppercase()),
        }
    }
    out
}

/// Fold a string value to its canonical (upper) case for dictionary lookup.
pub fn fold_value(value: &str) -> String {
    value.to_uppercase()
}
