//! Seen set - values this node has accepted

use std::collections::HashSet;

use parking_lot::RwLock;

use ripple_core::Value;

/// Ever-growing set of accepted values
#[derive(Debug, Default)]
pub struct SeenSet {
    values: RwLock<HashSet<Value>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value`.
    ///
    /// Returns true only for the single caller that inserted it; every
    /// other caller, concurrent or later, gets false.
    pub fn accept(&self, value: Value) -> bool {
        if self.values.read().contains(&value) {
            return false;
        }
        self.values.write().insert(value)
    }

    /// Every accepted value, ascending
    pub fn snapshot(&self) -> Vec<Value> {
        let mut values: Vec<Value> = self.values.read().iter().copied().collect();
        values.sort_unstable();
        values
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
