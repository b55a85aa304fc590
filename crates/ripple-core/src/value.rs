//! Broadcast values
//!
//! A value is opaque to the node: it is accepted once, stored, and
//! forwarded. Equality is the only property the gossip layer relies on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A broadcast payload as carried in the `message` field
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(pub i64);

impl Value {
    #[inline]
    pub fn new(v: i64) -> Self {
        Value(v)
    }

    #[inline]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value(v)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
