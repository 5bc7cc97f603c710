//! Stable operation ordering for deterministic processing.

use crate::domain::Operation;
use chrono::{DateTime, Utc};

/// Stable ordering key for operations.
///
/// Ordering: timestamp -> operation id. Two operations sharing a timestamp
/// always resolve the same way regardless of the caller's input order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OperationOrderingKey<'a> {
    pub timestamp: DateTime<Utc>,
    pub id: &'a str,
}

impl<'a> OperationOrderingKey<'a> {
    pub fn from_operation(op: &'a Operation) -> Self {
        OperationOrderingKey {
            timestamp: op.timestamp,
            id: op.id.as_str(),
        }
    }
}

/// Sort operations deterministically in place.
pub fn sort_operations_deterministic(ops: &mut [Operation]) {
    ops.sort_by(|a, b| {
        OperationOrderingKey::from_operation(a).cmp(&OperationOrderingKey::from_operation(b))
    });
}

/// Borrowing variant: the caller's list stays untouched.
pub fn sorted_refs(ops: &[Operation]) -> Vec<&Operation> {
    let mut refs: Vec<&Operation> = ops.iter().collect();
    refs.sort_by(|a, b| {
        OperationOrderingKey::from_operation(a).cmp(&OperationOrderingKey::from_operation(b))
    });
    refs
}
