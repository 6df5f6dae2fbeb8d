use std::collections::HashMap;

use rpclite_codec::Value;

/// State of one in-flight call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallState {
    /// Request written, no response seen yet.
    Waiting,
    /// Response arrived; the caller has not picked it up yet.
    Resolved(Result<Value, Value>),
}

/// Outcome of offering a response to the pending table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Matched a waiting call.
    Delivered,
    /// No call is waiting on this id (late, duplicate, or never issued).
    Orphaned,
}

/// Tracks calls waiting for responses, keyed by correlation id.
#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    calls: HashMap<u32, CallState>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.calls.contains_key(&id)
    }

    /// Register a new waiting call.
    pub fn register(&mut self, id: u32) {
        self.calls.insert(id, CallState::Waiting);
    }

    /// Hand a response to the call waiting on `id`.
    ///
    /// Only the first response for an id is kept; anything after is orphaned.
    pub fn resolve(&mut self, id: u32, result: Result<Value, Value>) -> Delivery {
        match self.calls.get_mut(&id) {
            Some(state) if matches!(state, CallState::Waiting) => {
                *state = CallState::Resolved(result);
                Delivery::Delivered
            }
            _ => Delivery::Orphaned,
        }
    }

    pub fn is_resolved(&self, id: u32) -> bool {
        matches!(self.calls.get(&id), Some(CallState::Resolved(_)))
    }

    /// Take the result for `id` if it has arrived, removing the entry.
    pub fn take_resolved(&mut self, id: u32) -> Option<Result<Value, Value>> {
        match self.calls.get(&id) {
            Some(CallState::Resolved(_)) => match self.calls.remove(&id) {
                Some(CallState::Resolved(result)) => Some(result),
                _ => None,
            },
            _ => None,
        }
    }

    /// Forget `id` without a response (timeout or send failure).
    pub fn remove(&mut self, id: u32) -> bool {
        self.calls.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

/// Issues correlation ids: increasing, wrapping at `u32::MAX`, never one
/// that is still pending.
#[derive(Debug, Default)]
pub(crate) struct MessageCounter {
    next: u32,
}

impl MessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn starting_at(next: u32) -> Self {
        MessageCounter { next }
    }

    /// Next id not held by a pending call, or `None` if all ids are held.
    pub fn next_free(&mut self, pending: &PendingCalls) -> Option<u32> {
        // At most len() ids can be skipped before a free one turns up.
        for _ in 0..=pending.len() {
            let id = self.next;
            self.next = self.next.wrapping_add(1);
            if !pending.contains(id) {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut pending = PendingCalls::new();
        pending.register(1);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.take_resolved(1), None);

        assert_eq!(pending.resolve(1, Ok(Value::from(22))), Delivery::Delivered);
        assert!(pending.is_resolved(1));
        // Still held until the caller picks it up
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.take_resolved(1), Some(Ok(Value::from(22))));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_unknown_and_duplicate_are_orphans() {
        let mut pending = PendingCalls::new();
        assert_eq!(pending.resolve(9, Ok(Value::Nil)), Delivery::Orphaned);

        pending.register(2);
        assert_eq!(pending.resolve(2, Ok(Value::from(1))), Delivery::Delivered);
        assert_eq!(pending.resolve(2, Ok(Value::from(2))), Delivery::Orphaned);
        assert_eq!(pending.take_resolved(2), Some(Ok(Value::from(1))));
    }

    #[test]
    fn test_remove() {
        let mut pending = PendingCalls::new();
        pending.register(3);
        assert!(pending.remove(3));
        assert!(!pending.remove(3));
        assert_eq!(pending.resolve(3, Ok(Value::Nil)), Delivery::Orphaned);
    }

    #[test]
    fn test_counter_increments() {
        let pending = PendingCalls::new();
        let mut counter = MessageCounter::new();
        assert_eq!(counter.next_free(&pending), Some(0));
        assert_eq!(counter.next_free(&pending), Some(1));
        assert_eq!(counter.next_free(&pending), Some(2));
    }

    #[test]
    fn test_counter_wraps() {
        let pending = PendingCalls::new();
        let mut counter = MessageCounter::starting_at(u32::MAX);
        assert_eq!(counter.next_free(&pending), Some(u32::MAX));
        assert_eq!(counter.next_free(&pending), Some(0));
    }

    #[test]
    fn test_counter_skips_pending_ids_after_wrap() {
        let mut pending = PendingCalls::new();
        pending.register(0);
        pending.register(1);
        let mut counter = MessageCounter::starting_at(u32::MAX);
        assert_eq!(counter.next_free(&pending), Some(u32::MAX));
        assert_eq!(counter.next_free(&pending), Some(2));
    }
}
