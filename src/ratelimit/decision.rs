//! The outcome of a single quota check.

use serde::Serialize;

/// Result of checking one key against its quota.
///
/// Only `allowed` is authoritative. `remaining` is a hint for client backoff
/// and may be stale by the time the caller reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    allowed: bool,
    remaining: u64,
}

impl Decision {
    /// An admission with `remaining` units left in the window.
    pub fn admit(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    /// A denial. Nothing is left in the window.
    pub fn deny() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_has_nothing_remaining() {
        let decision = Decision::deny();
        assert!(!decision.is_allowed());
        assert_eq!(decision.remaining(), 0);
    }

    #[test]
    fn test_serializes_for_log_events() {
        let json = serde_json::to_string(&Decision::admit(3)).unwrap();
        assert_eq!(json, r#"{"allowed":true,"remaining":3}"#);
    }
}
