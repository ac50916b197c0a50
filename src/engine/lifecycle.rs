//! Engine Lifecycle
//!
//! Strictly linear state machine:
//!
//! ```text
//! Uninitialized ──init──▶ Initialized ──start──▶ Started ──stop──▶ Stopped
//! ```

use crate::error::{Error, Result};

/// Lifecycle state of the cache engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Constructed, nothing bound
    Uninitialized,
    /// Stores and sequence bound
    Initialized,
    /// Serving reads and writes
    Started,
    /// Shut down; terminal
    Stopped,
}

impl EngineState {
    /// The only state reachable from `self`, if any.
    pub fn successor(self) -> Option<EngineState> {
        match self {
            EngineState::Uninitialized => Some(EngineState::Initialized),
            EngineState::Initialized => Some(EngineState::Started),
            EngineState::Started => Some(EngineState::Stopped),
            EngineState::Stopped => None,
        }
    }

    pub fn can_transition_to(self, next: EngineState) -> bool {
        self.successor() == Some(next)
    }

    /// Validate a transition and return the new state.
    pub fn transition(self, next: EngineState) -> Result<EngineState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// True once stores have been bound.
    pub fn is_initialized(self) -> bool {
        !matches!(self, EngineState::Uninitialized)
    }

    pub fn is_serving(self) -> bool {
        self == EngineState::Started
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Uninitialized => write!(f, "Uninitialized"),
            EngineState::Initialized => write!(f, "Initialized"),
            EngineState::Started => write!(f, "Started"),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ALL: [EngineState; 4] = [
        EngineState::Uninitialized,
        EngineState::Initialized,
        EngineState::Started,
        EngineState::Stopped,
    ];

    #[test]
    fn test_linear_path() {
        let state = EngineState::Uninitialized
            .transition(EngineState::Initialized)
            .and_then(|s| s.transition(EngineState::Started))
            .and_then(|s| s.transition(EngineState::Stopped))
            .unwrap();
        assert_eq!(state, EngineState::Stopped);
    }

    #[test]
    fn test_only_successor_is_allowed() {
        for from in ALL {
            for to in ALL {
                let expected = from.successor() == Some(to);
                assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_no_reentry_after_stop() {
        assert_matches!(
            EngineState::Stopped.transition(EngineState::Initialized),
            Err(Error::InvalidTransition { ref from, ref to }) if from == "Stopped" && to == "Initialized"
        );
        assert!(EngineState::Stopped.successor().is_none());
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        assert!(EngineState::Uninitialized
            .transition(EngineState::Started)
            .is_err());
        assert!(EngineState::Started
            .transition(EngineState::Started)
            .is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(!EngineState::Uninitialized.is_initialized());
        assert!(EngineState::Initialized.is_initialized());
        assert!(EngineState::Stopped.is_initialized());
        assert!(EngineState::Started.is_serving());
        assert!(!EngineState::Initialized.is_serving());
    }
}
