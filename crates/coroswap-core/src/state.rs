//! Coroutine scheduling state

use core::fmt;

/// Scheduling state of a live coroutine
///
/// Finished and discarded coroutines are removed from the engine, so they
/// have no state: lookups for their handles return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoroutineState {
    /// Spawned, in the alive list, body not entered yet
    Created = 0,

    /// Suspended in the alive list, eligible for scheduling
    Ready = 1,

    /// Bound to the physical stack right now
    Running = 2,

    /// Parked in the blocked list until unblocked
    Blocked = 3,
}

impl CoroutineState {
    /// Check if this state allows the coroutine to be switched to
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, CoroutineState::Created | CoroutineState::Ready)
    }

    /// Check if the coroutine sits in the alive list
    ///
    /// The running coroutine stays a member of the alive list.
    #[inline]
    pub const fn is_alive(&self) -> bool {
        !matches!(self, CoroutineState::Blocked)
    }
}

impl fmt::Display for CoroutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoroutineState::Created => write!(f, "CREATED"),
            CoroutineState::Ready => write!(f, "READY"),
            CoroutineState::Running => write!(f, "RUNNING"),
            CoroutineState::Blocked => write!(f, "BLOCKED"),
        }
    }
}
