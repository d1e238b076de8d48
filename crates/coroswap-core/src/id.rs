//! Coroutine handle type

use core::fmt;

use crate::constants::COROUTINE_NONE;

/// Handle to a coroutine owned by an engine
///
/// A handle is a slot index plus the generation of that slot. The engine bumps
/// the generation whenever a slot is freed, so a handle kept by a collaborator
/// after its coroutine finished never resolves to a newer coroutine that
/// reuses the slot. Handles stay valid across block/unblock cycles.
///
/// `CoroutineId::NONE` is the "no specific coroutine" sentinel: passing it to
/// `sched` means "any runnable coroutine", passing it to `block` means
/// "the current one".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoroutineId {
    index: u32,
    generation: u32,
}

impl CoroutineId {
    /// Sentinel value indicating no coroutine
    pub const NONE: CoroutineId = CoroutineId {
        index: COROUTINE_NONE,
        generation: 0,
    };

    /// Create a handle from its raw parts
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        CoroutineId { index, generation }
    }

    /// Slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot index as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when this handle was issued
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.index == COROUTINE_NONE
    }

    /// Check if this is a real handle
    #[inline]
    pub const fn is_some(self) -> bool {
        self.index != COROUTINE_NONE
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<CoroutineId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<Option<CoroutineId>> for CoroutineId {
    #[inline]
    fn from(id: Option<CoroutineId>) -> Self {
        id.unwrap_or(CoroutineId::NONE)
    }
}

impl fmt::Debug for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "CoroutineId(NONE)")
        } else {
            write!(f, "CoroutineId({}v{})", self.index, self.generation)
        }
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.index)
        }
    }
}

impl Default for CoroutineId {
    fn default() -> Self {
        CoroutineId::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coroutine_id_basics() {
        let id = CoroutineId::new(42, 3);
        assert_eq!(id.index(), 42);
        assert_eq!(id.as_usize(), 42);
        assert_eq!(id.generation(), 3);
        assert!(!id.is_none());
        assert!(id.is_some());
    }

    #[test]
    fn test_coroutine_id_none() {
        let none = CoroutineId::NONE;
        assert!(none.is_none());
        assert!(!none.is_some());
        assert_eq!(none.to_option(), None);
        assert_eq!(CoroutineId::default(), CoroutineId::NONE);
        assert_eq!(CoroutineId::from(None), CoroutineId::NONE);
    }

    #[test]
    fn test_generation_distinguishes_reuse() {
        let old = CoroutineId::new(7, 0);
        let reused = CoroutineId::new(7, 1);
        assert_ne!(old, reused);
        assert_eq!(old.index(), reused.index());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format!("{}", CoroutineId::new(5, 2)), "5");
        assert_eq!(format!("{:?}", CoroutineId::new(5, 2)), "CoroutineId(5v2)");
        assert_eq!(format!("{}", CoroutineId::NONE), "none");
    }
}
