//! Thread stack discovery
//!
//! Used by `Engine::start` to check that the stack base it records lies on
//! the current thread's stack. Platforms that cannot report their stack
//! bounds skip the check.

/// Address range of a thread's stack, `low` inclusive, `high` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBounds {
    pub low: usize,
    pub high: usize,
}

impl StackBounds {
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.low && addr < self.high
    }

    #[cfg(test)]
    fn size(&self) -> usize {
        self.high - self.low
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::current_thread_stack;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use macos::current_thread_stack;
    } else {
        mod fallback;
        pub use fallback::current_thread_stack;
    }
}
