//! macOS thread stack bounds
//!
//! `pthread_get_stackaddr_np` returns the high end of the stack.

use super::StackBounds;

pub fn current_thread_stack() -> Option<StackBounds> {
    unsafe {
        let thread = libc::pthread_self();
        let high = libc::pthread_get_stackaddr_np(thread) as usize;
        let size = libc::pthread_get_stacksize_np(thread);
        if high == 0 || size == 0 {
            return None;
        }
        Some(StackBounds { low: high - size, high })
    }
}
