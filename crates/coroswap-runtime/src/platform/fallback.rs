//! Platforms without a stack bounds query

use super::StackBounds;

pub fn current_thread_stack() -> Option<StackBounds> {
    None
}
