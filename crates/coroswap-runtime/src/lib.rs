//! # coroswap-runtime
//!
//! Stack-copying coroutine engine.
//!
//! This crate provides:
//! - Context switch primitives (architecture-specific assembly)
//! - Thread stack discovery per platform
//! - Store/Restore of stack regions to heap images
//! - The alive/blocked scheduler and engine lifecycle

pub mod arch;
pub mod config;
pub mod context;
pub mod engine;
pub mod platform;
pub mod run_queue;
pub mod stack;
pub mod stats;

// Re-exports
pub use config::{EngineConfig, SchedPolicy};
pub use engine::Engine;
pub use stats::EngineStats;

// Architecture detection
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use arch::x86_64 as current_arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use arch::aarch64 as current_arch;
    } else {
        compile_error!("Unsupported architecture");
    }
}
