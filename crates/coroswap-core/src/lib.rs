//! # coroswap-core
//!
//! Core types for the coroswap coroutine engine.
//!
//! This crate is platform-agnostic and contains no OS- or CPU-specific code.
//! Stack transfer, the context switch primitives and the engine itself live
//! in `coroswap-runtime`.
//!
//! ## Modules
//!
//! - `id` - Coroutine handle type
//! - `state` - Coroutine scheduling state
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::CoroutineId;
pub use state::CoroutineState;
pub use error::{ConfigError, EngineError, EngineResult};
pub use env::{env_get, env_get_bool};

/// Constants shared by the runtime
pub mod constants {
    /// Stack pointer alignment required at a call boundary (x86_64 SysV, AAPCS64)
    pub const STACK_ALIGN: usize = 16;

    /// Index value reserved for the "no coroutine" sentinel
    pub const COROUTINE_NONE: u32 = u32::MAX;
}
