//! # coroswap - stack-copying coroutines
//!
//! Many coroutines take turns on one physical call stack. A suspended
//! coroutine's live stack region is copied out to a heap image and copied
//! back when it resumes, so an idle coroutine costs only the bytes it was
//! actually using.
//!
//! ## Features
//!
//! - **No per-coroutine stacks**: one shared stack, grow-only heap images
//! - **Cooperative**: switches only at `yield_now`, `sched` and `block`
//! - **Block/unblock**: park coroutines on external events, wake them from
//!   another coroutine or from the idle hook
//! - **Single-threaded**: no locks, no `Send` requirement on bodies
//!
//! ## Quick Start
//!
//! ```ignore
//! use coroswap::{run, CoroutineId};
//!
//! fn main() {
//!     let stats = run(|engine| {
//!         let waiter = engine.spawn(|engine| {
//!             println!("waiting");
//!             engine.block(CoroutineId::NONE).ok();
//!             println!("woken");
//!         }).unwrap();
//!
//!         engine.yield_now();
//!         engine.unblock(waiter).unwrap();
//!     }).unwrap();
//!
//!     println!("{} switches", stats.switches);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        spawn(), yield_now(), sched(), block(), unblock()    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                               │
//! │     alive / blocked lists, idle context, context table      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Store / Restore                          │
//! │   [low, base) <-> heap image, save_and_continue / resume    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use coroswap_core::{
    ConfigError,
    CoroutineId,
    CoroutineState,
    EngineError,
    EngineResult,
};

// Re-export kprint macros for debug logging
pub use coroswap_core::{kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use coroswap_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use coroswap_core::{env_get, env_get_bool};

// Re-export runtime types
pub use coroswap_runtime::{Engine, EngineConfig, EngineStats, SchedPolicy};

/// Run `main` on a fresh engine configured from the environment
///
/// Returns the engine's final counters once nothing is runnable. Blocked
/// coroutines left at that point are released with the engine.
pub fn run<F>(main: F) -> EngineResult<EngineStats>
where
    F: FnOnce(&Engine) + 'static,
{
    let engine = Engine::from_env()?;
    engine.start(main)?;
    Ok(engine.shutdown())
}

/// Same as [`run`] with an explicit configuration
pub fn run_with_config<F>(config: EngineConfig, main: F) -> EngineResult<EngineStats>
where
    F: FnOnce(&Engine) + 'static,
{
    let engine = Engine::with_config(config)?;
    engine.start(main)?;
    Ok(engine.shutdown())
}
