//! Engine configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. User's coroswap_config.rs (compile-time, via `COROSWAP_CONFIG_RS`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use coroswap_runtime::config::{EngineConfig, SchedPolicy};
//!
//! let config = EngineConfig::from_env()
//!     .max_image_size(1 << 20)
//!     .policy(SchedPolicy::HeadFirst);
//! ```

pub mod defaults;

use coroswap_core::env::{env_get, env_get_bool};
use coroswap_core::error::ConfigError;

/// How `yield` picks the next runnable coroutine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// Take the head of the alive list, skipping the yielder if it is the
    /// head. The list order is never changed by yielding, so two coroutines
    /// that keep yielding can starve a third.
    HeadFirst,
    /// Move the yielder to the tail of the alive list, then take the head.
    RoundRobin,
}

impl SchedPolicy {
    /// Parse a policy name as accepted by `COROSWAP_POLICY`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "head" | "head-first" | "headfirst" => Some(SchedPolicy::HeadFirst),
            "rr" | "round-robin" | "roundrobin" => Some(SchedPolicy::RoundRobin),
            _ => None,
        }
    }
}

/// Engine configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest stack image a single Store may capture; exceeding it is fatal
    pub max_image_size: usize,
    /// Image capacity reserved for every spawned coroutine up front
    pub prealloc_image: usize,
    /// Next-runnable selection used by `yield`
    pub policy: SchedPolicy,
    /// Verify at `start` that the stack base lies inside the thread's stack
    pub check_thread_stack: bool,
    /// Raise the log level to debug when the engine is built
    pub debug_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create config with compile-time defaults (no env override).
    pub fn new() -> Self {
        Self {
            max_image_size: defaults::MAX_IMAGE_SIZE,
            prealloc_image: defaults::PREALLOC_IMAGE,
            policy: if defaults::ROUND_ROBIN {
                SchedPolicy::RoundRobin
            } else {
                SchedPolicy::HeadFirst
            },
            check_thread_stack: defaults::CHECK_THREAD_STACK,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `COROSWAP_MAX_IMAGE_SIZE` - Max bytes per stack image
    /// - `COROSWAP_PREALLOC_IMAGE` - Bytes reserved per coroutine at spawn
    /// - `COROSWAP_POLICY` - `round-robin` or `head-first`
    /// - `COROSWAP_CHECK_STACK` - Thread stack check (0/1)
    /// - `COROSWAP_DEBUG` - Debug logging (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            max_image_size: env_get("COROSWAP_MAX_IMAGE_SIZE", base.max_image_size),
            prealloc_image: env_get("COROSWAP_PREALLOC_IMAGE", base.prealloc_image),
            policy: std::env::var("COROSWAP_POLICY")
                .ok()
                .and_then(|v| SchedPolicy::parse(&v))
                .unwrap_or(base.policy),
            check_thread_stack: env_get_bool("COROSWAP_CHECK_STACK", base.check_thread_stack),
            debug_logging: env_get_bool("COROSWAP_DEBUG", base.debug_logging),
        }
    }

    // Builder methods

    pub fn max_image_size(mut self, bytes: usize) -> Self {
        self.max_image_size = bytes;
        self
    }

    pub fn prealloc_image(mut self, bytes: usize) -> Self {
        self.prealloc_image = bytes;
        self
    }

    pub fn policy(mut self, policy: SchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn check_thread_stack(mut self, enable: bool) -> Self {
        self.check_thread_stack = enable;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_image_size == 0 {
            return Err(ConfigError::InvalidValue("max_image_size must be > 0"));
        }
        if self.prealloc_image > self.max_image_size {
            return Err(ConfigError::InvalidValue(
                "prealloc_image must be <= max_image_size",
            ));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("coroswap Configuration:");
        eprintln!("  max_image_size:      {}", self.max_image_size);
        eprintln!("  prealloc_image:      {}", self.prealloc_image);
        eprintln!("  policy:              {:?}", self.policy);
        eprintln!("  check_thread_stack:  {}", self.check_thread_stack);
        eprintln!("  debug_logging:       {}", self.debug_logging);
        eprintln!("  restore_probe_bytes: {}", defaults::RESTORE_PROBE_BYTES);
    }
}
