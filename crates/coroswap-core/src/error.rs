//! Error types for the coroswap engine

use core::fmt;

use crate::id::CoroutineId;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations
///
/// Scheduling itself never fails: switching to a blocked coroutine or
/// yielding with nothing else runnable are silent no-ops. These errors cover
/// lifecycle misuse and configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Operation requires a running engine (inside `start`)
    NotRunning,

    /// `start` called while the engine is already running
    AlreadyRunning,

    /// Handle does not name a live coroutine
    CoroutineNotFound(CoroutineId),

    /// Coroutine is in a state that does not allow the operation
    InvalidState(&'static str),

    /// The stack base lies outside the current thread's stack
    ForeignStack {
        base: usize,
        low: usize,
        high: usize,
    },

    /// Invalid engine configuration
    Config(ConfigError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotRunning => write!(f, "engine is not running"),
            EngineError::AlreadyRunning => write!(f, "engine is already running"),
            EngineError::CoroutineNotFound(id) => write!(f, "coroutine {:?} not found", id),
            EngineError::InvalidState(msg) => write!(f, "invalid coroutine state: {}", msg),
            EngineError::ForeignStack { base, low, high } => write!(
                f,
                "stack base {:#x} outside thread stack [{:#x}, {:#x})",
                base, low, high
            ),
            EngineError::Config(e) => write!(f, "config error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(EngineError::NotRunning.to_string(), "engine is not running");

        let e = EngineError::Config(ConfigError::InvalidValue("max_image_size must be > 0"));
        assert_eq!(
            e.to_string(),
            "config error: invalid config: max_image_size must be > 0"
        );

        let e = EngineError::ForeignStack { base: 0x10, low: 0x100, high: 0x200 };
        assert_eq!(e.to_string(), "stack base 0x10 outside thread stack [0x100, 0x200)");
    }

    #[test]
    fn test_error_conversion() {
        let err: EngineError = ConfigError::InvalidValue("x").into();
        assert!(matches!(err, EngineError::Config(ConfigError::InvalidValue("x"))));
        assert!(std::error::Error::source(&err).is_some());
    }
}
