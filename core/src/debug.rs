//! Debug configuration for the harness.
//!
//! Environment variables:
//! - `HARNESS_DEBUG=1` - Log every captured build output line

use std::sync::OnceLock;

/// Global debug configuration loaded once at startup.
static DEBUG_CONFIG: OnceLock<DebugConfig> = OnceLock::new();

/// Debug configuration.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Log captured build output line by line.
    pub debug_mode: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DebugConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            debug_mode: env_flag("HARNESS_DEBUG"),
        }
    }
}

/// Reads a boolean `1`/`true` environment flag.
pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Gets the global debug configuration.
pub fn get_config() -> &'static DebugConfig {
    DEBUG_CONFIG.get_or_init(DebugConfig::from_env)
}

/// Returns true if debug mode is enabled.
pub fn is_debug() -> bool {
    get_config().debug_mode
}

/// Logs a debug message only when `HARNESS_DEBUG` is enabled.
#[macro_export]
macro_rules! harness_debug {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug() {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flag_is_false() {
        assert!(!env_flag("HARNESS_TEST_FLAG_THAT_IS_NEVER_SET"));
    }
}
