//! Monitor configuration
//!
//! Environment flags are captured once at monitor construction instead
//! of being read ad hoc, so behavior cannot change mid-session and
//! tests can inject settings without touching the process environment.

use std::env;

/// Settings shared by a monitor and the boards it creates
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Allow upload and reset on models flagged experimental
    /// (`TY_EXPERIMENTAL_BOARDS`)
    pub experimental_boards: bool,
}

impl MonitorConfig {
    /// Capture configuration from the process environment
    pub fn from_env() -> Self {
        let experimental_boards =
            env::var_os("TY_EXPERIMENTAL_BOARDS").is_some_and(|v| !v.is_empty());

        Self {
            experimental_boards,
        }
    }
}
