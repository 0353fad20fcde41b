//! CLI subcommands for the `tiergate-cli` binary.
//!
//! ```bash
//! tiergate-cli simulate --requests 200   # Synthetic mixed-tier load
//! tiergate-cli config show               # Effective configuration
//! tiergate-cli config validate           # Sanity checks, exit 0/1
//! ```

pub mod config_cmd;
pub mod simulate_cmd;

pub use simulate_cmd::{run_simulate, SimulateOptions};

/// Exit code for success.
pub const EXIT_OK: i32 = 0;
/// Exit code for validation warnings or failed runs.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for unreadable configuration or bad arguments.
pub const EXIT_CONFIG_ERROR: i32 = 2;
