// projzip - Pack project folders into verified zip archives
//
// This is the library crate containing the pipeline and its data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod workflow;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{ExclusionConfig, OverwriteMode, PackLayout, PackSettings, PackStatus, RunState};
pub use state::{StateChange, StateManager};
pub use workflow::{PackResult, PackWorkflow, RunSummary, WorkflowOptions};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
