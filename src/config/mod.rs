//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, EvaluatorConfig)
//! - types/sandbox.rs: Sandbox supervisor and worker limits
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths
//!
//! A `Config` is built once at startup and handed to each component by
//! value; nothing reads configuration from global state afterwards.

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, EvaluatorConfig};

// Re-export sandbox types
pub use types::sandbox::{SandboxConfig, WorkerLimits};

// Re-export IO and utilities
pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path};
pub use validation::{
    validate_config, validate_sandbox_config, ConfigValidationResult, ValidationIssue,
};
