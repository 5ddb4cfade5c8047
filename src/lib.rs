//! # jsfence
//!
//! Bounded execution of small, untrusted JavaScript snippets for scraping
//! and request-building pipelines.
//!
//! ## Features
//!
//! - **Template rendering:** `{{ expression }}` placeholders in JSON values,
//!   evaluated against per-call bindings
//! - **Allow-listed expressions:** a character and keyword filter runs before
//!   any interpreter sees the text
//! - **Process sandbox:** transforms run in a fresh worker process with a
//!   killing deadline, capped pipes and OS resource limits
//!
//! A binary that hosts the [`sandbox::Supervisor`] must hand control to
//! [`sandbox::worker::run`] when started with [`sandbox::SANDBOX_MARKER`] as its
//! first argument, before doing anything else.

pub mod config;
pub mod error;
pub mod expr;
pub mod runtime;
pub mod sandbox;
pub mod template;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
