//! # memprime-core
//!
//! Core library for the MemPrime backup tools providing:
//! - Typed errors shared by the engine and the CLI
//! - Backup slot enumeration and key mapping
//! - Retry execution with policy-based configuration
//! - Configuration file parsing (memprime.yaml)

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use retry::{retry_with_policy, RetryError};
pub use types::{BackupSlot, RetryPolicy, RetryStrategy};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
