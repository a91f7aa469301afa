//! policyd: runtime configuration core of a host-based network filtering daemon
//!
//! This library loads the daemon's policy file, validates every field on its
//! own (an invalid value falls back to a safe default instead of aborting),
//! publishes the result atomically to any number of concurrent readers and
//! tells the process-monitor and firewall subsystems when their settings
//! change. Edits to the file are picked up while the daemon runs.
//!
//! # Main Features
//!
//! - Field-by-field validation with recorded fallbacks
//! - Self-healing: corrected documents are written back atomically
//! - Lock-free policy reads during reloads
//! - Debounced file watching that ignores the daemon's own writes
//!
//! # Example
//!
//! ```no_run
//! use policyd::{Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder("unix:///tmp/osui.sock", "/etc/policyd/default-config.json")
//!         .build()?;
//!
//!     let policy = client.policy();
//!     println!("process monitor: {}", policy.proc_monitor_method());
//!     println!("firewall: {}", policy.firewall_type());
//!
//!     let watching = client.start_watching();
//!     tokio::signal::ctrl_c().await?;
//!     watching.stop().await;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod client;
pub mod common;
pub mod config;
pub mod subsystems;

// Re-export commonly used structures and functions for convenience
pub use client::{Client, ClientOptions, Policy, ReloadReport};
pub use common::{PolicyError, Result};
pub use config::Config;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
