//! Common module
//!
//! This module contains shared errors and utility functions used throughout the daemon.

pub mod error;
pub mod fs;
pub mod log;

// Re-export commonly used types and functions
pub use error::{PolicyError, Result};
pub use log::init_logger;
