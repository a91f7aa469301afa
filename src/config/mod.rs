//! Configuration module
//!
//! This module handles the daemon's policy configuration: the raw document
//! and its durable store, field-by-field validation into typed values, file
//! identity tracking and the change watcher.

pub mod defaults;
pub mod diff;
pub mod document;
pub mod duration;
pub mod error;
pub mod identity;
pub mod source;
pub mod types;
pub mod validator;
pub mod watcher;

// Re-export types and traits
pub use self::diff::{diff, ChangedField};
pub use self::document::{fields, RawDocument};
pub use self::error::StoreError;
pub use self::identity::{FileIdentity, IdentityBaseline, WatchEvent};
pub use self::source::{ConfigStore, JsonFileStore, LoadedDocument};
pub use self::types::{
    AddressKind, Config, DefaultAction, DefaultDuration, FirewallBackend, FwOptions, InternalOptions,
    InvalidValue, ProcMonitorMethod, RulesOptions, ServerAddress, ServerConfig, StatsConfig,
};
pub use self::validator::{
    validate, AllMethodsAvailable, Fallback, FallbackReason, MonitorAvailability, ValidationOutcome,
    Validator,
};
pub use self::watcher::{ConfigWatcher, WatcherHandle, WatcherOptions};
