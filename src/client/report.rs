//! Reconciliation results and engine state

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{ChangedField, Config, Fallback, FileIdentity};
use crate::subsystems::DownstreamError;

/// Where the reconciliation engine is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EngineState {
    Uninitialized = 0,
    Loading = 1,
    Validating = 2,
    Publishing = 3,
    /// Running on defaults because the file was missing or unreadable
    Degraded = 4,
    Idle = 5,
}

impl EngineState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Loading,
            2 => EngineState::Validating,
            3 => EngineState::Publishing,
            4 => EngineState::Degraded,
            5 => EngineState::Idle,
            _ => EngineState::Uninitialized,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Validating => "validating",
            EngineState::Publishing => "publishing",
            EngineState::Degraded => "degraded",
            EngineState::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// What started a reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// Initial load during construction
    Startup,
    /// The watcher saw new file content
    FileChanged(FileIdentity),
    /// [`Client::reload`](crate::client::Client::reload)
    Explicit,
}

impl ReloadTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadTrigger::Startup => "startup",
            ReloadTrigger::FileChanged(_) => "file-changed",
            ReloadTrigger::Explicit => "explicit",
        }
    }
}

/// Where the published configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Parsed from the configuration file
    File(FileIdentity),
    /// All defaults, because the file could not be loaded
    Defaults { reason: String },
}

/// Outcome of one load, validate and publish cycle
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub id: Uuid,
    pub trigger: ReloadTrigger,
    pub timestamp: DateTime<Utc>,
    pub origin: ConfigOrigin,
    pub fallbacks: Vec<Fallback>,
    /// A corrected document was written back
    pub persisted: bool,
    pub save_error: Option<String>,
    pub changed: Vec<ChangedField>,
    pub downstream_errors: Vec<DownstreamError>,
}

impl ReloadReport {
    pub(crate) fn new(trigger: ReloadTrigger, origin: ConfigOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            timestamp: Utc::now(),
            origin,
            fallbacks: Vec::new(),
            persisted: false,
            save_error: None,
            changed: Vec::new(),
            downstream_errors: Vec::new(),
        }
    }

    /// Loaded from the file with nothing substituted and nothing failing
    pub fn is_clean(&self) -> bool {
        matches!(self.origin, ConfigOrigin::File(_))
            && self.fallbacks.is_empty()
            && self.save_error.is_none()
            && self.downstream_errors.is_empty()
    }

    pub fn changed(&self, field: ChangedField) -> bool {
        self.changed.contains(&field)
    }
}

/// Passed to change listeners after a publish that changed something
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// `None` for the first publish
    pub previous: Option<Arc<Config>>,
    pub current: Arc<Config>,
    pub changed: Vec<ChangedField>,
}
