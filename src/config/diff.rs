//! Field-level comparison of two configurations

use std::fmt;

use crate::config::types::Config;

/// Top-level setting whose value differs between two configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangedField {
    ServerAddress,
    ProcMonitorMethod,
    DefaultAction,
    DefaultDuration,
    InterceptUnknown,
    Firewall,
    FwOptions,
    Rules,
    Stats,
    Internal,
}

impl ChangedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangedField::ServerAddress => "Server.Address",
            ChangedField::ProcMonitorMethod => "ProcMonitorMethod",
            ChangedField::DefaultAction => "DefaultAction",
            ChangedField::DefaultDuration => "DefaultDuration",
            ChangedField::InterceptUnknown => "InterceptUnknown",
            ChangedField::Firewall => "Firewall",
            ChangedField::FwOptions => "FwOptions",
            ChangedField::Rules => "Rules",
            ChangedField::Stats => "Stats",
            ChangedField::Internal => "Internal",
        }
    }
}

impl fmt::Display for ChangedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of `current` that differ from `previous`.
///
/// With no previous configuration every field counts as changed.
pub fn diff(previous: Option<&Config>, current: &Config) -> Vec<ChangedField> {
    let Some(prev) = previous else {
        return vec![
            ChangedField::ServerAddress,
            ChangedField::ProcMonitorMethod,
            ChangedField::DefaultAction,
            ChangedField::DefaultDuration,
            ChangedField::InterceptUnknown,
            ChangedField::Firewall,
            ChangedField::FwOptions,
            ChangedField::Rules,
            ChangedField::Stats,
            ChangedField::Internal,
        ];
    };

    let checks = [
        (ChangedField::ServerAddress, prev.server != current.server),
        (ChangedField::ProcMonitorMethod, prev.proc_monitor_method != current.proc_monitor_method),
        (ChangedField::DefaultAction, prev.default_action != current.default_action),
        (ChangedField::DefaultDuration, prev.default_duration != current.default_duration),
        (ChangedField::InterceptUnknown, prev.intercept_unknown != current.intercept_unknown),
        (ChangedField::Firewall, prev.firewall != current.firewall),
        (ChangedField::FwOptions, prev.fw_options != current.fw_options),
        (ChangedField::Rules, prev.rules != current.rules),
        (ChangedField::Stats, prev.stats != current.stats),
        (ChangedField::Internal, prev.internal != current.internal),
    ];

    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{DefaultAction, FirewallBackend};

    #[test]
    fn test_identical_configs_have_no_changes() {
        let config = Config::default();
        assert!(diff(Some(&config), &config.clone()).is_empty());
    }

    #[test]
    fn test_initial_publish_changes_everything() {
        assert_eq!(diff(None, &Config::default()).len(), 10);
    }

    #[test]
    fn test_reports_only_changed_fields() {
        let before = Config::default();
        let mut after = before.clone();
        after.default_action = DefaultAction::Allow;
        after.firewall = FirewallBackend::Nftables;
        after.stats.workers = 2;

        assert_eq!(
            diff(Some(&before), &after),
            vec![ChangedField::DefaultAction, ChangedField::Firewall, ChangedField::Stats]
        );
    }
}
