//! Raw configuration document
//!
//! The file is kept as an untyped JSON object until validation. This lets
//! the validator judge every field on its own (a bad value in one field
//! never prevents the rest from loading) and lets a corrected document be
//! written back with unknown keys and untouched fields preserved verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::validator::Fallback;

/// Dotted paths of every field the daemon understands
pub mod fields {
    pub const SERVER: &str = "Server";
    pub const SERVER_ADDRESS: &str = "Server.Address";
    pub const PROC_MONITOR_METHOD: &str = "ProcMonitorMethod";
    pub const DEFAULT_ACTION: &str = "DefaultAction";
    pub const DEFAULT_DURATION: &str = "DefaultDuration";
    pub const INTERCEPT_UNKNOWN: &str = "InterceptUnknown";
    pub const FIREWALL: &str = "Firewall";
    pub const FW_OPTIONS: &str = "FwOptions";
    pub const FW_CONFIG_PATH: &str = "FwOptions.ConfigPath";
    pub const FW_MONITOR_INTERVAL: &str = "FwOptions.MonitorInterval";
    pub const FW_QUEUE_NUM: &str = "FwOptions.QueueNum";
    pub const FW_QUEUE_BYPASS: &str = "FwOptions.QueueBypass";
    pub const RULES: &str = "Rules";
    pub const RULES_PATH: &str = "Rules.Path";
    pub const RULES_ENABLE_CHECKSUMS: &str = "Rules.EnableChecksums";
    pub const STATS: &str = "Stats";
    pub const STATS_MAX_EVENTS: &str = "Stats.MaxEvents";
    pub const STATS_MAX_STATS: &str = "Stats.MaxStats";
    pub const STATS_WORKERS: &str = "Stats.Workers";
    pub const INTERNAL: &str = "Internal";
    pub const INTERNAL_GC_PERCENT: &str = "Internal.GCPercent";
    pub const INTERNAL_FLUSH_CONNS_ON_START: &str = "Internal.FlushConnsOnStart";
}

/// Unvalidated configuration document (a JSON object)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDocument {
    map: Map<String, Value>,
}

impl RawDocument {
    /// Empty document; validates to all defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self { map }
    }

    /// Parse a JSON object. Anything else (arrays, scalars, broken JSON) is an error.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Map<String, Value>>(bytes).map(Self::from_map)
    }

    /// Look up a value by dotted path, e.g. `FwOptions.QueueNum`
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.map.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Set a value by dotted path, creating (or replacing non-object) parents
    pub fn set(&mut self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };

        let mut current = &mut self.map;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.map
    }

    /// Copy of this document with every fallen-back field replaced by its substitute
    pub fn with_fallbacks(&self, fallbacks: &[Fallback]) -> RawDocument {
        let mut corrected = self.clone();
        for fallback in fallbacks {
            corrected.set(fallback.field, fallback.substituted.clone());
        }
        corrected
    }

    /// Pretty-printed JSON with a trailing newline
    pub fn to_pretty_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = serde_json::to_vec_pretty(&self.map)?;
        out.push(b'\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_requires_object() {
        assert!(RawDocument::parse(br#"{"Firewall":"nftables"}"#).is_ok());
        assert!(RawDocument::parse(b"[1,2,3]").is_err());
        assert!(RawDocument::parse(b"\"text\"").is_err());
        assert!(RawDocument::parse(b"{\"Firewall\":").is_err());
        assert!(RawDocument::parse(b"").is_err());
    }

    #[test]
    fn test_get_and_set_by_path() {
        let mut doc = RawDocument::parse(br#"{"FwOptions":{"QueueNum":3},"Stats":7}"#).unwrap();
        assert_eq!(doc.get(fields::FW_QUEUE_NUM), Some(&json!(3)));
        assert_eq!(doc.get(fields::FW_QUEUE_BYPASS), None);
        assert_eq!(doc.get(fields::STATS_WORKERS), None);

        doc.set(fields::FW_QUEUE_BYPASS, json!(false));
        doc.set(fields::STATS_WORKERS, json!(4));
        doc.set(fields::SERVER_ADDRESS, json!("unix:///tmp/x.sock"));

        assert_eq!(doc.get(fields::FW_QUEUE_NUM), Some(&json!(3)));
        assert_eq!(doc.get(fields::FW_QUEUE_BYPASS), Some(&json!(false)));
        assert_eq!(doc.get(fields::STATS), Some(&json!({"Workers": 4})));
        assert_eq!(doc.get(fields::SERVER_ADDRESS), Some(&json!("unix:///tmp/x.sock")));
    }

    #[test]
    fn test_unknown_keys_survive_serialisation() {
        let doc = RawDocument::parse(br#"{"Firewall":"iptables","FutureKnob":{"x":1}}"#).unwrap();
        let bytes = doc.to_pretty_vec().unwrap();
        let reparsed = RawDocument::parse(&bytes).unwrap();
        assert_eq!(reparsed.get("FutureKnob.x"), Some(&json!(1)));
        assert_eq!(reparsed, doc);
    }
}
