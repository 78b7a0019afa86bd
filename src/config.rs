//! Configuration for storage nodes
//!
//! The protocol document (`protocol.json`) tunes the consensus layer. Every
//! field is optional; the `*_or_default` accessors supply the defaults the
//! node runs with.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Entries applied between automatic snapshots.
pub const DEFAULT_SNAPSHOT_THRESHOLD: u64 = 10_000;

/// Session timeout handed to execution engines.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// How long start-up waits for every partition to report a leader.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Bound on a single proposal.
pub const DEFAULT_PROPOSAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Round-trip time between nodes, in milliseconds. One consensus tick is one RTT.
pub const DEFAULT_RTT_MILLISECOND: u64 = 200;

pub const DEFAULT_DATA_DIR: &str = "/var/lib/atomix/data";

/// Consensus tuning for a storage node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolConfig {
    /// Applied entries between snapshots. Zero disables snapshotting.
    pub snapshot_threshold: Option<u64>,

    #[serde(with = "humantime_option")]
    pub session_timeout: Option<Duration>,

    #[serde(with = "humantime_option")]
    pub startup_timeout: Option<Duration>,

    #[serde(with = "humantime_option")]
    pub proposal_timeout: Option<Duration>,

    pub rtt_millisecond: Option<u64>,

    pub data_dir: Option<PathBuf>,
}

impl ProtocolConfig {
    /// Parse a protocol document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })
    }

    /// Load a protocol document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn snapshot_threshold_or_default(&self) -> u64 {
        self.snapshot_threshold.unwrap_or(DEFAULT_SNAPSHOT_THRESHOLD)
    }

    /// Entries retained behind each snapshot so slow followers can catch up
    /// from the log instead of a full snapshot transfer.
    pub fn compaction_overhead(&self) -> u64 {
        self.snapshot_threshold_or_default() / 10
    }

    pub fn session_timeout_or_default(&self) -> Duration {
        self.session_timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT)
    }

    pub fn startup_timeout_or_default(&self) -> Duration {
        self.startup_timeout.unwrap_or(DEFAULT_STARTUP_TIMEOUT)
    }

    pub fn proposal_timeout_or_default(&self) -> Duration {
        self.proposal_timeout.unwrap_or(DEFAULT_PROPOSAL_TIMEOUT)
    }

    pub fn rtt_or_default(&self) -> Duration {
        Duration::from_millis(self.rtt_millisecond.unwrap_or(DEFAULT_RTT_MILLISECOND))
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Set the snapshot threshold.
    pub fn with_snapshot_threshold(mut self, threshold: u64) -> Self {
        self.snapshot_threshold = Some(threshold);
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Set how long start-up waits for partition leaders.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    pub fn with_proposal_timeout(mut self, timeout: Duration) -> Self {
        self.proposal_timeout = Some(timeout);
        self
    }

    /// Set the inter-node round-trip time in milliseconds.
    pub fn with_rtt_millisecond(mut self, rtt: u64) -> Self {
        self.rtt_millisecond = Some(rtt);
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}

/// Durations are written as humantime strings such as `"1m"` or `"500ms"`.
mod humantime_option {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => {
                serializer.serialize_str(&humantime::format_duration(*duration).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => humantime::parse_duration(&text)
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid duration '{}': {}", text, e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtocolConfig::default();
        assert_eq!(config.snapshot_threshold_or_default(), 10_000);
        assert_eq!(config.compaction_overhead(), 1_000);
        assert_eq!(config.session_timeout_or_default(), Duration::from_secs(60));
        assert_eq!(config.rtt_or_default(), Duration::from_millis(200));
        assert_eq!(config.data_dir_or_default(), PathBuf::from("/var/lib/atomix/data"));
    }

    #[test]
    fn test_parse_protocol_document() {
        let config = ProtocolConfig::from_json(
            r#"{"snapshotThreshold": 500, "sessionTimeout": "30s", "startupTimeout": "2m 30s", "rttMillisecond": 50}"#,
        )
        .unwrap();

        assert_eq!(config.snapshot_threshold_or_default(), 500);
        assert_eq!(config.compaction_overhead(), 50);
        assert_eq!(config.session_timeout_or_default(), Duration::from_secs(30));
        assert_eq!(config.startup_timeout_or_default(), Duration::from_secs(150));
        assert_eq!(config.proposal_timeout_or_default(), DEFAULT_PROPOSAL_TIMEOUT);
        assert_eq!(config.rtt_or_default(), Duration::from_millis(50));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ProtocolConfig::from_json("{}").unwrap();
        assert_eq!(config, ProtocolConfig::default());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let err = ProtocolConfig::from_json(r#"{"sessionTimeout": "soon"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = ProtocolConfig::default()
            .with_snapshot_threshold(20)
            .with_session_timeout(Duration::from_secs(90))
            .with_data_dir("/tmp/raft");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"sessionTimeout\":\"1m 30s\""));
        assert_eq!(ProtocolConfig::from_json(&json).unwrap(), config);
    }
}
