use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use openraft::ConfigError;
use openraft::SnapshotPolicy;

use crate::NodeId;

/// Command line and environment options of a print-farm node.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct NodeConfig {
    /// Raft id of this node; unique within the cluster.
    #[clap(long, env = "RAFT3D_ID")]
    pub id: NodeId,

    /// Address the HTTP API and Raft RPC listen on. Peers reach this node at this address too.
    #[clap(long, env = "RAFT3D_HTTP_ADDR")]
    pub http_addr: String,

    /// Initialize a new single-voter cluster made of this node.
    #[clap(long, env = "RAFT3D_BOOTSTRAP")]
    pub bootstrap: bool,

    /// Address of an existing member to join through.
    #[clap(long, env = "RAFT3D_JOIN")]
    pub join: Option<String>,

    /// Directory of the Raft log, vote and snapshot. Each node needs its own.
    #[clap(long, env = "RAFT3D_DATA_DIR", default_value = "raft3d-data")]
    pub data_dir: PathBuf,

    /// How long a write waits for commit before failing.
    #[clap(long, env = "RAFT3D_WRITE_TIMEOUT_MS", default_value = "5000")]
    pub write_timeout_ms: u64,

    /// How long the leader waits for a joining node to catch up before giving up on it.
    #[clap(long, env = "RAFT3D_JOIN_TIMEOUT_MS", default_value = "10000")]
    pub join_timeout_ms: u64,

    #[clap(long, env = "RAFT3D_HEARTBEAT_INTERVAL", default_value = "500")]
    pub heartbeat_interval: u64,

    #[clap(long, env = "RAFT3D_ELECTION_TIMEOUT_MIN", default_value = "1500")]
    pub election_timeout_min: u64,

    #[clap(long, env = "RAFT3D_ELECTION_TIMEOUT_MAX", default_value = "3000")]
    pub election_timeout_max: u64,

    /// Number of applied logs since the last snapshot that triggers a new one.
    #[clap(long, env = "RAFT3D_SNAPSHOT_THRESHOLD", default_value = "100")]
    pub snapshot_threshold: u64,
}

impl NodeConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Build and validate the openraft configuration.
    pub fn raft_config(&self) -> Result<openraft::Config, ConfigError> {
        let config = openraft::Config {
            cluster_name: "raft3d".to_string(),
            heartbeat_interval: self.heartbeat_interval,
            election_timeout_min: self.election_timeout_min,
            election_timeout_max: self.election_timeout_max,
            snapshot_policy: SnapshotPolicy::LogsSinceLast(self.snapshot_threshold),
            ..Default::default()
        };

        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let config = NodeConfig::try_parse_from(["raft3d", "--id", "1", "--http-addr", "127.0.0.1:21001"])?;

        assert_eq!(1, config.id);
        assert!(!config.bootstrap);
        assert_eq!(None, config.join);
        assert_eq!(PathBuf::from("raft3d-data"), config.data_dir);
        assert_eq!(Duration::from_secs(5), config.write_timeout());
        assert_eq!(Duration::from_secs(10), config.join_timeout());

        let raft_config = config.raft_config()?;
        assert_eq!(500, raft_config.heartbeat_interval);
        assert_eq!(1500, raft_config.election_timeout_min);
        assert_eq!(3000, raft_config.election_timeout_max);
        assert_eq!(SnapshotPolicy::LogsSinceLast(100), raft_config.snapshot_policy);
        Ok(())
    }

    #[test]
    fn test_join_and_overrides() -> anyhow::Result<()> {
        let config = NodeConfig::try_parse_from([
            "raft3d",
            "--id",
            "2",
            "--http-addr",
            "127.0.0.1:21002",
            "--join",
            "127.0.0.1:21001",
            "--write-timeout-ms",
            "250",
            "--join-timeout-ms",
            "2000",
            "--data-dir",
            "/var/lib/raft3d/2",
            "--snapshot-threshold",
            "10",
        ])?;

        assert_eq!(Some("127.0.0.1:21001".to_string()), config.join);
        assert_eq!(Duration::from_millis(250), config.write_timeout());
        assert_eq!(Duration::from_secs(2), config.join_timeout());
        assert_eq!(PathBuf::from("/var/lib/raft3d/2"), config.data_dir);
        assert_eq!(SnapshotPolicy::LogsSinceLast(10), config.raft_config()?.snapshot_policy);
        Ok(())
    }

    #[test]
    fn test_invalid_election_timeout() -> anyhow::Result<()> {
        let config = NodeConfig::try_parse_from([
            "raft3d",
            "--id",
            "1",
            "--http-addr",
            "127.0.0.1:21001",
            "--election-timeout-min",
            "3000",
            "--election-timeout-max",
            "1500",
        ])?;

        assert!(config.raft_config().is_err());
        Ok(())
    }
}
