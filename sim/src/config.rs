//! Simulator Configuration
//!
//! Loaded from YAML or TOML depending on the file extension. Every section
//! has defaults, so an empty file (or no file) runs an AM bearer over a
//! clean channel.

use interfaces::channel::ChannelConfig;
use layers::rlc::{RlcAmConfig, RlcConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Bearer configuration shared by both peers
    #[serde(default = "default_bearer")]
    pub bearer: RlcConfig,
    /// Impairments applied to each direction
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Offered load and grants
    #[serde(default)]
    pub traffic: TrafficConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

fn default_bearer() -> RlcConfig {
    RlcConfig::am(RlcAmConfig::default())
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bearer: default_bearer(),
            channel: ChannelConfig::default(),
            traffic: TrafficConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Traffic and scheduling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficConfig {
    /// Number of SDUs sent from gNB to UE
    #[serde(default = "default_num_sdus")]
    pub num_sdus: usize,
    /// Size of each SDU in bytes
    #[serde(default = "default_sdu_size")]
    pub sdu_size: usize,
    /// Bytes granted per direction and slot
    #[serde(default = "default_grant_bytes")]
    pub grant_bytes: usize,
    /// Slot duration (ms)
    #[serde(default = "default_slot_ms")]
    pub slot_ms: u64,
    /// Simulated time after which the run stops (ms)
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    /// Number of segments in each peer's buffer pool
    #[serde(default = "default_pool_segments")]
    pub pool_segments: usize,
    /// Segment size of the buffer pools in bytes
    #[serde(default = "default_pool_segment_size")]
    pub pool_segment_size: usize,
}

fn default_num_sdus() -> usize {
    1000
}

fn default_sdu_size() -> usize {
    1500
}

fn default_grant_bytes() -> usize {
    800
}

fn default_slot_ms() -> u64 {
    1
}

fn default_max_duration_ms() -> u64 {
    60_000
}

fn default_pool_segments() -> usize {
    16384
}

fn default_pool_segment_size() -> usize {
    256
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            num_sdus: default_num_sdus(),
            sdu_size: default_sdu_size(),
            grant_bytes: default_grant_bytes(),
            slot_ms: default_slot_ms(),
            max_duration_ms: default_max_duration_ms(),
            pool_segments: default_pool_segments(),
            pool_segment_size: default_pool_segment_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// All layers log level
    #[serde(default = "default_log_level")]
    pub all_level: String,
    /// RLC layer log level
    #[serde(default = "default_log_level")]
    pub rlc_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            all_level: default_log_level(),
            rlc_level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// Filter directive for `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        format!("{},layers::rlc={}", self.all_level, self.rlc_level)
    }
}

impl SimConfig {
    /// Load configuration from a `.yml`/`.yaml` or `.toml` file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: SimConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => serde_yaml::from_str(&contents)?,
            Some("toml") => toml::from_str(&contents)?,
            _ => return Err(anyhow::anyhow!("Unsupported configuration format: {}", path.display())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the whole configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bearer.validate()?;
        self.channel.validate()?;
        if self.traffic.sdu_size == 0 {
            return Err(anyhow::anyhow!("traffic.sdu_size must be at least 1"));
        }
        if self.traffic.grant_bytes < 4 {
            return Err(anyhow::anyhow!("traffic.grant_bytes must be at least 4"));
        }
        if self.traffic.slot_ms == 0 {
            return Err(anyhow::anyhow!("traffic.slot_ms must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layers::rlc::{AmSnSize, RlcMode, UmSnSize};

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
bearer:
  mode: am
  am:
    tx_sn_field_length: 18
    rx_sn_field_length: 18
    t_poll_retx: 45
    t_reassembly: 35
    t_status_prohibit: 10
    max_retx_thresh: 8
    poll_pdu: 16
    poll_byte: -1
channel:
  loss_probability: 0.1
  seed: 7
traffic:
  num_sdus: 10
"#;
        let config: SimConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bearer.mode, RlcMode::Am);
        let am = config.bearer.am.as_ref().unwrap();
        assert_eq!(am.tx_sn_field_length, AmSnSize::Size18);
        assert_eq!(am.poll_byte_threshold(), None);
        assert_eq!(config.channel.seed, 7);
        assert_eq!(config.traffic.num_sdus, 10);
        assert_eq!(config.traffic.sdu_size, 1500);
    }

    #[test]
    fn test_toml_config() {
        let text = r#"
[bearer]
mode = "um_bidir"

[bearer.um]
sn_field_length = 6
t_reassembly = 50

[log]
rlc_level = "debug"
"#;
        let config: SimConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bearer.um.as_ref().unwrap().sn_field_length, UmSnSize::Size6);
        assert_eq!(config.log.filter_directive(), "info,layers::rlc=debug");
    }

    #[test]
    fn test_missing_mode_parameters_rejected() {
        let config: SimConfig = serde_yaml::from_str("bearer:\n  mode: am\n").unwrap();
        assert!(config.validate().is_err());
    }
}
