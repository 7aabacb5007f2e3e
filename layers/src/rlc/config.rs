//! RLC Bearer Configuration
//!
//! Configurable parameters of TS 38.322 Section 7. Timer values are in
//! milliseconds; a negative timer or threshold means "infinity", i.e. the
//! timer or trigger is disabled.

use super::sn::SnSpace;
use crate::LayerError;
use common::types::LinkDirection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// RLC operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RlcMode {
    /// Transparent Mode
    Tm,
    /// Unacknowledged Mode, both directions
    UmBidir,
    /// Unacknowledged Mode, uplink only
    UmUnidirUl,
    /// Unacknowledged Mode, downlink only
    UmUnidirDl,
    /// Acknowledged Mode
    Am,
}

impl RlcMode {
    /// Whether this is one of the UM variants
    pub fn is_um(&self) -> bool {
        matches!(self, RlcMode::UmBidir | RlcMode::UmUnidirUl | RlcMode::UmUnidirDl)
    }

    /// Whether an entity transmitting in `tx_direction` has a TX side
    pub fn has_tx(&self, tx_direction: LinkDirection) -> bool {
        match self {
            RlcMode::UmUnidirUl => tx_direction == LinkDirection::Uplink,
            RlcMode::UmUnidirDl => tx_direction == LinkDirection::Downlink,
            _ => true,
        }
    }

    /// Whether an entity transmitting in `tx_direction` has an RX side
    pub fn has_rx(&self, tx_direction: LinkDirection) -> bool {
        match self {
            RlcMode::UmUnidirUl => tx_direction == LinkDirection::Downlink,
            RlcMode::UmUnidirDl => tx_direction == LinkDirection::Uplink,
            _ => true,
        }
    }
}

impl fmt::Display for RlcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RlcMode::Tm => "TM",
            RlcMode::UmBidir => "UM Bi-dir",
            RlcMode::UmUnidirUl => "UM Uni-dir-UL",
            RlcMode::UmUnidirDl => "UM Uni-dir-DL",
            RlcMode::Am => "AM",
        };
        write!(f, "{}", name)
    }
}

/// UM sequence number field length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum UmSnSize {
    /// 6 bit SN
    Size6,
    /// 12 bit SN
    Size12,
}

impl UmSnSize {
    /// Field length in bits
    pub fn bits(self) -> u8 {
        match self {
            UmSnSize::Size6 => 6,
            UmSnSize::Size12 => 12,
        }
    }

    /// SN space of this field length
    pub fn space(self) -> SnSpace {
        SnSpace::new(self.bits())
    }
}

impl TryFrom<u8> for UmSnSize {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            6 => Ok(UmSnSize::Size6),
            12 => Ok(UmSnSize::Size12),
            other => Err(format!("invalid UM SN field length: {} (must be 6 or 12)", other)),
        }
    }
}

impl From<UmSnSize> for u8 {
    fn from(size: UmSnSize) -> u8 {
        size.bits()
    }
}

/// AM sequence number field length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AmSnSize {
    /// 12 bit SN
    Size12,
    /// 18 bit SN
    Size18,
}

impl AmSnSize {
    /// Field length in bits
    pub fn bits(self) -> u8 {
        match self {
            AmSnSize::Size12 => 12,
            AmSnSize::Size18 => 18,
        }
    }

    /// SN space of this field length
    pub fn space(self) -> SnSpace {
        SnSpace::new(self.bits())
    }
}

impl TryFrom<u8> for AmSnSize {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            12 => Ok(AmSnSize::Size12),
            18 => Ok(AmSnSize::Size18),
            other => Err(format!("invalid AM SN field length: {} (must be 12 or 18)", other)),
        }
    }
}

impl From<AmSnSize> for u8 {
    fn from(size: AmSnSize) -> u8 {
        size.bits()
    }
}

/// Configurable parameters for RLC UM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlcUmConfig {
    /// SN field length, same for both directions
    pub sn_field_length: UmSnSize,
    /// Timer used by rx to detect PDU loss (ms)
    pub t_reassembly: i32,
}

impl Default for RlcUmConfig {
    fn default() -> Self {
        Self {
            sn_field_length: UmSnSize::Size12,
            t_reassembly: 35,
        }
    }
}

/// Configurable parameters for RLC AM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlcAmConfig {
    /// Number of bits used for tx sequence numbers
    pub tx_sn_field_length: AmSnSize,
    /// Number of bits used for rx sequence numbers
    pub rx_sn_field_length: AmSnSize,
    /// Poll retx timeout (ms)
    pub t_poll_retx: i32,
    /// Timer used by rx to detect PDU loss (ms)
    pub t_reassembly: i32,
    /// Timer used by rx to prohibit tx of status PDU (ms)
    pub t_status_prohibit: i32,
    /// Max number of retx
    pub max_retx_thresh: u32,
    /// Insert poll bit after this many PDUs
    pub poll_pdu: i32,
    /// Insert poll bit after this much data (kB)
    pub poll_byte: i32,
}

impl Default for RlcAmConfig {
    fn default() -> Self {
        Self {
            tx_sn_field_length: AmSnSize::Size12,
            rx_sn_field_length: AmSnSize::Size12,
            t_poll_retx: 45,
            t_reassembly: 35,
            t_status_prohibit: 10,
            max_retx_thresh: 8,
            poll_pdu: 16,
            poll_byte: 25,
        }
    }
}

/// Convert a millisecond/threshold setting where negative means disabled
pub(crate) fn enabled(value: i32) -> Option<u64> {
    u64::try_from(value).ok()
}

/// Like [`enabled`], for timers where 0 also means disabled
fn enabled_timer(value: i32) -> Option<u64> {
    enabled(value).filter(|ms| *ms > 0)
}

impl RlcAmConfig {
    /// `t_poll_retx` in ms, `None` when 0 or negative
    pub fn poll_retx_ms(&self) -> Option<u64> {
        enabled_timer(self.t_poll_retx)
    }

    /// `t_status_prohibit` in ms, `None` when 0 or negative
    pub fn status_prohibit_ms(&self) -> Option<u64> {
        enabled_timer(self.t_status_prohibit)
    }

    /// `poll_pdu` threshold, `None` when disabled
    pub fn poll_pdu_threshold(&self) -> Option<u64> {
        enabled(self.poll_pdu)
    }

    /// `poll_byte` threshold in bytes, `None` when disabled
    pub fn poll_byte_threshold(&self) -> Option<u64> {
        enabled(self.poll_byte).map(|kb| kb * 1000)
    }
}

fn default_sdu_queue_size() -> usize {
    4096
}

/// Configuration of one RLC bearer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlcConfig {
    /// Operating mode
    pub mode: RlcMode,
    /// Direction this entity transmits in (selects the active side of unidirectional UM)
    #[serde(default)]
    pub tx_direction: LinkDirection,
    /// UM parameters, required for the UM modes
    #[serde(default)]
    pub um: Option<RlcUmConfig>,
    /// AM parameters, required for AM
    #[serde(default)]
    pub am: Option<RlcAmConfig>,
    /// Maximum number of SDUs waiting for transmission
    #[serde(default = "default_sdu_queue_size")]
    pub sdu_queue_size: usize,
}

impl RlcConfig {
    /// Transparent mode bearer
    pub fn tm() -> Self {
        Self {
            mode: RlcMode::Tm,
            tx_direction: LinkDirection::Downlink,
            um: None,
            am: None,
            sdu_queue_size: default_sdu_queue_size(),
        }
    }

    /// Bidirectional UM bearer
    pub fn um(um: RlcUmConfig) -> Self {
        Self {
            mode: RlcMode::UmBidir,
            um: Some(um),
            ..Self::tm()
        }
    }

    /// AM bearer
    pub fn am(am: RlcAmConfig) -> Self {
        Self {
            mode: RlcMode::Am,
            am: Some(am),
            ..Self::tm()
        }
    }

    /// Check that the parameters required by the mode are present and in range
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.sdu_queue_size == 0 {
            return Err(LayerError::InvalidConfiguration(
                "sdu_queue_size must be at least 1".to_string()
            ));
        }

        match self.mode {
            RlcMode::Tm => Ok(()),
            RlcMode::UmBidir | RlcMode::UmUnidirUl | RlcMode::UmUnidirDl => {
                let um = self.um.as_ref().ok_or_else(|| LayerError::InvalidConfiguration(
                    format!("{} bearer without UM parameters", self.mode)
                ))?;
                if um.t_reassembly < 0 {
                    return Err(LayerError::InvalidConfiguration(
                        "UM t_reassembly must not be disabled".to_string()
                    ));
                }
                Ok(())
            }
            RlcMode::Am => {
                let am = self.am.as_ref().ok_or_else(|| LayerError::InvalidConfiguration(
                    "AM bearer without AM parameters".to_string()
                ))?;
                if am.t_reassembly < 0 {
                    return Err(LayerError::InvalidConfiguration(
                        "AM t_reassembly must not be disabled".to_string()
                    ));
                }
                if am.max_retx_thresh == 0 {
                    return Err(LayerError::InvalidConfiguration(
                        "max_retx_thresh must be at least 1".to_string()
                    ));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unidirectional_sides() {
        let ul = RlcMode::UmUnidirUl;
        assert!(ul.has_tx(LinkDirection::Uplink));
        assert!(!ul.has_rx(LinkDirection::Uplink));
        assert!(!ul.has_tx(LinkDirection::Downlink));
        assert!(ul.has_rx(LinkDirection::Downlink));
        assert!(RlcMode::Am.has_tx(LinkDirection::Downlink) && RlcMode::Am.has_rx(LinkDirection::Downlink));
    }

    #[test]
    fn test_disabled_thresholds() {
        let am = RlcAmConfig { poll_pdu: -1, poll_byte: -1, t_poll_retx: -1, ..Default::default() };
        assert_eq!(am.poll_pdu_threshold(), None);
        assert_eq!(am.poll_byte_threshold(), None);
        assert_eq!(am.poll_retx_ms(), None);
        assert_eq!(RlcAmConfig::default().poll_byte_threshold(), Some(25_000));

        let zero = RlcAmConfig { t_poll_retx: 0, t_status_prohibit: 0, ..Default::default() };
        assert_eq!(zero.poll_retx_ms(), None);
        assert_eq!(zero.status_prohibit_ms(), None);
        assert_eq!(RlcAmConfig::default().poll_retx_ms(), Some(45));
    }

    #[test]
    fn test_validation() {
        assert!(RlcConfig::am(RlcAmConfig::default()).validate().is_ok());
        assert!(RlcConfig::um(RlcUmConfig::default()).validate().is_ok());
        assert!(RlcConfig::tm().validate().is_ok());

        let mut missing = RlcConfig::tm();
        missing.mode = RlcMode::Am;
        assert!(missing.validate().is_err());

        let zero_retx = RlcAmConfig { max_retx_thresh: 0, ..Default::default() };
        assert!(RlcConfig::am(zero_retx).validate().is_err());
    }

    #[test]
    fn test_sn_size_parsing() {
        assert_eq!(UmSnSize::try_from(6u8), Ok(UmSnSize::Size6));
        assert!(UmSnSize::try_from(18u8).is_err());
        assert_eq!(AmSnSize::try_from(18u8), Ok(AmSnSize::Size18));
        assert!(AmSnSize::try_from(6u8).is_err());
        assert_eq!(u8::from(AmSnSize::Size12), 12);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "mode": "am",
            "am": {
                "tx_sn_field_length": 18,
                "rx_sn_field_length": 18,
                "t_poll_retx": 45,
                "t_reassembly": 35,
                "t_status_prohibit": 0,
                "max_retx_thresh": 4,
                "poll_pdu": 4,
                "poll_byte": -1
            }
        }"#;
        let config: RlcConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, RlcMode::Am);
        assert_eq!(config.tx_direction, LinkDirection::Downlink);
        assert_eq!(config.sdu_queue_size, 4096);
        let am = config.am.unwrap();
        assert_eq!(am.tx_sn_field_length, AmSnSize::Size18);
        assert_eq!(am.poll_byte_threshold(), None);
    }
}
