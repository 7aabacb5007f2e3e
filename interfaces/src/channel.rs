//! Emulated Lower-Layer Channel
//! 
//! Carries PDUs between two RLC peers the way a HARQ-less radio link would:
//! some PDUs are lost, some arrive twice, and some overtake the PDU sent
//! before them.

use crate::InterfaceError;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Channel impairment configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Probability that a PDU is lost
    #[serde(default)]
    pub loss_probability: f64,
    /// Probability that a delivered PDU is delivered twice
    #[serde(default)]
    pub duplicate_probability: f64,
    /// Probability that a PDU is held back and delivered after the next one
    #[serde(default)]
    pub reorder_probability: f64,
    /// Seed of the impairment generator
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    0x5eed
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            loss_probability: 0.0,
            duplicate_probability: 0.0,
            reorder_probability: 0.0,
            seed: default_seed(),
        }
    }
}

impl ChannelConfig {
    /// Check that all probabilities lie in [0, 1]
    pub fn validate(&self) -> Result<(), InterfaceError> {
        let fields = [
            ("loss_probability", self.loss_probability),
            ("duplicate_probability", self.duplicate_probability),
            ("reorder_probability", self.reorder_probability),
        ];
        for (name, p) in fields {
            if !(0.0..=1.0).contains(&p) {
                return Err(InterfaceError::InvalidConfig(
                    format!("{} must be within [0, 1], got {}", name, p)
                ));
            }
        }
        Ok(())
    }
}

/// Channel statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelStats {
    /// PDUs handed to the channel
    pub offered: u64,
    /// PDUs lost
    pub dropped: u64,
    /// Extra copies delivered
    pub duplicated: u64,
    /// PDUs delivered out of order
    pub reordered: u64,
}

/// One direction of an impaired link
pub struct LossyChannel {
    config: ChannelConfig,
    rng: StdRng,
    held_back: Option<Bytes>,
    stats: ChannelStats,
}

impl LossyChannel {
    /// Create a new channel
    pub fn new(config: ChannelConfig) -> Result<Self, InterfaceError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            rng,
            held_back: None,
            stats: ChannelStats::default(),
        })
    }
    
    /// Push one PDU through the channel and return what arrives at the far end now
    pub fn transmit(&mut self, pdu: Bytes) -> Vec<Bytes> {
        self.stats.offered += 1;
        
        if self.rng.gen_bool(self.config.loss_probability) {
            trace!("Channel dropped PDU of {} bytes", pdu.len());
            self.stats.dropped += 1;
            return Vec::new();
        }
        
        let mut delivered = Vec::with_capacity(3);
        if self.rng.gen_bool(self.config.duplicate_probability) {
            self.stats.duplicated += 1;
            delivered.push(pdu.clone());
        }
        
        match self.held_back.take() {
            Some(older) => {
                delivered.push(pdu);
                delivered.push(older);
            }
            None if self.rng.gen_bool(self.config.reorder_probability) => {
                self.stats.reordered += 1;
                self.held_back = Some(pdu);
            }
            None => delivered.push(pdu),
        }
        
        delivered
    }
    
    /// Release a PDU still held back for reordering
    pub fn flush(&mut self) -> Option<Bytes> {
        self.held_back.take()
    }
    
    /// Channel statistics
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}
