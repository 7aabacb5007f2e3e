//! Protocol Stack Layers Library
//! 
//! This crate implements the 5G NR Radio Link Control layer according to
//! 3GPP TS 38.322 (Release 16): transparent, unacknowledged and acknowledged
//! mode bearers.

pub mod rlc;

use thiserror::Error;

/// Common errors for protocol layers
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Invalid protocol data unit: {0}")]
    InvalidPdu(#[from] rlc::PduError),
    
    #[error("Bearer released")]
    Released,
    
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
    
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    
    #[error("Bearer failed: {0}")]
    BearerFailed(rlc::FailureCause),
    
    #[error("Invalid state: {0}")]
    InvalidState(String),
    
    #[error("Bearer task channel closed")]
    ChannelClosed,
}
