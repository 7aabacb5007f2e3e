//! External Collaborator Interfaces Library
//! 
//! This crate provides the pieces the RLC core talks to but does not own:
//! the byte-buffer pool that backs SDU and segment storage, and an emulated
//! lower-layer channel that loses, duplicates and reorders PDUs.

pub mod pool;
pub mod channel;

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("Buffer pool exhausted: requested {requested} bytes, {available} bytes available")]
    PoolExhausted {
        requested: usize,
        available: usize,
    },
    
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
