//! error types of the simulator
//!
//! - `BusError`: what went wrong with a single bus transaction, never fatal to the system
//! - `SimError`: what stops a simulation from being built or finished
//!

use thiserror::Error;

/// # Description
/// errors attached to one bus transaction, they travel with the completion
/// and never stop the other transactions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// the slave answered SLVERR, the address is outside its window
    #[error("address {addr:#x} is outside the register window")]
    AddressRange { addr: u64 },
    /// the transaction needs more beats than one burst carries, or none at all
    #[error("transaction {id} needs {beats} beats, a burst carries 1 to 256")]
    BurstLength { id: u32, beats: usize },
    /// the response does not match what the master sent
    #[error("protocol violation on transaction {id}: {reason}")]
    ProtocolViolation { id: u32, reason: String },
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("invalid stimulus file {path}: {reason}")]
    Stimulus { path: String, reason: String },
    #[error("simulation did not finish within {cycles} cycles")]
    CycleLimit { cycles: u64 },
}
