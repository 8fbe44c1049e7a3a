use super::bus::{Channel, Word};

/// # Description
/// one register write produced by the FIR engine
/// - it targets the bank by register index, not by bus address, and is never validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalWrite {
    pub register_index: usize,
    pub value: Word,
}

impl InternalWrite {
    pub fn new(register_index: usize, value: Word) -> Self {
        InternalWrite {
            register_index,
            value,
        }
    }
}

/// the fifo between the FIR engine and the register slave
pub type InternalWriteChannel = Channel<InternalWrite>;

/// # Description
/// the single slot a producer writes into before the system moves it into the channel
/// * `push` fails while the slot is still occupied, the producer has to wait a tick
/// * the slot is drained by `take` once the channel has room
#[derive(Debug, Default)]
pub struct Outbox {
    slot: Option<InternalWrite>,
}

impl Outbox {
    pub fn new() -> Self {
        Outbox { slot: None }
    }
    pub fn is_free(&self) -> bool {
        self.slot.is_none()
    }
    pub fn push(&mut self, write: InternalWrite) -> Result<(), InternalWrite> {
        match self.slot {
            Some(_) => Err(write),
            None => {
                self.slot = Some(write);
                Ok(())
            }
        }
    }
    pub fn take(&mut self) -> Option<InternalWrite> {
        self.slot.take()
    }
    pub fn peek(&self) -> Option<&InternalWrite> {
        self.slot.as_ref()
    }
}
