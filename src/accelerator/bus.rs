//! the bus level payloads and the bounded channels that carry them
//!
//! a read is one `AddrPayload` on `ar` answered by `len + 1` `ReadPayload` beats on `r`.
//! a write is one `AddrPayload` on `aw` plus `len + 1` `WritePayload` beats on `w`,
//! optionally answered by one `WRespPayload` on `b`.

use std::collections::VecDeque;

use serde::Serialize;

/// one register, as wide as the bus data
pub type Word = u64;
pub const BYTES_PER_REG: u64 = 8;
/// log2 of `BYTES_PER_REG`
pub const ADDR_BITS_PER_REG: u32 = 3;
/// every byte enabled
pub const FULL_STROBE: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resp {
    Okay,
    SlvErr,
}

/// read or write header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrPayload {
    pub id: u32,
    pub addr: u64,
    /// number of beats minus one
    pub len: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPayload {
    pub id: u32,
    pub data: Word,
    pub resp: Resp,
    pub last: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePayload {
    pub data: Word,
    pub strobe: u8,
    pub last: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WRespPayload {
    pub id: u32,
    pub resp: Resp,
}

/// # Description
/// a bounded fifo between two components, the non blocking push and pop of a hardware channel
/// # Example
/// ```
/// use fir_accel::accelerator::bus::Channel;
/// let mut chan = Channel::new(1);
/// assert!(chan.push_nb(1).is_ok());
/// assert_eq!(chan.push_nb(2), Err(2));
/// assert_eq!(chan.pop_nb(), Some(1));
/// assert!(chan.is_empty());
/// ```
#[derive(Debug)]
pub struct Channel<T> {
    queue: VecDeque<T>,
    capacity: usize,
}

impl<T> Channel<T> {
    pub fn new(capacity: usize) -> Self {
        Channel {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }
    /// push if there is room, hand the value back otherwise
    pub fn push_nb(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            Err(value)
        } else {
            self.queue.push_back(value);
            Ok(())
        }
    }
    pub fn pop_nb(&mut self) -> Option<T> {
        self.queue.pop_front()
    }
    pub fn peek(&self) -> Option<&T> {
        self.queue.front()
    }
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// # Description
/// move as many values as the destination accepts, keeping the order
/// - returns the number of values moved
pub fn transfer<T>(from: &mut Channel<T>, to: &mut Channel<T>) -> usize {
    let mut moved = 0;
    while !to.is_full() {
        match from.pop_nb() {
            Some(value) => {
                // cannot fail, checked above
                let _ = to.push_nb(value);
                moved += 1;
            }
            None => break,
        }
    }
    moved
}

/// the five channels of one side of the bus
#[derive(Debug)]
pub struct BusPorts {
    pub ar: Channel<AddrPayload>,
    pub r: Channel<ReadPayload>,
    pub aw: Channel<AddrPayload>,
    pub w: Channel<WritePayload>,
    pub b: Channel<WRespPayload>,
}

impl BusPorts {
    pub fn new(read_depth: usize, write_depth: usize) -> Self {
        BusPorts {
            ar: Channel::new(1),
            r: Channel::new(read_depth),
            aw: Channel::new(1),
            w: Channel::new(write_depth),
            b: Channel::new(1),
        }
    }

    /// nothing in flight on any channel
    pub fn is_quiet(&self) -> bool {
        self.ar.is_empty()
            && self.r.is_empty()
            && self.aw.is_empty()
            && self.w.is_empty()
            && self.b.is_empty()
    }
}
