//! # Description
//! - decode bus addresses into register indexes
//! - serve one read beat or one write beat of a granted burst
//! - keep the pending requests of the three requesters
//!
//! an address outside the window is answered with `Resp::SlvErr`, the beat is still consumed
//! and the bank is not touched.

use enum_as_inner::EnumAsInner;
use log::{debug, warn};

use super::arbiter::{RequestMask, Requester};
use super::bus::{
    AddrPayload, ReadPayload, Resp, WritePayload, ADDR_BITS_PER_REG, BYTES_PER_REG,
};
use super::internal_channel::InternalWrite;
use super::register_bank::RegisterBank;
use crate::error::BusError;

/// # Description
/// the address window of the bank
/// * only the low `addr_bits` bits of a bus address are inspected
/// * `[base, max_valid]` is the valid range after truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressWindow {
    base: u64,
    max_valid: u64,
    inspect_mask: u64,
}

impl AddressWindow {
    pub fn new(base: u64, num_reg: usize, addr_bits: u32) -> Self {
        let inspect_mask = if addr_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << addr_bits) - 1
        };
        AddressWindow {
            base: base & inspect_mask,
            max_valid: (base & inspect_mask) + num_reg as u64 * BYTES_PER_REG - 1,
            inspect_mask,
        }
    }

    pub fn truncate(&self, addr: u64) -> u64 {
        addr & self.inspect_mask
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn max_valid_address(&self) -> u64 {
        self.max_valid
    }

    /// # Description
    /// map a bus address to a register index
    ///
    /// # Example
    /// ```
    /// use fir_accel::accelerator::bus_adapter::AddressWindow;
    /// let window = AddressWindow::new(0, 14, 16);
    /// assert_eq!(window.decode(0x7001_0008), Ok(1));
    /// assert_eq!(window.decode(0x0f), Ok(1));
    /// assert!(window.decode(14 * 8).is_err());
    /// ```
    pub fn decode(&self, addr: u64) -> Result<usize, BusError> {
        let addr = self.truncate(addr);
        if addr < self.base || addr > self.max_valid {
            return Err(BusError::AddressRange { addr });
        }
        Ok(((addr - self.base) >> ADDR_BITS_PER_REG) as usize)
    }
}

/// # Description
/// the progress of one bus burst
/// * `addr`: the (truncated) address of the next beat
/// * `remaining`: beats left after the next one, 0 means the next beat is the last
/// * `error`: some beat of this burst was out of range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstState {
    pub id: u32,
    pub addr: u64,
    pub remaining: u8,
    pub beat: u8,
    pub error: bool,
}

impl BurstState {
    pub fn new(header: &AddrPayload, window: &AddressWindow) -> Self {
        BurstState {
            id: header.id,
            addr: window.truncate(header.addr),
            remaining: header.len,
            beat: 0,
            error: false,
        }
    }

    fn advance(&mut self, window: &AddressWindow) {
        self.remaining = self.remaining.saturating_sub(1);
        self.beat = self.beat.wrapping_add(1);
        self.addr = window.truncate(self.addr.wrapping_add(BYTES_PER_REG));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum PendingRequest {
    Read(BurstState),
    Write(BurstState),
    Internal(InternalWrite),
}

/// # Description
/// the arena of pending requests, one slot per requester
#[derive(Debug, Default)]
pub struct RequestTable {
    slots: [Option<PendingRequest>; 3],
}

impl RequestTable {
    pub fn new() -> Self {
        RequestTable::default()
    }
    pub fn is_pending(&self, requester: Requester) -> bool {
        self.slots[requester.index()].is_some()
    }
    pub fn insert(&mut self, requester: Requester, request: PendingRequest) {
        assert!(
            !self.is_pending(requester),
            "{:?} already has a pending request",
            requester
        );
        self.slots[requester.index()] = Some(request);
    }
    pub fn get(&self, requester: Requester) -> Option<&PendingRequest> {
        self.slots[requester.index()].as_ref()
    }
    pub fn get_mut(&mut self, requester: Requester) -> Option<&mut PendingRequest> {
        self.slots[requester.index()].as_mut()
    }
    pub fn take(&mut self, requester: Requester) -> Option<PendingRequest> {
        self.slots[requester.index()].take()
    }
    pub fn mask(&self) -> RequestMask {
        RequestMask::new(
            self.is_pending(Requester::Read),
            self.is_pending(Requester::Write),
            self.is_pending(Requester::Internal),
        )
    }
}

/// # Description
/// serve the next beat of a read burst
/// - the burst advances even when the address is out of range
/// - the returned beat has `last` set when this was the final beat
pub fn read_beat(bank: &RegisterBank, window: &AddressWindow, burst: &mut BurstState) -> ReadPayload {
    let (data, resp) = match window.decode(burst.addr) {
        Ok(index) => (bank.read(index), Resp::Okay),
        Err(e) => {
            warn!(
                "read beat {} of {}: {}, valid range [{:#x}, {:#x}]",
                burst.beat,
                burst.id,
                e,
                window.base(),
                window.max_valid_address()
            );
            burst.error = true;
            (0, Resp::SlvErr)
        }
    };
    let last = burst.remaining == 0;
    debug!(
        "read from local reg: axi_addr={:#x} data={:#x} last={}",
        burst.addr, data, last
    );
    if !last {
        burst.advance(window);
    }
    ReadPayload {
        id: burst.id,
        data,
        resp,
        last,
    }
}

/// # Description
/// apply one write beat of a write burst
/// - a partial strobe does a read-modify-write of the target register
/// - an out-of-range beat is consumed without touching the bank and marks the burst as failed
/// # Return
/// the status of this beat
pub fn write_beat(
    bank: &mut RegisterBank,
    window: &AddressWindow,
    burst: &mut BurstState,
    beat: &WritePayload,
) -> Resp {
    let resp = match window.decode(burst.addr) {
        Ok(index) => {
            bank.write(index, beat.data, beat.strobe);
            debug!(
                "wrote to local reg: axi_addr={:#x} reg_addr={} data={:#x} strobe={:#x}",
                burst.addr, index, beat.data, beat.strobe
            );
            Resp::Okay
        }
        Err(e) => {
            warn!(
                "write beat {} of {}: {}, valid range [{:#x}, {:#x}]",
                burst.beat,
                burst.id,
                e,
                window.base(),
                window.max_valid_address()
            );
            burst.error = true;
            Resp::SlvErr
        }
    };
    if beat.last != (burst.remaining == 0) {
        warn!(
            "write burst {}: last flag {} at beat {} but {} beats remain",
            burst.id, beat.last, burst.beat, burst.remaining
        );
    }
    if !beat.last {
        burst.advance(window);
    }
    resp
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::accelerator::bus::FULL_STROBE;
    use proptest::prelude::*;

    fn header(addr: u64, len: u8) -> AddrPayload {
        AddrPayload { id: 7, addr, len }
    }

    #[test]
    fn test_window_limits() {
        let window = AddressWindow::new(0x100, 14, 16);
        assert_eq!(window.max_valid_address(), 0x100 + 14 * 8 - 1);
        assert_eq!(window.decode(0x100), Ok(0));
        assert_eq!(window.decode(0x100 + 14 * 8 - 1), Ok(13));
        assert_eq!(
            window.decode(0xff),
            Err(BusError::AddressRange { addr: 0xff })
        );
        assert!(window.decode(0x100 + 14 * 8).is_err());
        // the bits above the inspected ones are ignored
        assert_eq!(window.decode(0xdead_0108), Ok(1));
    }

    #[test]
    fn test_read_burst() {
        let window = AddressWindow::new(0, 4, 16);
        let mut bank = RegisterBank::new(4);
        for i in 0..4 {
            bank.write(i, 100 + i as u64, FULL_STROBE);
        }
        // starts at reg 2, three beats, the last one is outside
        let mut burst = BurstState::new(&header(16, 2), &window);
        let b0 = read_beat(&bank, &window, &mut burst);
        let b1 = read_beat(&bank, &window, &mut burst);
        let b2 = read_beat(&bank, &window, &mut burst);
        assert_eq!((b0.data, b0.resp, b0.last), (102, Resp::Okay, false));
        assert_eq!((b1.data, b1.resp, b1.last), (103, Resp::Okay, false));
        assert_eq!((b2.data, b2.resp, b2.last), (0, Resp::SlvErr, true));
        assert!(burst.error);
        assert_eq!(b2.id, 7);
    }

    #[test]
    fn test_write_burst_with_error() {
        let window = AddressWindow::new(0, 2, 16);
        let mut bank = RegisterBank::new(2);
        let mut burst = BurstState::new(&header(8, 1), &window);
        let first = WritePayload {
            data: 5,
            strobe: FULL_STROBE,
            last: false,
        };
        let second = WritePayload {
            data: 6,
            strobe: FULL_STROBE,
            last: true,
        };
        assert_eq!(write_beat(&mut bank, &window, &mut burst, &first), Resp::Okay);
        assert_eq!(
            write_beat(&mut bank, &window, &mut burst, &second),
            Resp::SlvErr
        );
        assert!(burst.error);
        assert_eq!(bank.read(1), 5);
        assert_eq!(bank.read(0), 0);
    }

    #[test]
    fn test_request_table() {
        let mut table = RequestTable::new();
        assert!(table.mask().is_empty());
        table.insert(
            Requester::Internal,
            PendingRequest::Internal(InternalWrite::new(3, 9)),
        );
        assert!(table.mask().is_pending(Requester::Internal));
        assert_eq!(
            table.get(Requester::Internal).and_then(|p| p.as_internal()),
            Some(&InternalWrite::new(3, 9))
        );
        assert!(table.take(Requester::Internal).is_some());
        assert!(!table.is_pending(Requester::Internal));
    }

    proptest! {
        #[test]
        fn out_of_range_never_mutates(addr in 112u64..0x1_0000, data: u64, strobe: u8) {
            let window = AddressWindow::new(0, 14, 16);
            let mut bank = RegisterBank::new(14);
            let before = bank.snapshot();
            let mut burst = BurstState::new(&header(addr, 0), &window);
            let beat = WritePayload { data, strobe, last: true };
            prop_assert_eq!(write_beat(&mut bank, &window, &mut burst, &beat), Resp::SlvErr);
            prop_assert_eq!(bank.snapshot(), before);
            let mut burst = BurstState::new(&header(addr, 0), &window);
            prop_assert_eq!(read_beat(&bank, &window, &mut burst).resp, Resp::SlvErr);
        }

        #[test]
        fn in_range_write_then_read(reg in 0u64..14, offset in 0u64..8, data: u64, strobe: u8) {
            let window = AddressWindow::new(0, 14, 16);
            let mut bank = RegisterBank::new(14);
            let addr = reg * 8 + offset;
            let mut burst = BurstState::new(&header(addr, 0), &window);
            let beat = WritePayload { data, strobe, last: true };
            prop_assert_eq!(write_beat(&mut bank, &window, &mut burst, &beat), Resp::Okay);
            let mut burst = BurstState::new(&header(addr, 0), &window);
            let got = read_beat(&bank, &window, &mut burst);
            prop_assert_eq!(got.resp, Resp::Okay);
            prop_assert_eq!(got.data, crate::accelerator::register_bank::merge_strobe(0, data, strobe));
        }
    }
}
