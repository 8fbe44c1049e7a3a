use log::debug;
use serde::Serialize;

use super::{
    arbiter::{Arbiter, Requester},
    bus::{BusPorts, Resp, WRespPayload},
    bus_adapter::{self, AddressWindow, BurstState, PendingRequest, RequestTable},
    component::Component,
    internal_channel::InternalWriteChannel,
    register_bank::{RegisterBank, RegisterSnapshot},
};
use crate::settings::AcceleratorSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlaveStatistics {
    pub read_beats: u64,
    pub write_beats: u64,
    pub internal_writes: u64,
    pub address_errors: u64,
    pub stalls: u64,
}

/// # Description
/// the register slave: a bank of registers behind a bus slave port and an internal write port
/// # Fields
/// * `ports`: the bus side channels, the master pushes headers/beats and pops responses
/// * `reg_in`: the fifo of writes coming from the FIR engine
/// * `pending`: the request each requester is working on
/// * `arbiter`: decides who touches the bank in this cycle
/// * `last_served`: who touched the bank in the last cycle, None when nobody did
///
/// each cycle does, in order:
/// 1. accept a new header/internal write for every requester that has no pending request
/// 2. pick one requester
/// 3. serve one beat (or the internal write) of the picked requester
#[derive(Debug)]
pub struct RegisterSlave {
    bank: RegisterBank,
    window: AddressWindow,
    use_write_responses: bool,
    pub ports: BusPorts,
    pub reg_in: InternalWriteChannel,
    pending: RequestTable,
    arbiter: Arbiter,
    last_served: Option<Requester>,
    stats: SlaveStatistics,
}

impl Component for RegisterSlave {
    fn cycle(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.accept_requests();
        let picked = self.arbiter.pick(self.pending.mask());
        self.last_served = match picked {
            Some(Requester::Read) => self.serve_read(),
            Some(Requester::Write) => self.serve_write(),
            Some(Requester::Internal) => self.serve_internal(),
            None => None,
        };
        if picked.is_some() && self.last_served.is_none() {
            self.stats.stalls += 1;
        }
        Ok(())
    }
}

impl RegisterSlave {
    pub fn new(settings: &AcceleratorSettings, read_depth: usize, write_depth: usize) -> Self {
        RegisterSlave {
            bank: RegisterBank::new(settings.num_reg),
            window: AddressWindow::new(
                settings.base_address,
                settings.num_reg,
                settings.addr_bits_to_inspect,
            ),
            use_write_responses: settings.use_write_responses,
            ports: BusPorts::new(read_depth, write_depth),
            reg_in: InternalWriteChannel::new(settings.internal_channel_depth),
            pending: RequestTable::new(),
            arbiter: Arbiter::new(settings.arbiter_policy, settings.arbiter_order.clone()),
            last_served: None,
            stats: SlaveStatistics::default(),
        }
    }

    fn accept_requests(&mut self) {
        if !self.pending.is_pending(Requester::Read) {
            if let Some(header) = self.ports.ar.pop_nb() {
                debug!("accept read header {:?}", header);
                let burst = BurstState::new(&header, &self.window);
                self.pending
                    .insert(Requester::Read, PendingRequest::Read(burst));
            }
        }
        if !self.pending.is_pending(Requester::Write) {
            if let Some(header) = self.ports.aw.pop_nb() {
                debug!("accept write header {:?}", header);
                let burst = BurstState::new(&header, &self.window);
                self.pending
                    .insert(Requester::Write, PendingRequest::Write(burst));
            }
        }
        if !self.pending.is_pending(Requester::Internal) {
            if let Some(write) = self.reg_in.pop_nb() {
                self.pending
                    .insert(Requester::Internal, PendingRequest::Internal(write));
            }
        }
    }

    /// one beat of the held read burst, stalls when the response channel is full
    fn serve_read(&mut self) -> Option<Requester> {
        if self.ports.r.is_full() {
            return None;
        }
        let burst = match self.pending.get_mut(Requester::Read) {
            Some(PendingRequest::Read(burst)) => burst,
            other => panic!("read holds the bank but its request is {:?}", other),
        };
        let beat = bus_adapter::read_beat(&self.bank, &self.window, burst);
        self.stats.read_beats += 1;
        if beat.resp == Resp::SlvErr {
            self.stats.address_errors += 1;
        }
        if beat.last {
            self.pending.take(Requester::Read);
            self.arbiter.release(Requester::Read);
        }
        // cannot fail, checked above
        let _ = self.ports.r.push_nb(beat);
        Some(Requester::Read)
    }

    /// one data beat of the held write burst, waits for the beat to arrive
    fn serve_write(&mut self) -> Option<Requester> {
        if self.use_write_responses && self.ports.b.is_full() {
            return None;
        }
        let beat = self.ports.w.pop_nb()?;
        let burst = match self.pending.get_mut(Requester::Write) {
            Some(PendingRequest::Write(burst)) => burst,
            other => panic!("write holds the bank but its request is {:?}", other),
        };
        let resp = bus_adapter::write_beat(&mut self.bank, &self.window, burst, &beat);
        self.stats.write_beats += 1;
        if resp == Resp::SlvErr {
            self.stats.address_errors += 1;
        }
        if beat.last {
            let burst = self.pending.take(Requester::Write);
            self.arbiter.release(Requester::Write);
            if self.use_write_responses {
                if let Some(PendingRequest::Write(burst)) = burst {
                    let resp = WRespPayload {
                        id: burst.id,
                        resp: if burst.error { Resp::SlvErr } else { Resp::Okay },
                    };
                    let _ = self.ports.b.push_nb(resp);
                }
            }
        }
        Some(Requester::Write)
    }

    fn serve_internal(&mut self) -> Option<Requester> {
        let write = match self.pending.take(Requester::Internal) {
            Some(PendingRequest::Internal(write)) => write,
            other => panic!("internal holds the bank but its request is {:?}", other),
        };
        self.bank
            .write(write.register_index, write.value, super::bus::FULL_STROBE);
        debug!(
            "wrote to local reg from reg_in: reg_addr={} data={:#x}",
            write.register_index, write.value
        );
        self.stats.internal_writes += 1;
        self.arbiter.release(Requester::Internal);
        Some(Requester::Internal)
    }

    /// the bank as the other components will see it in the next cycle
    pub fn publish(&self) -> RegisterSnapshot {
        self.bank.snapshot()
    }

    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn window(&self) -> &AddressWindow {
        &self.window
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn last_served(&self) -> Option<Requester> {
        self.last_served
    }

    pub fn stats(&self) -> &SlaveStatistics {
        &self.stats
    }

    /// no request pending, nothing queued on any port and the bank is not held
    pub fn is_idle(&self) -> bool {
        self.pending.mask().is_empty()
            && self.arbiter.needs_update()
            && self.ports.is_quiet()
            && self.reg_in.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::accelerator::{
        arbiter::ArbiterPolicy,
        bus::{AddrPayload, WritePayload, FULL_STROBE},
        internal_channel::InternalWrite,
    };

    fn slave(policy: ArbiterPolicy) -> RegisterSlave {
        let settings = AcceleratorSettings {
            arbiter_policy: policy,
            internal_channel_depth: 2,
            ..AcceleratorSettings::default()
        };
        RegisterSlave::new(&settings, 4, 4)
    }

    fn write_beats(slave: &mut RegisterSlave, words: &[u64]) {
        for (i, &data) in words.iter().enumerate() {
            slave
                .ports
                .w
                .push_nb(WritePayload {
                    data,
                    strobe: FULL_STROBE,
                    last: i + 1 == words.len(),
                })
                .unwrap();
        }
    }

    #[test]
    fn test_burst_is_never_interleaved() -> Result<(), Box<dyn std::error::Error>> {
        let mut slave = slave(ArbiterPolicy::Priority);
        slave
            .ports
            .ar
            .push_nb(AddrPayload { id: 1, addr: 16, len: 3 })
            .unwrap();
        slave
            .ports
            .aw
            .push_nb(AddrPayload { id: 2, addr: 48, len: 1 })
            .unwrap();
        write_beats(&mut slave, &[0xaa, 0xbb]);
        slave.reg_in.push_nb(InternalWrite::new(10, 0xcc)).unwrap();

        let mut served = vec![];
        for _ in 0..10 {
            slave.cycle()?;
            if let Some(r) = slave.last_served() {
                served.push(r);
            }
            // drain the read responses like a master would
            while slave.ports.r.pop_nb().is_some() {}
        }
        use Requester::*;
        assert_eq!(served, vec![Read, Read, Read, Read, Write, Write, Internal]);
        assert_eq!(slave.bank().read(6), 0xaa);
        assert_eq!(slave.bank().read(7), 0xbb);
        assert_eq!(slave.bank().read(10), 0xcc);
        assert_eq!(
            slave.ports.b.pop_nb(),
            Some(WRespPayload { id: 2, resp: Resp::Okay })
        );
        assert!(slave.is_idle());
        Ok(())
    }

    #[test]
    fn test_write_waits_for_data() -> Result<(), Box<dyn std::error::Error>> {
        let mut slave = slave(ArbiterPolicy::Priority);
        slave
            .ports
            .aw
            .push_nb(AddrPayload { id: 3, addr: 0, len: 0 })
            .unwrap();
        slave.reg_in.push_nb(InternalWrite::new(5, 1)).unwrap();
        slave.cycle()?;
        // write holds the bank but has no beat, the internal write must not sneak in
        assert_eq!(slave.arbiter().holder(), Some(Requester::Write));
        assert_eq!(slave.last_served(), None);
        assert_eq!(slave.bank().read(5), 0);
        write_beats(&mut slave, &[9]);
        slave.cycle()?;
        assert_eq!(slave.last_served(), Some(Requester::Write));
        slave.cycle()?;
        assert_eq!(slave.last_served(), Some(Requester::Internal));
        assert_eq!(slave.bank().read(0), 9);
        assert_eq!(slave.bank().read(5), 1);
        assert_eq!(slave.stats().stalls, 1);
        Ok(())
    }

    #[test]
    fn test_error_response_aggregates_beats() -> Result<(), Box<dyn std::error::Error>> {
        let mut slave = slave(ArbiterPolicy::Priority);
        // last register and one past it
        slave
            .ports
            .aw
            .push_nb(AddrPayload { id: 4, addr: 13 * 8, len: 1 })
            .unwrap();
        write_beats(&mut slave, &[1, 2]);
        let before = slave.publish();
        for _ in 0..3 {
            slave.cycle()?;
        }
        assert_eq!(
            slave.ports.b.pop_nb(),
            Some(WRespPayload { id: 4, resp: Resp::SlvErr })
        );
        assert_eq!(slave.bank().read(13), 1);
        assert_eq!(slave.publish().read(0), before.read(0));
        assert_eq!(slave.stats().address_errors, 1);
        Ok(())
    }

    #[test]
    fn test_round_robin_serves_internal_under_read_pressure(
    ) -> Result<(), Box<dyn std::error::Error>> {
        for (policy, expect_internal) in [
            (ArbiterPolicy::Priority, false),
            (ArbiterPolicy::RoundRobin, true),
        ] {
            let mut slave = slave(policy);
            slave.reg_in.push_nb(InternalWrite::new(10, 1)).unwrap();
            for id in 0..6 {
                // a new single beat read is always waiting
                if slave.ports.ar.is_empty() {
                    slave
                        .ports
                        .ar
                        .push_nb(AddrPayload { id, addr: 0, len: 0 })
                        .unwrap();
                }
                slave.cycle()?;
                while slave.ports.r.pop_nb().is_some() {}
                if slave.ports.ar.is_empty() {
                    slave
                        .ports
                        .ar
                        .push_nb(AddrPayload { id: id + 100, addr: 0, len: 0 })
                        .unwrap();
                }
            }
            assert_eq!(slave.bank().read(10) == 1, expect_internal);
        }
        Ok(())
    }

    #[test]
    fn test_default_settings_never_starve_internal() -> Result<(), Box<dyn std::error::Error>> {
        let mut slave = RegisterSlave::new(&AcceleratorSettings::default(), 4, 4);
        slave.reg_in.push_nb(InternalWrite::new(10, 1)).unwrap();
        let mut waited = 0;
        for id in 0..1000 {
            if slave.ports.ar.is_empty() {
                slave
                    .ports
                    .ar
                    .push_nb(AddrPayload { id, addr: 0, len: 0 })
                    .unwrap();
            }
            slave.cycle()?;
            while slave.ports.r.pop_nb().is_some() {}
            if slave.last_served() == Some(Requester::Internal) {
                break;
            }
            waited += 1;
        }
        // two other grants at most
        assert!(waited <= 2, "internal waited {} grants", waited);
        assert_eq!(slave.bank().read(10), 1);
        assert_eq!(slave.arbiter().grants().internal, 1);
        Ok(())
    }

    #[test]
    fn test_read_stalls_on_full_response_channel() -> Result<(), Box<dyn std::error::Error>> {
        let settings = AcceleratorSettings::default();
        let mut slave = RegisterSlave::new(&settings, 1, 1);
        slave
            .ports
            .ar
            .push_nb(AddrPayload { id: 1, addr: 0, len: 1 })
            .unwrap();
        slave.cycle()?;
        slave.cycle()?;
        // the first beat was never popped
        assert_eq!(slave.ports.r.len(), 1);
        assert_eq!(slave.last_served(), None);
        assert_eq!(slave.ports.r.pop_nb().map(|b| b.last), Some(false));
        slave.cycle()?;
        assert_eq!(slave.ports.r.pop_nb().map(|b| b.last), Some(true));
        Ok(())
    }
}
