//! the local bus master
//!
//! it turns whole transactions into headers and beats, and turns the beats that come back
//! into one `Completion` per transaction. a bad response only fails its own transaction.

use std::collections::VecDeque;

use log::{debug, error};
use serde::Serialize;

use super::{
    bus::{
        AddrPayload, BusPorts, ReadPayload, Resp, WRespPayload, Word, WritePayload,
        BYTES_PER_REG,
    },
    component::Component,
};
use crate::error::BusError;
use crate::settings::MasterSettings;

/// what the driver asks the master to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// read `beats` consecutive registers
    Read { addr: u64, beats: usize },
    /// write one register per word, `strobe` applies to every beat
    Write { addr: u64, data: Vec<Word>, strobe: u8 },
}

/// # Description
/// the result of one transaction
/// * `data`: the read data, one word per beat, empty for writes
/// * `status`: the first error seen on this transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: u32,
    pub data: Vec<Word>,
    pub status: Result<(), BusError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MasterStatistics {
    pub reads: u64,
    pub writes: u64,
    pub failed_transactions: u64,
    pub protocol_violations: u64,
}

#[derive(Debug)]
struct InFlightRead {
    id: u32,
    addr: u64,
    beats: usize,
    data: Vec<Word>,
    status: Result<(), BusError>,
}

#[derive(Debug)]
struct InFlightWrite {
    id: u32,
    addr: u64,
    header: Option<AddrPayload>,
    beats: VecDeque<WritePayload>,
}

/// # Description
/// the bus master
/// # Fields
/// * `ports`: the master side channels, the system moves them to and from the slave
/// * `queue`: transactions not issued yet, issued in order
/// * `read` / `write`: at most one transaction in flight per direction
/// * `awaiting_resp`: id and address of the writes whose beats are all sent and wait for
///   their response
#[derive(Debug)]
pub struct BusMaster {
    pub ports: BusPorts,
    use_write_responses: bool,
    queue: VecDeque<(u32, Transaction)>,
    next_id: u32,
    read: Option<InFlightRead>,
    write: Option<InFlightWrite>,
    awaiting_resp: VecDeque<(u32, u64)>,
    completions: VecDeque<Completion>,
    stats: MasterStatistics,
}

impl Component for BusMaster {
    /// # Description
    /// 1. issue the head of the queue if its direction is free
    /// 2. send one write beat
    /// 3. collect the read beats and write responses
    fn cycle(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.issue();
        self.send_write_beat();
        while let Some(beat) = self.ports.r.pop_nb() {
            self.receive_read_beat(beat);
        }
        while let Some(resp) = self.ports.b.pop_nb() {
            self.receive_write_resp(resp);
        }
        Ok(())
    }
}

impl BusMaster {
    pub fn new(settings: &MasterSettings, use_write_responses: bool) -> Self {
        BusMaster {
            ports: BusPorts::new(settings.read_channel_depth, settings.write_channel_depth),
            use_write_responses,
            queue: VecDeque::new(),
            next_id: 0,
            read: None,
            write: None,
            awaiting_resp: VecDeque::new(),
            completions: VecDeque::new(),
            stats: MasterStatistics::default(),
        }
    }

    /// # Description
    /// queue a transaction, returns the id its completion will carry
    /// - a transaction that does not fit one burst is never sent, it completes at once
    ///   with `BusError::BurstLength`
    pub fn submit(&mut self, transaction: Transaction) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        debug!("submit {}: {:?}", id, transaction);
        let beats = match &transaction {
            Transaction::Read { beats, .. } => *beats,
            Transaction::Write { data, .. } => data.len(),
        };
        if !(1..=MAX_BURST_BEATS).contains(&beats) {
            self.complete(id, vec![], Err(BusError::BurstLength { id, beats }));
            return id;
        }
        self.queue.push_back((id, transaction));
        id
    }

    pub fn pop_completion(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    /// nothing queued, nothing in flight, nothing left on the ports
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
            && self.read.is_none()
            && self.write.is_none()
            && self.awaiting_resp.is_empty()
            && self.ports.is_quiet()
    }

    pub fn stats(&self) -> &MasterStatistics {
        &self.stats
    }

    fn issue(&mut self) {
        let ready = match self.queue.front() {
            Some((_, Transaction::Read { .. })) => self.read.is_none() && !self.ports.ar.is_full(),
            Some((_, Transaction::Write { .. })) => self.write.is_none(),
            None => false,
        };
        if !ready {
            return;
        }
        match self.queue.pop_front() {
            Some((id, Transaction::Read { addr, beats })) => {
                let header = AddrPayload {
                    id,
                    addr,
                    len: burst_len(beats),
                };
                // cannot fail, checked above
                let _ = self.ports.ar.push_nb(header);
                debug!("sent read request: {:?}", header);
                self.stats.reads += 1;
                self.read = Some(InFlightRead {
                    id,
                    addr,
                    beats: usize::from(header.len) + 1,
                    data: Vec::with_capacity(beats),
                    status: Ok(()),
                });
            }
            Some((id, Transaction::Write { addr, data, strobe })) => {
                let len = burst_len(data.len());
                let beats = data
                    .iter()
                    .enumerate()
                    .map(|(i, &data)| WritePayload {
                        data,
                        strobe,
                        last: i == usize::from(len),
                    })
                    .collect();
                self.stats.writes += 1;
                self.write = Some(InFlightWrite {
                    id,
                    addr,
                    header: Some(AddrPayload { id, addr, len }),
                    beats,
                });
            }
            None => {}
        }
    }

    fn send_write_beat(&mut self) {
        let write = match self.write.as_mut() {
            Some(write) => write,
            None => return,
        };
        if let Some(header) = write.header {
            if self.ports.aw.push_nb(header).is_ok() {
                debug!("sent write request: {:?}", header);
                write.header = None;
            }
            return;
        }
        if let Some(&beat) = write.beats.front() {
            if self.ports.w.push_nb(beat).is_ok() {
                debug!("sent write data of {}: {:?}", write.id, beat);
                write.beats.pop_front();
            }
        }
        if write.beats.is_empty() {
            let (id, addr) = (write.id, write.addr);
            self.write = None;
            if self.use_write_responses {
                self.awaiting_resp.push_back((id, addr));
            } else {
                self.complete(id, vec![], Ok(()));
            }
        }
    }

    fn receive_read_beat(&mut self, beat: ReadPayload) {
        let read = match self.read.as_mut() {
            Some(read) if read.id == beat.id => read,
            _ => {
                self.violation(beat.id, "read beat for a transaction that is not in flight");
                return;
            }
        };
        let addr = read.addr + read.data.len() as u64 * BYTES_PER_REG;
        read.data.push(beat.data);
        if beat.resp == Resp::SlvErr && read.status.is_ok() {
            read.status = Err(BusError::AddressRange { addr });
        }
        let received = read.data.len();
        if !beat.last && received < read.beats {
            return;
        }
        let mut read = match self.read.take() {
            Some(read) => read,
            None => return,
        };
        if !beat.last || received != read.beats {
            let reason = format!(
                "read burst ended after {} beats with last={}, {} beats expected",
                received, beat.last, read.beats
            );
            error!("transaction {}: {}", read.id, reason);
            self.stats.protocol_violations += 1;
            read.status = Err(BusError::ProtocolViolation { id: read.id, reason });
        }
        self.complete(read.id, read.data, read.status);
    }

    fn receive_write_resp(&mut self, resp: WRespPayload) {
        let addr = match self.awaiting_resp.front() {
            Some(&(id, addr)) if id == resp.id => addr,
            _ => {
                self.violation(resp.id, "write response out of order or unexpected");
                return;
            }
        };
        self.awaiting_resp.pop_front();
        // the response covers the whole burst, report its start address
        let status = match resp.resp {
            Resp::Okay => Ok(()),
            Resp::SlvErr => Err(BusError::AddressRange { addr }),
        };
        self.complete(resp.id, vec![], status);
    }

    fn violation(&mut self, id: u32, reason: &str) {
        error!("transaction {}: {}", id, reason);
        self.stats.protocol_violations += 1;
    }

    fn complete(&mut self, id: u32, data: Vec<Word>, status: Result<(), BusError>) {
        if let Err(e) = &status {
            error!("transaction {} failed: {}", id, e);
            self.stats.failed_transactions += 1;
        }
        self.completions.push_back(Completion { id, data, status });
    }
}

/// the most beats one header can announce
pub const MAX_BURST_BEATS: usize = 256;

/// `len` of a header is the number of beats minus one, `beats` is checked by `submit`
fn burst_len(beats: usize) -> u8 {
    (beats - 1) as u8
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::accelerator::bus::FULL_STROBE;

    fn master() -> BusMaster {
        BusMaster::new(&MasterSettings::default(), true)
    }

    #[test]
    fn test_write_header_then_beats() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = master();
        let id = m.submit(Transaction::Write {
            addr: 16,
            data: vec![1, 2],
            strobe: FULL_STROBE,
        });
        m.cycle()?;
        assert_eq!(
            m.ports.aw.pop_nb(),
            Some(AddrPayload { id, addr: 16, len: 1 })
        );
        m.cycle()?;
        m.cycle()?;
        let beats: Vec<_> = std::iter::from_fn(|| m.ports.w.pop_nb()).collect();
        assert_eq!(beats.iter().map(|b| b.data).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(beats.iter().map(|b| b.last).collect::<Vec<_>>(), vec![false, true]);
        // waits for the response
        assert!(m.pop_completion().is_none());
        m.ports.b.push_nb(WRespPayload { id, resp: Resp::Okay }).unwrap();
        m.cycle()?;
        assert_eq!(
            m.pop_completion(),
            Some(Completion { id, data: vec![], status: Ok(()) })
        );
        assert!(m.is_idle());
        Ok(())
    }

    #[test]
    fn test_read_with_error_beat() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = master();
        let id = m.submit(Transaction::Read { addr: 96, beats: 3 });
        m.cycle()?;
        assert_eq!(m.ports.ar.pop_nb().map(|h| h.len), Some(2));
        for (i, resp) in [Resp::Okay, Resp::Okay, Resp::SlvErr].into_iter().enumerate() {
            m.ports
                .r
                .push_nb(ReadPayload { id, data: i as u64, resp, last: i == 2 })
                .unwrap();
            m.cycle()?;
        }
        let completion = m.pop_completion().unwrap();
        assert_eq!(completion.data, vec![0, 1, 2]);
        assert_eq!(completion.status, Err(BusError::AddressRange { addr: 112 }));
        assert_eq!(m.stats().failed_transactions, 1);
        assert_eq!(m.stats().protocol_violations, 0);
        Ok(())
    }

    #[test]
    fn test_unexpected_responses_are_violations() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = master();
        m.ports
            .b
            .push_nb(WRespPayload { id: 9, resp: Resp::Okay })
            .unwrap();
        m.cycle()?;
        let id = m.submit(Transaction::Read { addr: 0, beats: 2 });
        m.cycle()?;
        assert!(m.ports.ar.pop_nb().is_some());
        // the slave ends the burst one beat early
        m.ports
            .r
            .push_nb(ReadPayload { id, data: 5, resp: Resp::Okay, last: true })
            .unwrap();
        m.cycle()?;
        let completion = m.pop_completion().unwrap();
        assert!(matches!(
            completion.status,
            Err(BusError::ProtocolViolation { .. })
        ));
        assert_eq!(m.stats().protocol_violations, 2);
        // the next transaction is not affected
        let id = m.submit(Transaction::Read { addr: 0, beats: 1 });
        m.cycle()?;
        m.ports
            .r
            .push_nb(ReadPayload { id, data: 6, resp: Resp::Okay, last: true })
            .unwrap();
        m.cycle()?;
        assert_eq!(m.pop_completion().map(|c| c.status), Some(Ok(())));
        Ok(())
    }

    #[test]
    fn test_write_error_reports_burst_address() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = master();
        let id = m.submit(Transaction::Write {
            addr: 160,
            data: vec![7],
            strobe: FULL_STROBE,
        });
        for _ in 0..3 {
            m.cycle()?;
        }
        assert!(m.ports.aw.pop_nb().is_some());
        assert!(m.ports.w.pop_nb().is_some());
        m.ports
            .b
            .push_nb(WRespPayload { id, resp: Resp::SlvErr })
            .unwrap();
        m.cycle()?;
        assert_eq!(
            m.pop_completion().map(|c| c.status),
            Some(Err(BusError::AddressRange { addr: 160 }))
        );
        assert_eq!(m.stats().failed_transactions, 1);
        assert_eq!(m.stats().protocol_violations, 0);
        Ok(())
    }

    #[test]
    fn test_burst_length_edges() -> Result<(), Box<dyn std::error::Error>> {
        let mut m = master();
        let empty = m.submit(Transaction::Write {
            addr: 12,
            data: vec![],
            strobe: FULL_STROBE,
        });
        let long = m.submit(Transaction::Write {
            addr: 0,
            data: vec![0; MAX_BURST_BEATS + 1],
            strobe: FULL_STROBE,
        });
        let no_beats = m.submit(Transaction::Read { addr: 0, beats: 0 });
        let long_read = m.submit(Transaction::Read {
            addr: 0,
            beats: MAX_BURST_BEATS + 1,
        });
        for (id, beats) in [(empty, 0), (long, 257), (no_beats, 0), (long_read, 257)] {
            assert_eq!(
                m.pop_completion(),
                Some(Completion {
                    id,
                    data: vec![],
                    status: Err(BusError::BurstLength { id, beats }),
                })
            );
        }
        // nothing reaches the bus
        m.cycle()?;
        m.cycle()?;
        assert!(m.ports.aw.is_empty() && m.ports.ar.is_empty());
        assert!(m.is_idle());
        assert_eq!(m.stats().failed_transactions, 4);
        assert_eq!(m.stats().writes + m.stats().reads, 0);

        // the largest burst still goes out whole
        let id = m.submit(Transaction::Read {
            addr: 0,
            beats: MAX_BURST_BEATS,
        });
        m.cycle()?;
        assert_eq!(
            m.ports.ar.pop_nb(),
            Some(AddrPayload { id, addr: 0, len: 255 })
        );
        Ok(())
    }
}
