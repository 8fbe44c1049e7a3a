//! the scripted software side of the accelerator
//!
//! the driver replays the polling handshake of the bare-metal program: it hands one
//! transaction at a time to the bus master and waits for its completion before the next.

use log::{debug, error, info};

use super::{
    bus::{Word, BYTES_PER_REG},
    bus_master::{Completion, Transaction},
    fir_engine::{pack_registers, unpack_lanes, GROUPS},
};
use crate::error::BusError;
use crate::settings::FirSettings;
use crate::stimulus::Stimulus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStep {
    /// write `words` to consecutive registers starting at `register`
    Write { register: usize, words: Vec<Word> },
    /// read `count` registers, the lanes of each word are captured as output samples
    Read { register: usize, count: usize },
    /// read `register` until it holds `value`
    Poll { register: usize, value: Word },
}

/// # Description
/// * `Ready`: the next step can be issued
/// * `Waiting`: the transaction with this id is in flight
/// * `Finished`: the script is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Ready,
    Waiting(u32),
    Finished,
}

#[derive(Debug)]
pub struct Driver {
    pub state: DriverState,
    script: Vec<DriverStep>,
    cursor: usize,
    base_address: u64,
    strobe: u8,
    outputs: Vec<i16>,
    polls: u64,
    errors: Vec<BusError>,
}

impl Driver {
    pub fn new(script: Vec<DriverStep>, base_address: u64, strobe: u8) -> Self {
        let state = if script.is_empty() {
            DriverState::Finished
        } else {
            DriverState::Ready
        };
        Driver {
            state,
            script,
            cursor: 0,
            base_address,
            strobe,
            outputs: vec![],
            polls: 0,
            errors: vec![],
        }
    }

    /// # Description
    /// the handshake for every batch of the stimulus
    /// 1. write the taps once
    /// 2. per batch: write the inputs, reset the status, re-arm the control register if it
    ///    still holds the start code, write the start code, poll for the done code, read the outputs
    /// 3. write the shutdown code
    pub fn fir_program(stimulus: &Stimulus, fir: &FirSettings) -> Vec<DriverStep> {
        let mut script = vec![DriverStep::Write {
            register: fir.tap_register_base,
            words: pack_registers(&stimulus.taps),
        }];
        for (i, batch) in stimulus.batches().enumerate() {
            script.push(DriverStep::Write {
                register: fir.input_register_base,
                words: pack_registers(batch),
            });
            script.push(DriverStep::Write {
                register: fir.status_register,
                words: vec![fir.reset_status_code],
            });
            if i > 0 && !fir.shares_control_and_status() {
                script.push(DriverStep::Write {
                    register: fir.control_register,
                    words: vec![fir.done_code],
                });
            }
            script.push(DriverStep::Write {
                register: fir.control_register,
                words: vec![fir.start_code],
            });
            script.push(DriverStep::Poll {
                register: fir.status_register,
                value: fir.done_code,
            });
            script.push(DriverStep::Read {
                register: fir.output_register_base,
                count: GROUPS,
            });
        }
        script.push(DriverStep::Write {
            register: fir.control_register,
            words: vec![fir.shutdown_code],
        });
        script
    }

    fn address(&self, register: usize) -> u64 {
        self.base_address + register as u64 * BYTES_PER_REG
    }

    /// the transaction of the current step, None while waiting or finished
    pub fn next_transaction(&self) -> Option<Transaction> {
        if self.state != DriverState::Ready {
            return None;
        }
        let transaction = match &self.script[self.cursor] {
            DriverStep::Write { register, words } => Transaction::Write {
                addr: self.address(*register),
                data: words.clone(),
                strobe: self.strobe,
            },
            DriverStep::Read { register, count } => Transaction::Read {
                addr: self.address(*register),
                beats: *count,
            },
            DriverStep::Poll { register, .. } => Transaction::Read {
                addr: self.address(*register),
                beats: 1,
            },
        };
        Some(transaction)
    }

    /// the master accepted the current step under `id`
    pub fn issued(&mut self, id: u32) {
        assert_eq!(self.state, DriverState::Ready, "issue while not ready");
        self.state = DriverState::Waiting(id);
    }

    /// # Description
    /// take the completion of the step in flight
    /// - a failed step is recorded and skipped, a failed poll is retried
    pub fn complete(&mut self, completion: Completion) {
        match self.state {
            DriverState::Waiting(id) if id == completion.id => {}
            _ => {
                error!(
                    "driver got completion {} while {:?}, dropped",
                    completion.id, self.state
                );
                return;
            }
        }
        let failed = match completion.status {
            Err(e) => {
                error!("driver step {} failed: {}", self.cursor, e);
                self.errors.push(e);
                true
            }
            Ok(()) => false,
        };
        let step_done = match &self.script[self.cursor] {
            DriverStep::Write { .. } => true,
            DriverStep::Read { .. } => {
                if !failed {
                    self.outputs
                        .extend(completion.data.iter().flat_map(|&w| unpack_lanes(w)));
                }
                true
            }
            DriverStep::Poll { value, .. } => {
                self.polls += 1;
                let done = !failed && completion.data.first() == Some(value);
                if !done {
                    debug!("poll {}: {:x?}", self.polls, completion.data);
                }
                done
            }
        };
        if step_done {
            self.cursor += 1;
        }
        self.state = if self.cursor == self.script.len() {
            info!("driver finished after {} polls", self.polls);
            DriverState::Finished
        } else {
            DriverState::Ready
        };
    }

    pub fn finished(&self) -> bool {
        self.state == DriverState::Finished
    }

    pub fn outputs(&self) -> &[i16] {
        &self.outputs
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn errors(&self) -> &[BusError] {
        &self.errors
    }
}
