//! the FIR unit
//!
//! the engine never touches the bank directly: it reads the mirror of the bank published at
//! the end of the previous cycle, and writes through its outbox into the internal write channel.

use log::{debug, info, warn};
use serde::Serialize;

use super::{
    bus::Word,
    component::Component,
    internal_channel::{InternalWrite, Outbox},
    register_bank::RegisterSnapshot,
};
use crate::settings::FirSettings;

pub const TAPS: usize = 16;
/// 16 bit lanes in one register
pub const LANES: usize = 4;
/// registers needed for `TAPS` lanes
pub const GROUPS: usize = TAPS / LANES;

/// # Description
/// the state of the engine, one step per cycle
/// * `Idle`: watch the control register for a change to the start code
/// * `DrainResults(k)`: push the k-th packed output register
/// * `SignalDone`: push the done code to the status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirState {
    Idle,
    LoadWeights,
    ShiftWindow,
    Compute,
    DrainResults(usize),
    SignalDone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FirStatistics {
    pub runs: u64,
    pub busy_cycles: u64,
    pub sequencing_hazards: u64,
}

#[derive(Debug)]
pub struct FirEngine {
    pub state: FirState,
    settings: FirSettings,
    weights: [i16; TAPS],
    input_window: [i16; 2 * TAPS],
    outputs: [i16; 2 * TAPS],
    last_control: Word,
    halted: bool,
    mirror: RegisterSnapshot,
    pub outbox: Outbox,
    stats: FirStatistics,
}

impl Component for FirEngine {
    fn cycle(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let control = self.mirror[self.settings.control_register];
        if self.state != FirState::Idle {
            self.stats.busy_cycles += 1;
            self.watch_for_hazard(control);
        }
        match self.state {
            FirState::Idle => {
                if self.halted || control == self.last_control {
                    return Ok(());
                }
                debug!(
                    "control register changed {:#x} -> {:#x}",
                    self.last_control, control
                );
                self.last_control = control;
                if control == self.settings.shutdown_code {
                    info!("FIR unit received the shutdown code, halting");
                    self.halted = true;
                } else if control == self.settings.start_code {
                    debug!("FIR start");
                    self.state = FirState::LoadWeights;
                }
            }
            FirState::LoadWeights => {
                self.weights = unpack_registers(&self.mirror, self.settings.tap_register_base);
                self.state = FirState::ShiftWindow;
            }
            FirState::ShiftWindow => {
                self.input_window.copy_within(TAPS.., 0);
                let inputs = unpack_registers(&self.mirror, self.settings.input_register_base);
                self.input_window[TAPS..].copy_from_slice(&inputs);
                self.state = FirState::Compute;
            }
            FirState::Compute => {
                self.outputs = convolve(&self.weights, &self.input_window);
                self.state = FirState::DrainResults(0);
            }
            FirState::DrainResults(k) => {
                let start = TAPS + k * LANES;
                let mut lanes = [0i16; LANES];
                lanes.copy_from_slice(&self.outputs[start..start + LANES]);
                let write =
                    InternalWrite::new(self.settings.output_register_base + k, pack_lanes(lanes));
                if self.outbox.push(write).is_ok() {
                    debug!("FIR drained group {}: {:?}", k, write);
                    self.state = if k + 1 == GROUPS {
                        FirState::SignalDone
                    } else {
                        FirState::DrainResults(k + 1)
                    };
                }
            }
            FirState::SignalDone => {
                let write =
                    InternalWrite::new(self.settings.status_register, self.settings.done_code);
                if self.outbox.push(write).is_ok() {
                    self.stats.runs += 1;
                    debug!("FIR run {} done", self.stats.runs);
                    self.state = FirState::Idle;
                }
            }
        }
        Ok(())
    }
}

impl FirEngine {
    pub fn new(settings: FirSettings, num_reg: usize) -> FirEngine {
        FirEngine {
            state: FirState::Idle,
            settings,
            weights: [0; TAPS],
            input_window: [0; 2 * TAPS],
            outputs: [0; 2 * TAPS],
            last_control: 0,
            halted: false,
            mirror: super::register_bank::RegisterBank::new(num_reg).snapshot(),
            outbox: Outbox::new(),
            stats: FirStatistics::default(),
        }
    }

    /// # Description
    /// hand the engine the bank as committed at the end of the last cycle
    pub fn observe(&mut self, snapshot: RegisterSnapshot) {
        self.mirror = snapshot;
    }

    /// a new start edge while busy is out of contract, report it and keep going
    fn watch_for_hazard(&mut self, control: Word) {
        if control == self.last_control {
            return;
        }
        if control == self.settings.start_code {
            warn!(
                "sequencing hazard: start code written while the FIR unit is in {:?}, ignored",
                self.state
            );
            self.stats.sequencing_hazards += 1;
        }
        self.last_control = control;
    }

    pub fn is_idle(&self) -> bool {
        self.state == FirState::Idle && self.outbox.is_free()
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn input_window(&self) -> &[i16; 2 * TAPS] {
        &self.input_window
    }

    pub fn outputs(&self) -> &[i16; 2 * TAPS] {
        &self.outputs
    }

    pub fn stats(&self) -> &FirStatistics {
        &self.stats
    }
}

/// # Description
/// `out[n] = sum(w[m] * window[n + m - TAPS + 1])` over the taps whose window index is not
/// negative, wrapping at 16 bits
pub fn convolve(weights: &[i16; TAPS], window: &[i16; 2 * TAPS]) -> [i16; 2 * TAPS] {
    let mut out = [0i16; 2 * TAPS];
    for (n, o) in out.iter_mut().enumerate() {
        for (m, &w) in weights.iter().enumerate() {
            if let Some(idx) = (n + m + 1).checked_sub(TAPS) {
                *o = o.wrapping_add(w.wrapping_mul(window[idx]));
            }
        }
    }
    out
}

/// # Description
/// lane `i` goes to bits `16*i..16*i+16`
/// # Example
/// ```
/// use fir_accel::accelerator::fir_engine::{pack_lanes, unpack_lanes};
/// assert_eq!(pack_lanes([1, 2, 3, -1]), 0xffff_0003_0002_0001);
/// assert_eq!(unpack_lanes(0xffff_0003_0002_0001), [1, 2, 3, -1]);
/// ```
pub fn pack_lanes(lanes: [i16; LANES]) -> Word {
    lanes
        .iter()
        .enumerate()
        .fold(0, |word, (i, &lane)| word | (u64::from(lane as u16) << (16 * i)))
}

pub fn unpack_lanes(word: Word) -> [i16; LANES] {
    let mut lanes = [0i16; LANES];
    for (i, lane) in lanes.iter_mut().enumerate() {
        *lane = (word >> (16 * i)) as u16 as i16;
    }
    lanes
}

/// read `GROUPS` consecutive registers starting at `base` as `TAPS` samples
pub fn unpack_registers(snapshot: &RegisterSnapshot, base: usize) -> [i16; TAPS] {
    let mut samples = [0i16; TAPS];
    for (g, chunk) in samples.chunks_mut(LANES).enumerate() {
        chunk.copy_from_slice(&unpack_lanes(snapshot[base + g]));
    }
    samples
}

/// the inverse of `unpack_registers`
pub fn pack_registers(samples: &[i16]) -> Vec<Word> {
    samples
        .chunks(LANES)
        .map(|chunk| {
            let mut lanes = [0i16; LANES];
            lanes[..chunk.len()].copy_from_slice(chunk);
            pack_lanes(lanes)
        })
        .collect()
}
