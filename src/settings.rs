use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::string::String;

use crate::accelerator::arbiter::{ArbiterPolicy, Requester};
use crate::accelerator::fir_engine::{GROUPS, LANES};
use crate::error::SimError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub taps_path: String,
    pub inputs_path: String,
    pub accelerator_settings: AcceleratorSettings,
    pub fir_settings: FirSettings,
    pub master_settings: MasterSettings,
}

/// # Description
/// the register slave and its arbiter
/// * `addr_bits_to_inspect`: only the low bits of a bus address are decoded
/// * `internal_channel_depth`: the depth of the fifo between the FIR engine and the bank
/// * `max_cycles`: the run fails with `SimError::CycleLimit` after this many cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorSettings {
    pub num_reg: usize,
    pub base_address: u64,
    pub addr_bits_to_inspect: u32,
    pub use_write_responses: bool,
    pub internal_channel_depth: usize,
    pub arbiter_policy: ArbiterPolicy,
    pub arbiter_order: Vec<Requester>,
    pub max_cycles: u64,
}

/// # Description
/// the register map seen by the FIR engine and the driver
/// - the default puts status on register 0 and control on register 1, like the bare-metal
///   driver does. `configs/optional_configs/shared_control.toml` moves control to register 0
///   for the single control/status register layout
/// - `control_register` and `status_register` may be the same register
/// - each `*_register_base` is the first of four consecutive registers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirSettings {
    pub status_register: usize,
    pub control_register: usize,
    pub tap_register_base: usize,
    pub input_register_base: usize,
    pub output_register_base: usize,
    pub start_code: u64,
    pub done_code: u64,
    pub reset_status_code: u64,
    pub shutdown_code: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterSettings {
    pub read_channel_depth: usize,
    pub write_channel_depth: usize,
    pub write_strobe: u8,
}

impl Settings {
    pub fn new(config_path: Vec<String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        for i in config_path {
            builder = builder.add_source(File::with_name(&i));
        }
        builder.build()?.try_deserialize()
    }

    /// check every register of the map is inside the bank and the arbiter order is usable
    pub fn validate(&self) -> Result<(), SimError> {
        self.accelerator_settings.validate()?;
        self.fir_settings
            .validate(self.accelerator_settings.num_reg)?;
        if self.master_settings.read_channel_depth == 0
            || self.master_settings.write_channel_depth == 0
        {
            return Err(SimError::InvalidSettings(
                "master channel depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl AcceleratorSettings {
    fn validate(&self) -> Result<(), SimError> {
        if self.num_reg == 0 {
            return Err(SimError::InvalidSettings("num_reg must be at least 1".into()));
        }
        if self.addr_bits_to_inspect == 0 || self.addr_bits_to_inspect > 64 {
            return Err(SimError::InvalidSettings(format!(
                "addr_bits_to_inspect must be in 1..=64, got {}",
                self.addr_bits_to_inspect
            )));
        }
        if self.internal_channel_depth == 0 {
            return Err(SimError::InvalidSettings(
                "internal_channel_depth must be at least 1".into(),
            ));
        }
        let mut order = self.arbiter_order.clone();
        order.sort_by_key(|r| r.index());
        order.dedup();
        if order.len() != Requester::ALL.len() || self.arbiter_order.len() != order.len() {
            return Err(SimError::InvalidSettings(format!(
                "arbiter_order must name read, write and internal exactly once, got {:?}",
                self.arbiter_order
            )));
        }
        Ok(())
    }
}

impl FirSettings {
    fn validate(&self, num_reg: usize) -> Result<(), SimError> {
        for (name, reg) in [
            ("status_register", self.status_register),
            ("control_register", self.control_register),
        ] {
            if reg >= num_reg {
                return Err(SimError::InvalidSettings(format!(
                    "{} {} is outside a bank of {} registers",
                    name, reg, num_reg
                )));
            }
        }
        for (name, base) in [
            ("tap_register_base", self.tap_register_base),
            ("input_register_base", self.input_register_base),
            ("output_register_base", self.output_register_base),
        ] {
            if base + GROUPS > num_reg {
                return Err(SimError::InvalidSettings(format!(
                    "{} {} needs {} registers of {} lanes, the bank has {}",
                    name, base, GROUPS, LANES, num_reg
                )));
            }
        }
        if self.start_code == self.shutdown_code {
            return Err(SimError::InvalidSettings(
                "start_code and shutdown_code must differ".into(),
            ));
        }
        Ok(())
    }

    /// one register carries both the control codes and the status codes
    pub fn shares_control_and_status(&self) -> bool {
        self.control_register == self.status_register
    }
}

impl Default for AcceleratorSettings {
    fn default() -> Self {
        AcceleratorSettings {
            num_reg: 14,
            base_address: 0,
            addr_bits_to_inspect: 16,
            use_write_responses: true,
            internal_channel_depth: 1,
            arbiter_policy: ArbiterPolicy::RoundRobin,
            arbiter_order: Requester::ALL.to_vec(),
            max_cycles: 100_000,
        }
    }
}

impl Default for FirSettings {
    fn default() -> Self {
        FirSettings {
            status_register: 0,
            control_register: 1,
            tap_register_base: 2,
            input_register_base: 6,
            output_register_base: 10,
            start_code: 0x02,
            done_code: 0x03,
            reset_status_code: 0x07,
            shutdown_code: 0x0f,
        }
    }
}

impl Default for MasterSettings {
    fn default() -> Self {
        MasterSettings {
            read_channel_depth: 2,
            write_channel_depth: 2,
            write_strobe: 0xff,
        }
    }
}
