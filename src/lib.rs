//! the crate fir_accel is a cycle-level model of a register-mapped FIR accelerator.
//! there are 5 parts in the crate:
//!
//! - accelerator: the register slave, the arbiter, the FIR engine and the harness master/driver.
//! - settings: the layered toml configuration.
//! - stimulus: the taps/inputs files and the software reference filter.
//! - sim_result: the result statistics to record the result.
//! - error: the error types shared by all parts.
//!

pub mod accelerator;
pub mod cmd_args;
pub mod error;
pub mod settings;
pub mod sim_result;
pub mod stimulus;

pub use accelerator::System;
pub use error::SimError;
pub use settings::Settings;
pub use sim_result::{FirSimResult, SimStatistics};
pub use stimulus::Stimulus;
