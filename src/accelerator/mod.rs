//! # Description
//! - this module is the accelerator module
//! - the main sub module is system, all the components are in system
//! - read system.rs for more details
//!
//! # Components
//! - system: owns every component and moves data between them once per cycle
//! - reg_slave: the register bank behind the arbiter, served through bus_adapter and the internal channel
//! - fir_engine: the FIR unit, driven only through the control register
//! - bus_master and driver: the software side, they reach the bank only through the bus
//!

pub mod arbiter;
pub mod bus;
pub mod bus_adapter;
pub mod bus_master;
pub mod component;
pub mod driver;
pub mod fir_engine;
pub mod internal_channel;
pub mod reg_slave;
pub mod register_bank;
pub mod system;
pub use system::System;
