use crate::accelerator::{
    arbiter::GrantCounts, bus_master::MasterStatistics, fir_engine::FirStatistics,
    reg_slave::SlaveStatistics,
};
use crate::settings::Settings;
use serde::Serialize;

#[derive(Debug, Serialize, Default)]
pub struct FirSimResult {
    pub settings: Option<Settings>,
    pub stats: Option<SimStatistics>,
}

impl FirSimResult {
    pub fn new() -> Self {
        FirSimResult {
            settings: None,
            stats: None,
        }
    }
}

/// # Description
/// everything a run reports
/// * `outputs`: the samples the driver read back, one batch per FIR run
/// * `total_error`: the absolute error against the software filter, None when the
///   run was not built from a stimulus or did not read back every output
#[derive(Debug, Serialize, Default)]
pub struct SimStatistics {
    pub cycle: u64,
    pub simulation_time: String,
    pub fir: FirStatistics,
    pub slave: SlaveStatistics,
    pub grants: GrantCounts,
    pub master: MasterStatistics,
    pub polls: u64,
    pub driver_errors: usize,
    pub outputs: Vec<i16>,
    pub total_error: Option<u64>,
}

impl SimStatistics {
    pub fn new() -> Self {
        SimStatistics::default()
    }
}
