use super::{
    bus::transfer,
    bus_master::BusMaster,
    component::Component,
    driver::{Driver, DriverStep},
    fir_engine::FirEngine,
    reg_slave::RegisterSlave,
};

use log::{debug, error, info};

use crate::error::SimError;
use crate::settings::Settings;
use crate::sim_result::SimStatistics;
use crate::stimulus::{self, Stimulus};

/// # Description
/// the state for the system
/// * `Working` means the driver still has steps or something is still in flight
/// * `Finished` means the driver is done and every component is quiet
#[derive(Debug, PartialEq)]
enum SystemState {
    Working,
    Finished,
}

/// # Description
/// the whole accelerator plus the software that drives it
/// # Fields
/// * `master`: the local bus master, the only way the driver reaches the bank
/// * `slave`: the register slave, owns the bank
/// * `engine`: the FIR unit, reads the bank through its mirror and writes through the internal channel
/// * `driver`: the scripted software
/// * `expected`: the output of the software filter, when built from a stimulus
#[derive(Debug)]
pub struct System {
    state: SystemState,
    total_cycle: u64,
    max_cycles: u64,
    master: BusMaster,
    slave: RegisterSlave,
    engine: FirEngine,
    driver: Driver,
    expected: Option<Vec<i16>>,
}

impl Component for System {
    /// # Description
    /// one tick of the whole system, every component steps once in this order:
    /// 1. the master issues and collects, then its channels move to the slave
    /// 2. the engine steps on the mirror of the last tick, its outbox moves to the internal channel
    /// 3. the slave serves one bank access, then its responses move to the master
    /// 4. the bank is published to the engine and the driver reacts to completions
    /// * will ***NOT*** update the cycle
    fn cycle(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.state {
            SystemState::Working => {
                self.master.cycle()?;
                self.handle_master_to_slave()?;

                self.engine.cycle()?;
                self.handle_engine_to_slave()?;

                self.slave.cycle()?;
                self.handle_slave_to_master()?;

                self.handle_publish()?;
                self.handle_driver()?;
                self.handle_finish()?;
            }
            SystemState::Finished => {}
        }
        Ok(())
    }
}

impl System {
    /// build the system that runs the FIR handshake for every batch of `stimulus`
    pub fn new(settings: &Settings, stimulus: &Stimulus) -> Result<System, SimError> {
        let script = Driver::fir_program(stimulus, &settings.fir_settings);
        let mut system = System::with_script(settings, script)?;
        system.expected = Some(stimulus.reference());
        Ok(system)
    }

    /// build the system around any driver script
    pub fn with_script(settings: &Settings, script: Vec<DriverStep>) -> Result<System, SimError> {
        settings.validate()?;
        let acc = &settings.accelerator_settings;
        let master_settings = &settings.master_settings;
        let master = BusMaster::new(master_settings, acc.use_write_responses);
        let slave = RegisterSlave::new(
            acc,
            master_settings.read_channel_depth,
            master_settings.write_channel_depth,
        );
        let engine = FirEngine::new(settings.fir_settings.clone(), acc.num_reg);
        let driver = Driver::new(script, acc.base_address, master_settings.write_strobe);
        Ok(System {
            state: SystemState::Working,
            total_cycle: 0,
            max_cycles: acc.max_cycles,
            master,
            slave,
            engine,
            driver,
            expected: None,
        })
    }

    /// keep running until all finished
    /// * for each cycle, it will call the cycle function
    /// * and increase the total_cycle
    /// * fails with `SimError::CycleLimit` when `max_cycles` is reached first
    pub fn run(&mut self) -> Result<SimStatistics, Box<dyn std::error::Error>> {
        debug!("start running");
        while !self.finished() {
            if self.total_cycle >= self.max_cycles {
                return Err(SimError::CycleLimit {
                    cycles: self.total_cycle,
                }
                .into());
            }
            self.cycle()?;
            self.total_cycle += 1;
        }
        self.print_stats();
        Ok(self.statistics())
    }

    pub fn finished(&self) -> bool {
        self.state == SystemState::Finished
    }

    pub fn total_cycle(&self) -> u64 {
        self.total_cycle
    }

    pub fn slave(&self) -> &RegisterSlave {
        &self.slave
    }

    pub fn engine(&self) -> &FirEngine {
        &self.engine
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn statistics(&self) -> SimStatistics {
        let outputs = self.driver.outputs().to_vec();
        let total_error = self.expected.as_ref().and_then(|expected| {
            let total_error = stimulus::total_error(&outputs, expected);
            if total_error.is_none() {
                error!(
                    "{} outputs read back, {} expected, no total error",
                    outputs.len(),
                    expected.len()
                );
            }
            total_error
        });
        SimStatistics {
            cycle: self.total_cycle,
            simulation_time: String::new(),
            fir: self.engine.stats().clone(),
            slave: self.slave.stats().clone(),
            grants: self.slave.arbiter().grants().clone(),
            master: self.master.stats().clone(),
            polls: self.driver.polls(),
            driver_errors: self.driver.errors().len(),
            outputs,
            total_error,
        }
    }

    fn print_stats(&self) {
        info!("Total cycles: {}", self.total_cycle);
        info!(
            "FIR runs: {}, sequencing hazards: {}",
            self.engine.stats().runs,
            self.engine.stats().sequencing_hazards
        );
        info!("grants: {:?}", self.slave.arbiter().grants());
    }

    fn handle_master_to_slave(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        transfer(&mut self.master.ports.ar, &mut self.slave.ports.ar);
        transfer(&mut self.master.ports.aw, &mut self.slave.ports.aw);
        transfer(&mut self.master.ports.w, &mut self.slave.ports.w);
        Ok(())
    }

    /// the outbox only moves when the internal channel has room, otherwise the engine waits
    fn handle_engine_to_slave(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.slave.reg_in.is_full() {
            return Ok(());
        }
        if let Some(write) = self.engine.outbox.take() {
            // cannot fail, checked above
            let _ = self.slave.reg_in.push_nb(write);
        }
        Ok(())
    }

    fn handle_slave_to_master(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        transfer(&mut self.slave.ports.r, &mut self.master.ports.r);
        transfer(&mut self.slave.ports.b, &mut self.master.ports.b);
        Ok(())
    }

    fn handle_publish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.engine.observe(self.slave.publish());
        Ok(())
    }

    fn handle_driver(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(completion) = self.master.pop_completion() {
            self.driver.complete(completion);
        }
        if let Some(transaction) = self.driver.next_transaction() {
            let id = self.master.submit(transaction);
            self.driver.issued(id);
        }
        Ok(())
    }

    fn handle_finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.driver.finished()
            && self.master.is_idle()
            && self.slave.is_idle()
            && self.engine.is_idle()
        {
            debug!("all finished at cycle {}", self.total_cycle);
            self.state = SystemState::Finished;
        }
        Ok(())
    }
}
