//! Time-stepping shell of a particle-in-cell simulation
//!
//! The simulation owns the data (one [`Fields`] structure and any number of
//! [`Species`]) and decides where it lives; the physics of each iteration is
//! supplied by a [`PicCycle`] implementation.
//!
//! ```text
//! step(n, cycle)
//!   ├── send_data_to_device          (device execution enabled)
//!   ├── n × { cycle.advance(ctx); time += dt }
//!   └── receive_data_from_device
//! ```

mod fields;
mod grid;
mod species;

pub use fields::{FieldComponent, Fields};
pub use grid::{adapt_to_grid, LoadingBounds};
pub use species::{ParticleQuantity, Species};

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::residency::{receive_data_from_device, send_data_to_device, DeviceResident, ResidencySet};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Charge or current quantity a deposition writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepositTarget {
    /// Charge density at the start of the step.
    RhoPrev,
    /// Charge density at the end of the step.
    RhoNext,
    /// Current density.
    J,
}

impl FromStr for DepositTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rho_prev" => Ok(DepositTarget::RhoPrev),
            "rho_next" => Ok(DepositTarget::RhoNext),
            "J" => Ok(DepositTarget::J),
            other => Err(Error::InvalidArgument(format!(
                "`{other}` is not a deposition target (expected rho_prev, rho_next or J)"
            ))),
        }
    }
}

impl fmt::Display for DepositTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DepositTarget::RhoPrev => "rho_prev",
            DepositTarget::RhoNext => "rho_next",
            DepositTarget::J => "J",
        })
    }
}

/// What one iteration of the cycle may touch.
pub struct StepContext<'a> {
    pub executor: &'a Executor,
    pub fld: &'a mut Fields,
    pub ptcl: &'a mut [Species],
    pub time: f64,
    pub dt: f64,
    pub iteration: u64,
    /// Whether the data currently lives on the device.
    pub on_device: bool,
}

/// Physics of one PIC iteration: push, deposit, solve.
pub trait PicCycle {
    /// Advance fields and particles by one timestep.
    fn advance(&mut self, ctx: StepContext<'_>) -> Result<()>;

    /// Deposit the particles' charge or current onto the grid.
    fn deposit(&mut self, target: DepositTarget, ctx: StepContext<'_>) -> Result<()> {
        let _ = (target, ctx);
        Ok(())
    }
}

pub struct Simulation {
    pub fld: Fields,
    pub ptcl: Vec<Species>,
    /// Physical time in seconds.
    pub time: f64,
    pub iteration: u64,
    config: SimulationConfig,
    use_device: bool,
    executor: Executor,
}

impl Simulation {
    /// Create a simulation. Device execution is requested through
    /// `config.use_device`; without visible devices it falls back to the host.
    pub fn new(executor: Executor, fld: Fields, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let use_device = if config.use_device {
            let devices = executor.device_count()?;
            if devices == 0 {
                tracing::warn!("device execution requested but no device is visible; running on host");
            }
            devices > 0
        } else {
            false
        };

        Ok(Self {
            fld,
            ptcl: Vec::new(),
            time: 0.0,
            iteration: 0,
            config,
            use_device,
            executor,
        })
    }

    /// Add a species; returns its index in `ptcl`.
    pub fn add_species(&mut self, species: Species) -> usize {
        self.ptcl.push(species);
        self.ptcl.len() - 1
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn context<'a>(&'a mut self, executor: &'a Executor) -> StepContext<'a> {
        let on_device = self.fld.is_on_device();
        StepContext {
            executor,
            fld: &mut self.fld,
            ptcl: &mut self.ptcl,
            time: self.time,
            dt: self.config.dt,
            iteration: self.iteration,
            on_device,
        }
    }

    /// Run `n_steps` iterations of `cycle`.
    ///
    /// With device execution enabled, data is sent to the device first and
    /// brought back once the loop completes. If the cycle fails, the error is
    /// returned and the data stays where it is.
    #[tracing::instrument(skip(self, cycle), fields(start_iteration = self.iteration))]
    pub fn step(&mut self, n_steps: u64, cycle: &mut dyn PicCycle) -> Result<()> {
        let executor = self.executor.clone();
        let start = Instant::now();

        if self.use_device {
            let moved = send_data_to_device(&executor, self)?;
            tracing::debug!(aggregates = moved, "simulation data sent to device");
        }

        for i in 0..n_steps {
            if self.config.show_progress && i % self.config.progress_interval == 0 {
                self.report_progress(i, n_steps, start);
            }
            cycle.advance(self.context(&executor))?;
            self.iteration += 1;
            self.time += self.config.dt;
        }

        if self.use_device {
            let moved = receive_data_from_device(&executor, self)?;
            tracing::debug!(aggregates = moved, "simulation data received from device");
        }

        tracing::info!(
            steps = n_steps,
            iteration = self.iteration,
            time = self.time,
            elapsed_s = start.elapsed().as_secs_f64(),
            "step_complete"
        );
        Ok(())
    }

    fn report_progress(&self, done: u64, total: u64, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        let eta_s = if done == 0 {
            None
        } else {
            Some(elapsed / done as f64 * (total - done) as f64)
        };
        tracing::info!(
            iteration = self.iteration,
            step = done,
            total = total,
            time = self.time,
            elapsed_s = elapsed,
            eta_s = ?eta_s,
            "progress"
        );
    }

    /// Deposit onto the grid; `target` is one of `rho_prev`, `rho_next`, `J`.
    pub fn deposit(&mut self, target: &str, cycle: &mut dyn PicCycle) -> Result<()> {
        let target: DepositTarget = target.parse()?;
        let executor = self.executor.clone();
        cycle.deposit(target, self.context(&executor))
    }
}

impl ResidencySet for Simulation {
    fn use_device(&self) -> bool {
        self.use_device
    }

    /// Fields first, then species in insertion order.
    fn aggregates_mut(&mut self) -> Vec<&mut dyn DeviceResident> {
        let mut all: Vec<&mut dyn DeviceResident> = Vec::with_capacity(1 + self.ptcl.len());
        all.push(&mut self.fld);
        all.extend(self.ptcl.iter_mut().map(|s| s as &mut dyn DeviceResident));
        all
    }

    fn aggregates(&self) -> Vec<&dyn DeviceResident> {
        let mut all: Vec<&dyn DeviceResident> = Vec::with_capacity(1 + self.ptcl.len());
        all.push(&self.fld);
        all.extend(self.ptcl.iter().map(|s| s as &dyn DeviceResident));
        all
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("iteration", &self.iteration)
            .field("time", &self.time)
            .field("species", &self.ptcl.len())
            .field("use_device", &self.use_device)
            .finish()
    }
}
