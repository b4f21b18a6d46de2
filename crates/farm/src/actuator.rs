//! Feedback controller holding the mean service time of an application within a target band.

use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};

use dslab_core::{cast, log_debug, log_warn, Event, EventHandler, Id, SimulationContext};

use crate::{application::ControlParams, core::Core, cpu::Cpu, message::AppId, message::ResponseArrival};

/// How an actuator changes the clock speed of the cores assigned to its application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// Set the clock speed of each assigned core directly.
    Direct,
    /// Ask the cpu of each assigned core to arbitrate the change.
    Arbitrated,
    /// Set the clock speed of all cores of each cpu owning an assigned core.
    PerCpu,
}

/// Target of actuator commands.
#[derive(Clone)]
pub enum ControlEndpoint {
    Core(Rc<RefCell<Core>>),
    ArbitratedCore(Rc<RefCell<Core>>),
    Cpu(Rc<RefCell<Cpu>>),
}

/// Outcome of comparing a mean service time with the target band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlDecision {
    SpeedUp,
    SlowDown,
    Hold,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ActuatorStats {
    /// Mean service times received.
    pub observations: u64,
    /// Commands sent to endpoints.
    pub commands_issued: u64,
    /// Commands refused by endpoints.
    pub commands_failed: u64,
    /// Observations inside the band.
    pub holds: u64,
}

pub struct Actuator {
    app_id: AppId,
    params: ControlParams,
    endpoints: Vec<ControlEndpoint>,
    stats: ActuatorStats,
    ctx: SimulationContext,
}

impl Actuator {
    pub fn new(app_id: AppId, params: ControlParams, endpoints: Vec<ControlEndpoint>, ctx: SimulationContext) -> Self {
        Self {
            app_id,
            params,
            endpoints,
            stats: ActuatorStats::default(),
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn params(&self) -> ControlParams {
        self.params
    }

    pub fn stats(&self) -> &ActuatorStats {
        &self.stats
    }

    pub fn decide(&self, mean_service_time: f64) -> ControlDecision {
        if mean_service_time > self.params.target + self.params.flex {
            ControlDecision::SpeedUp
        } else if mean_service_time < self.params.target - self.params.flex {
            ControlDecision::SlowDown
        } else {
            ControlDecision::Hold
        }
    }

    /// Reacts to a new mean service time reported by the dispatcher.
    pub fn on_mean_service_time(&mut self, mean_service_time: f64) {
        self.stats.observations += 1;
        let delta = match self.decide(mean_service_time) {
            ControlDecision::SpeedUp => self.params.step,
            ControlDecision::SlowDown => -self.params.step,
            ControlDecision::Hold => {
                self.stats.holds += 1;
                return;
            }
        };
        log_debug!(
            self.ctx,
            "app {}: mean service time {:.3} vs target {} ± {}, changing speed by {}",
            self.app_id,
            mean_service_time,
            self.params.target,
            self.params.flex,
            delta
        );
        for endpoint in self.endpoints.iter() {
            self.stats.commands_issued += 1;
            let result = match endpoint {
                ControlEndpoint::Core(core) => {
                    let speed = core.borrow().clock_speed() + delta;
                    let result = core.borrow_mut().set_clock_speed(speed);
                    result.map_err(|e| e.to_string())
                }
                ControlEndpoint::ArbitratedCore(core) => {
                    let core = core.borrow();
                    core.request_rate_change(core.clock_speed() + delta)
                        .map_err(|e| e.to_string())
                }
                ControlEndpoint::Cpu(cpu) => {
                    let speed = cpu.borrow().top_clock_speed() + delta;
                    let result = cpu.borrow_mut().set_all_cores_speed(speed);
                    result.map_err(|e| e.to_string())
                }
            };
            if let Err(e) = result {
                self.stats.commands_failed += 1;
                log_warn!(self.ctx, "app {}: control command failed: {}", self.app_id, e);
            }
        }
    }
}

impl EventHandler for Actuator {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            ResponseArrival { response } => {
                self.on_mean_service_time(response.duration);
            }
        })
    }
}
