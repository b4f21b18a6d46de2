//! Admission of applications: core allocation and provisioning of their components.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use dslab_core::{log_info, log_warn, Id, SimulationContext};

use crate::{
    actuator::{Actuator, ControlEndpoint, ControlMode},
    application::Application,
    core::Core,
    cpu::Cpu,
    dispatcher::{NegativeSamples, RequestDispatcher},
    error::{AdmissionError, PoolExhausted, ProvisioningError},
    message::AppId,
    provisioner::{ComponentSpec, Provisioned, Provisioner},
};

/// Set of cores not yet assigned to any application.
///
/// Allocation is all-or-nothing: either `n` distinct items leave the pool or the pool is unchanged.
#[derive(Debug)]
pub struct CorePool<T> {
    free: VecDeque<T>,
    assigned: usize,
}

impl<T> CorePool<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            free: items.into_iter().collect(),
            assigned: 0,
        }
    }

    pub fn allocate(&mut self, n: usize) -> Result<Vec<T>, PoolExhausted> {
        if n > self.free.len() {
            return Err(PoolExhausted {
                requested: n,
                available: self.free.len(),
            });
        }
        self.assigned += n;
        Ok(self.free.drain(..n).collect())
    }

    /// Puts back items drawn by a failed admission, keeping their original order at the front of the pool.
    pub fn restore(&mut self, items: Vec<T>) {
        self.assigned -= items.len();
        for item in items.into_iter().rev() {
            self.free.push_front(item);
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned
    }
}

/// A core of the cluster together with the cpu owning it.
#[derive(Clone)]
pub struct CoreSlot {
    pub id: Id,
    pub core: Rc<RefCell<Core>>,
    pub cpu: Rc<RefCell<Cpu>>,
}

impl CoreSlot {
    pub fn new(core: Rc<RefCell<Core>>, cpu: Rc<RefCell<Cpu>>) -> Self {
        let id = core.borrow().id();
        Self { id, core, cpu }
    }
}

fn default_one() -> usize {
    1
}

fn default_control_mode() -> ControlMode {
    ControlMode::Arbitrated
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_one")]
    pub cores_per_vm: usize,
    #[serde(default = "default_one")]
    pub vms_per_dispatcher: usize,
    /// Put virtual machines between the dispatcher and the cores.
    #[serde(default)]
    pub use_virtual_machines: bool,
    #[serde(default = "default_control_mode")]
    pub control_mode: ControlMode,
    #[serde(default)]
    pub negative_samples: NegativeSamples,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cores_per_vm: 1,
            vms_per_dispatcher: 1,
            use_virtual_machines: false,
            control_mode: default_control_mode(),
            negative_samples: NegativeSamples::default(),
        }
    }
}

impl AdmissionConfig {
    pub fn cores_per_application(&self) -> usize {
        self.cores_per_vm * self.vms_per_dispatcher
    }
}

/// Components and cores of an admitted application.
pub struct AdmittedApplication {
    pub app_id: AppId,
    pub dispatcher: Rc<RefCell<RequestDispatcher>>,
    pub actuator: Rc<RefCell<Actuator>>,
    pub vms: Vec<Id>,
    pub cores: Vec<Id>,
}

/// Allocates cores to submitted applications and provisions a dispatcher and an actuator for each of them.
pub struct AdmissionControl {
    pool: CorePool<CoreSlot>,
    config: AdmissionConfig,
    next_vm_id: usize,
    next_dispatcher_id: usize,
    next_actuator_id: usize,
    admitted: Vec<AdmittedApplication>,
    ctx: SimulationContext,
}

impl AdmissionControl {
    pub fn new(cores: Vec<CoreSlot>, config: AdmissionConfig, ctx: SimulationContext) -> Self {
        assert!(config.cores_per_vm > 0, "cores_per_vm must be positive");
        assert!(config.vms_per_dispatcher > 0, "vms_per_dispatcher must be positive");
        log_info!(
            ctx,
            "admission control over {} cores, {} cores per application",
            cores.len(),
            config.cores_per_application()
        );
        Self {
            pool: CorePool::new(cores),
            config,
            next_vm_id: 0,
            next_dispatcher_id: 0,
            next_actuator_id: 0,
            admitted: Vec::new(),
            ctx,
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn pool(&self) -> &CorePool<CoreSlot> {
        &self.pool
    }

    pub fn admitted(&self) -> &[AdmittedApplication] {
        &self.admitted
    }

    /// Admits `app` and returns the id of its dispatcher, which accepts requests of the application.
    ///
    /// On failure the pool is left as it was before the call.
    pub fn accept_application(
        &mut self,
        app: Application,
        provisioner: &mut dyn Provisioner,
    ) -> Result<Id, AdmissionError> {
        app.validate()?;
        let slots = match self.pool.allocate(self.config.cores_per_application()) {
            Ok(slots) => slots,
            Err(e) => {
                log_warn!(self.ctx, "application {} rejected: {}", app.id, e);
                return Err(e.into());
            }
        };
        match self.provision(&app, &slots, provisioner) {
            Ok(admitted) => {
                let dispatcher_id = admitted.dispatcher.borrow().id();
                log_info!(
                    self.ctx,
                    "application {} admitted on cores {:?}, dispatcher {}",
                    app.id,
                    admitted.cores,
                    dispatcher_id
                );
                self.admitted.push(admitted);
                Ok(dispatcher_id)
            }
            Err(e) => {
                log_warn!(self.ctx, "application {} rejected: {}", app.id, e);
                self.pool.restore(slots);
                Err(e.into())
            }
        }
    }

    fn provision(
        &mut self,
        app: &Application,
        slots: &[CoreSlot],
        provisioner: &mut dyn Provisioner,
    ) -> Result<AdmittedApplication, ProvisioningError> {
        let cores = slots.iter().map(|slot| slot.id).collect::<Vec<_>>();

        let mut vms = Vec::new();
        if self.config.use_virtual_machines {
            for chunk in slots.chunks(self.config.cores_per_vm) {
                let name = format!("vm-{}", self.next_vm_id);
                self.next_vm_id += 1;
                let vm = provisioner.create_component(
                    &name,
                    ComponentSpec::VirtualMachine {
                        cores: chunk.iter().map(|slot| slot.id).collect(),
                    },
                )?;
                vms.push(vm.id());
            }
        }
        let endpoints = if self.config.use_virtual_machines {
            vms.clone()
        } else {
            cores.clone()
        };

        let control_endpoints = match self.config.control_mode {
            ControlMode::Direct => slots
                .iter()
                .map(|slot| ControlEndpoint::Core(slot.core.clone()))
                .collect(),
            ControlMode::Arbitrated => slots
                .iter()
                .map(|slot| ControlEndpoint::ArbitratedCore(slot.core.clone()))
                .collect(),
            ControlMode::PerCpu => slots
                .iter()
                .unique_by(|slot| slot.cpu.borrow().id())
                .map(|slot| ControlEndpoint::Cpu(slot.cpu.clone()))
                .collect(),
        };

        let name = format!("actuator-{}", self.next_actuator_id);
        self.next_actuator_id += 1;
        let actuator = match provisioner.create_component(
            &name,
            ComponentSpec::Actuator {
                app: app.clone(),
                endpoints: control_endpoints,
            },
        )? {
            Provisioned::Actuator(actuator) => actuator,
            _ => return Err(unexpected_kind(&name)),
        };

        let name = format!("dispatcher-{}", self.next_dispatcher_id);
        self.next_dispatcher_id += 1;
        let actuator_id = actuator.borrow().id();
        let dispatcher = match provisioner.create_component(
            &name,
            ComponentSpec::Dispatcher {
                app: app.clone(),
                endpoints,
                actuator: actuator_id,
                negative_samples: self.config.negative_samples,
            },
        )? {
            Provisioned::Dispatcher(dispatcher) => dispatcher,
            _ => return Err(unexpected_kind(&name)),
        };

        Ok(AdmittedApplication {
            app_id: app.id,
            dispatcher,
            actuator,
            vms,
            cores,
        })
    }
}

fn unexpected_kind(name: &str) -> ProvisioningError {
    ProvisioningError::CreationFailed {
        name: name.to_string(),
        reason: "provisioner returned a component of another kind".to_string(),
    }
}
