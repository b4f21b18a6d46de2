//! Creation of per-application components inside a running simulation.

use std::{cell::RefCell, rc::Rc};

use dslab_core::{Id, Simulation};

use crate::{
    actuator::{Actuator, ControlEndpoint},
    application::Application,
    dispatcher::{InstructionSampler, NegativeSamples, RequestDispatcher},
    error::ProvisioningError,
    virtual_machine::VirtualMachine,
};

/// Description of a component to create.
pub enum ComponentSpec {
    VirtualMachine {
        cores: Vec<Id>,
    },
    Actuator {
        app: Application,
        endpoints: Vec<ControlEndpoint>,
    },
    Dispatcher {
        app: Application,
        endpoints: Vec<Id>,
        actuator: Id,
        negative_samples: NegativeSamples,
    },
}

/// Handle to a created component.
#[derive(Clone)]
pub enum Provisioned {
    VirtualMachine(Rc<RefCell<VirtualMachine>>),
    Actuator(Rc<RefCell<Actuator>>),
    Dispatcher(Rc<RefCell<RequestDispatcher>>),
}

impl Provisioned {
    pub fn id(&self) -> Id {
        match self {
            Provisioned::VirtualMachine(vm) => vm.borrow().id(),
            Provisioned::Actuator(actuator) => actuator.borrow().id(),
            Provisioned::Dispatcher(dispatcher) => dispatcher.borrow().id(),
        }
    }
}

/// Creates components on behalf of admission control.
///
/// A created component must be able to receive events as soon as the call returns.
pub trait Provisioner {
    fn create_component(&mut self, name: &str, spec: ComponentSpec) -> Result<Provisioned, ProvisioningError>;
}

/// Registers new components in a [Simulation].
pub struct SimulationProvisioner<'a> {
    sim: &'a mut Simulation,
}

impl<'a> SimulationProvisioner<'a> {
    pub fn new(sim: &'a mut Simulation) -> Self {
        Self { sim }
    }
}

impl Provisioner for SimulationProvisioner<'_> {
    fn create_component(&mut self, name: &str, spec: ComponentSpec) -> Result<Provisioned, ProvisioningError> {
        let ctx = self.sim.create_context(name);
        let provisioned = match spec {
            ComponentSpec::VirtualMachine { cores } => {
                let vm = Rc::new(RefCell::new(VirtualMachine::new(cores, ctx)));
                self.sim.add_handler(name, vm.clone());
                Provisioned::VirtualMachine(vm)
            }
            ComponentSpec::Actuator { app, endpoints } => {
                let actuator = Rc::new(RefCell::new(Actuator::new(app.id, app.control, endpoints, ctx)));
                self.sim.add_handler(name, actuator.clone());
                Provisioned::Actuator(actuator)
            }
            ComponentSpec::Dispatcher {
                app,
                endpoints,
                actuator,
                negative_samples,
            } => {
                let seed = ctx.gen_range(0..u64::MAX);
                let sampler =
                    InstructionSampler::new(app.mean_instructions, app.standard_deviation, negative_samples, seed)
                        .map_err(|e| ProvisioningError::CreationFailed {
                            name: name.to_string(),
                            reason: e.to_string(),
                        })?;
                let dispatcher = Rc::new(RefCell::new(RequestDispatcher::new(
                    app.id,
                    endpoints,
                    Some(actuator),
                    sampler,
                    ctx,
                )));
                self.sim.add_handler(name, dispatcher.clone());
                Provisioned::Dispatcher(dispatcher)
            }
        };
        Ok(provisioned)
    }
}
