use std::{
    cell::RefCell,
    collections::BTreeSet,
    rc::Rc,
    sync::{Arc, Mutex},
    thread,
};

use dslab_core::Simulation;

use dslab_farm::{
    actuator::ControlMode,
    admission::{AdmissionConfig, AdmissionControl, CorePool, CoreSlot},
    application::{Application, ControlParams},
    core::Core,
    cpu::Cpu,
    error::{AdmissionError, PoolExhausted, ProvisioningError},
    message::{Request, RequestArrival},
    provisioner::{ComponentSpec, Provisioned, Provisioner, SimulationProvisioner},
};

/// Cores of `cpus` cpus with `cores_per_cpu` cores each.
fn build_cluster(sim: &mut Simulation, cpus: usize, cores_per_cpu: usize) -> Vec<CoreSlot> {
    let mut slots = Vec::new();
    for cpu_index in 0..cpus {
        let cores = (0..cores_per_cpu)
            .map(|index| {
                let name = format!("cpu-{}-core-{}", cpu_index, index);
                let core = Rc::new(RefCell::new(Core::new(index, 1.0, 3.0, sim.create_context(&name))));
                sim.add_handler(&name, core.clone());
                core
            })
            .collect::<Vec<_>>();
        let name = format!("cpu-{}", cpu_index);
        let cpu = Rc::new(RefCell::new(Cpu::new(cores.clone(), 3.0, 0.5, sim.create_context(&name))));
        let cpu_id = sim.add_handler(&name, cpu.clone());
        for core in cores.into_iter() {
            core.borrow_mut().attach_to_cpu(cpu_id);
            slots.push(CoreSlot::new(core, cpu.clone()));
        }
    }
    slots
}

fn application(id: usize) -> Application {
    Application::new(
        id,
        1000.,
        100.,
        ControlParams {
            step: 0.1,
            target: 800.,
            flex: 50.,
        },
    )
}

fn config(cores_per_vm: usize, vms_per_dispatcher: usize, use_virtual_machines: bool) -> AdmissionConfig {
    AdmissionConfig {
        cores_per_vm,
        vms_per_dispatcher,
        use_virtual_machines,
        ..AdmissionConfig::default()
    }
}

/// Creates virtual machines but fails to create anything else.
struct OnlyVirtualMachines<'a> {
    inner: SimulationProvisioner<'a>,
    created: usize,
}

impl Provisioner for OnlyVirtualMachines<'_> {
    fn create_component(&mut self, name: &str, spec: ComponentSpec) -> Result<Provisioned, ProvisioningError> {
        match spec {
            ComponentSpec::VirtualMachine { .. } => {
                self.created += 1;
                self.inner.create_component(name, spec)
            }
            _ => Err(ProvisioningError::CreationFailed {
                name: name.to_string(),
                reason: "out of memory".to_string(),
            }),
        }
    }
}

#[test]
fn admissions_get_disjoint_cores() {
    let mut sim = Simulation::new(123);
    let slots = build_cluster(&mut sim, 2, 2);
    let mut admission = AdmissionControl::new(slots, config(1, 2, false), sim.create_context("admission"));

    let first = admission
        .accept_application(application(0), &mut SimulationProvisioner::new(&mut sim))
        .unwrap();
    let second = admission
        .accept_application(application(1), &mut SimulationProvisioner::new(&mut sim))
        .unwrap();
    assert_ne!(first, second);

    let admitted = admission.admitted();
    assert_eq!(admitted.len(), 2);
    assert_eq!(admitted[0].cores.len(), 2);
    assert_eq!(admitted[1].cores.len(), 2);
    let all = admitted
        .iter()
        .flat_map(|a| a.cores.iter().copied())
        .collect::<BTreeSet<_>>();
    assert_eq!(all.len(), 4);
    assert_eq!(admitted[0].dispatcher.borrow().id(), first);
    assert!(admitted[0].vms.is_empty());

    assert_eq!(admission.pool().free_count(), 0);
    assert_eq!(admission.pool().assigned_count(), 4);
}

#[test]
fn exhausted_pool_is_left_unchanged() {
    let mut sim = Simulation::new(123);
    let slots = build_cluster(&mut sim, 1, 3);
    let mut admission = AdmissionControl::new(slots, config(2, 1, true), sim.create_context("admission"));

    admission
        .accept_application(application(0), &mut SimulationProvisioner::new(&mut sim))
        .unwrap();
    assert_eq!(admission.pool().free_count(), 1);

    let result = admission.accept_application(application(1), &mut SimulationProvisioner::new(&mut sim));
    assert_eq!(
        result,
        Err(AdmissionError::PoolExhausted(PoolExhausted {
            requested: 2,
            available: 1
        }))
    );
    assert_eq!(admission.pool().free_count(), 1);
    assert_eq!(admission.pool().assigned_count(), 2);
    assert_eq!(admission.admitted().len(), 1);
}

#[test]
fn provisioning_failure_restores_pool() {
    let mut sim = Simulation::new(123);
    let slots = build_cluster(&mut sim, 1, 4);
    let mut admission = AdmissionControl::new(slots, config(1, 2, true), sim.create_context("admission"));

    let mut provisioner = OnlyVirtualMachines {
        inner: SimulationProvisioner::new(&mut sim),
        created: 0,
    };
    let result = admission.accept_application(application(0), &mut provisioner);
    assert!(matches!(result, Err(AdmissionError::Provisioning(_))));
    assert_eq!(provisioner.created, 2);
    assert_eq!(admission.pool().free_count(), 4);
    assert_eq!(admission.pool().assigned_count(), 0);
    assert!(admission.admitted().is_empty());

    // the same cores are handed out again
    admission
        .accept_application(application(1), &mut SimulationProvisioner::new(&mut sim))
        .unwrap();
    assert_eq!(admission.pool().free_count(), 2);
}

#[test]
fn invalid_application_is_rejected() {
    let mut sim = Simulation::new(123);
    let slots = build_cluster(&mut sim, 1, 2);
    let mut admission = AdmissionControl::new(slots, config(1, 1, false), sim.create_context("admission"));

    let mut app = application(0);
    app.control.step = 0.;
    let result = admission.accept_application(app, &mut SimulationProvisioner::new(&mut sim));
    assert!(matches!(result, Err(AdmissionError::InvalidApplication { app_id: 0, .. })));

    let mut app = application(1);
    app.mean_instructions = -5.;
    let result = admission.accept_application(app, &mut SimulationProvisioner::new(&mut sim));
    assert!(matches!(result, Err(AdmissionError::InvalidApplication { app_id: 1, .. })));

    assert_eq!(admission.pool().free_count(), 2);
}

#[test]
fn admitted_application_serves_requests() {
    for control_mode in [ControlMode::Direct, ControlMode::Arbitrated, ControlMode::PerCpu] {
        let mut sim = Simulation::new(123);
        let slots = build_cluster(&mut sim, 2, 2);
        let cores = slots.iter().map(|slot| slot.core.clone()).collect::<Vec<_>>();
        let mut admission = AdmissionControl::new(
            slots,
            AdmissionConfig {
                cores_per_vm: 2,
                vms_per_dispatcher: 2,
                use_virtual_machines: true,
                control_mode,
                ..AdmissionConfig::default()
            },
            sim.create_context("admission"),
        );
        let dispatcher = admission
            .accept_application(application(0), &mut SimulationProvisioner::new(&mut sim))
            .unwrap();
        assert_eq!(admission.admitted()[0].vms.len(), 2);

        let client = sim.create_context("client");
        for id in 0..8 {
            client.emit(RequestArrival { request: Request::new(id, 0) }, dispatcher, id as f64 * 5000.);
        }
        sim.step_until_no_events();

        let admitted = &admission.admitted()[0];
        assert_eq!(admitted.dispatcher.borrow().stats().responses, 8);
        assert_eq!(admitted.actuator.borrow().stats().observations, 8);
        assert!(admitted.actuator.borrow().stats().commands_issued > 0);
        // every core got two requests
        for core in cores.iter() {
            assert_eq!(core.borrow().stats().serviced_requests, 2);
            assert!(core.borrow().clock_speed() > 1.0);
        }
    }
}

#[test]
fn concurrent_allocations_never_share_cores() {
    let k = 50;
    for _ in 0..20 {
        let pool = Arc::new(Mutex::new(CorePool::new(0..2 * k)));
        let handles = (0..2)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || pool.lock().unwrap().allocate(k).unwrap())
            })
            .collect::<Vec<_>>();
        let allocations = handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>();

        let all = allocations.iter().flatten().copied().collect::<BTreeSet<_>>();
        assert_eq!(all.len(), 2 * k);
        assert_eq!(pool.lock().unwrap().free_count(), 0);
        assert_eq!(pool.lock().unwrap().assigned_count(), 2 * k);
    }
}

#[test]
fn pool_allocation_is_all_or_nothing() {
    let mut pool = CorePool::new(["a", "b", "c"]);
    assert_eq!(pool.allocate(4), Err(PoolExhausted { requested: 4, available: 3 }));
    assert_eq!(pool.free_count(), 3);

    let taken = pool.allocate(2).unwrap();
    assert_eq!(taken, vec!["a", "b"]);
    pool.restore(taken);
    assert_eq!(pool.allocate(3).unwrap(), vec!["a", "b", "c"]);
    assert_eq!(pool.allocate(1), Err(PoolExhausted { requested: 1, available: 0 }));
}
