use std::{cell::RefCell, path::PathBuf, rc::Rc};

use dslab_core::{log_info, Simulation};

use crate::{
    admission::{AdmissionControl, CoreSlot},
    application::Application,
    core::Core,
    cpu::Cpu,
    generator::RequestGenerator,
    provisioner::SimulationProvisioner,
    run_stats::{ApplicationStats, RunStats},
    system::SystemConfig,
    trace::{Trace, TraceEvent},
};

/// Compute farm built from a [SystemConfig]: cpus with their cores, admission control and a request generator.
pub struct ClusterSimulation {
    pub sim: Simulation,
    config: SystemConfig,
    trace_path: Option<PathBuf>,
}

impl ClusterSimulation {
    pub fn new(seed: u64, config: SystemConfig, trace_path: Option<PathBuf>) -> Self {
        ClusterSimulation {
            sim: Simulation::new(seed),
            config,
            trace_path,
        }
    }

    /// Submits the configured applications at their submit times and runs the farm for the configured duration.
    pub fn run(mut self) -> RunStats {
        let trace = self
            .trace_path
            .as_ref()
            .map(|_| Rc::new(RefCell::new(Trace::new(self.config.cpus.clone()))));

        let mut cores = Vec::new();
        let mut slots = Vec::new();
        for (cpu_index, cpu_config) in self.config.cpus.iter().enumerate() {
            let cpu_cores = (0..cpu_config.cores)
                .map(|index| {
                    let name = format!("cpu-{}-core-{}", cpu_index, index);
                    let mut core = Core::new(
                        index,
                        cpu_config.clock_speed,
                        cpu_config.max_clock_speed,
                        self.sim.create_context(&name),
                    );
                    if let Some(trace) = &trace {
                        core = core.with_trace(trace.clone());
                    }
                    let core = Rc::new(RefCell::new(core));
                    self.sim.add_handler(&name, core.clone());
                    core
                })
                .collect::<Vec<_>>();

            let name = format!("cpu-{}", cpu_index);
            let cpu = Rc::new(RefCell::new(Cpu::new(
                cpu_cores.clone(),
                cpu_config.max_clock_speed,
                cpu_config.max_gap,
                self.sim.create_context(&name),
            )));
            let cpu_id = self.sim.add_handler(&name, cpu.clone());
            for core in cpu_cores.into_iter() {
                core.borrow_mut().attach_to_cpu(cpu_id);
                slots.push(CoreSlot::new(core.clone(), cpu.clone()));
                cores.push(core);
            }
        }

        let mut admission = AdmissionControl::new(
            slots,
            self.config.admission.clone(),
            self.sim.create_context("admission_control"),
        );

        let generator = RequestGenerator::new(
            self.config.generator.mean_inter_arrival_time,
            self.config.generator.modulation_period,
            self.config.duration,
            self.sim.create_context("generator"),
        )
        .unwrap_or_else(|e| panic!("Invalid generator config: {e}"));
        let generator = Rc::new(RefCell::new(generator));
        self.sim.add_handler("generator", generator.clone());

        let mut run_stats = RunStats::new(cores.len());

        let mut applications = self.config.applications.iter().enumerate().collect::<Vec<_>>();
        applications.sort_by(|a, b| a.1.submit_time.total_cmp(&b.1.submit_time));
        for (app_id, app_config) in applications.into_iter() {
            self.sim.step_until_time(app_config.submit_time.min(self.config.duration));
            let app = Application::new(
                app_id,
                app_config.mean_instructions,
                app_config.standard_deviation,
                app_config.control_params(),
            );
            let result = admission.accept_application(app, &mut SimulationProvisioner::new(&mut self.sim));
            run_stats.register_admission(result.is_ok());
            match result {
                Ok(dispatcher) => {
                    generator.borrow_mut().add_application(app_id, dispatcher);
                    if let Some(trace) = &trace {
                        let cores = admission
                            .admitted()
                            .last()
                            .map(|admitted| admitted.cores.clone())
                            .unwrap_or_default();
                        trace.borrow_mut().log(TraceEvent::ApplicationAdmitted {
                            time: self.sim.time(),
                            app_id,
                            dispatcher,
                            cores,
                        });
                    }
                }
                Err(e) => {
                    if let Some(trace) = &trace {
                        trace.borrow_mut().log(TraceEvent::ApplicationRejected {
                            time: self.sim.time(),
                            app_id,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        self.sim.step_until_time(self.config.duration);

        generator.borrow_mut().shutdown();
        for core in cores.iter() {
            core.borrow_mut().shutdown();
        }

        for core in cores.iter() {
            let core = core.borrow();
            run_stats.register_core(core.stats(), core.clock_speed());
        }
        for admitted in admission.admitted().iter() {
            let dispatcher = admitted.dispatcher.borrow();
            let actuator = admitted.actuator.borrow();
            run_stats.register_application(ApplicationStats {
                app_id: admitted.app_id,
                mean_service_time: dispatcher.mean_service_time(),
                responses: dispatcher.stats().responses,
                control_commands: actuator.stats().commands_issued,
                failed_control_commands: actuator.stats().commands_failed,
            });
        }
        run_stats.finalize(self.sim.time(), generator.borrow().generated());

        let ctx = self.sim.create_context("cluster");
        log_info!(
            ctx,
            "finished: {}/{} applications admitted, {} requests completed",
            run_stats.admitted_applications,
            run_stats.submitted_applications,
            run_stats.completed_requests
        );

        if let (Some(trace), Some(path)) = (trace, self.trace_path) {
            trace
                .borrow()
                .save(&path)
                .unwrap_or_else(|e| panic!("Can't write trace to {}: {e}", path.display()));
        }

        run_stats
    }
}
