use dslab_farm::{
    actuator::ControlMode,
    admission::AdmissionConfig,
    cluster_simulation::ClusterSimulation,
    system::{ApplicationConfig, CpuConfig, GeneratorConfig, SystemConfig},
    trace::{Trace, TraceEvent},
};

fn application(submit_time: f64) -> ApplicationConfig {
    ApplicationConfig {
        submit_time,
        mean_instructions: 1000.,
        standard_deviation: 100.,
        step: 0.1,
        target: 800.,
        flex: 50.,
    }
}

fn system(control_mode: ControlMode, use_virtual_machines: bool) -> SystemConfig {
    SystemConfig {
        cpus: vec![CpuConfig {
            cores: 2,
            clock_speed: 1.0,
            max_clock_speed: 3.0,
            max_gap: 0.5,
        }],
        admission: AdmissionConfig {
            cores_per_vm: 1,
            vms_per_dispatcher: 1,
            use_virtual_machines,
            control_mode,
            ..AdmissionConfig::default()
        },
        generator: GeneratorConfig {
            mean_inter_arrival_time: 1000.,
            modulation_period: None,
        },
        applications: vec![application(0.), application(1000.), application(2000.)],
        duration: 50000.,
    }
}

#[test]
fn cluster_run() {
    for control_mode in [ControlMode::Direct, ControlMode::Arbitrated, ControlMode::PerCpu] {
        for use_virtual_machines in [false, true] {
            let run_stats = ClusterSimulation::new(123, system(control_mode, use_virtual_machines), None).run();

            assert_eq!(run_stats.submitted_applications, 3);
            assert_eq!(run_stats.admitted_applications, 2);
            assert_eq!(run_stats.rejected_applications, 1);
            assert!(run_stats.generated_requests > 0);
            assert_eq!(
                run_stats.completed_requests + run_stats.dropped_requests,
                run_stats.generated_requests
            );
            assert_eq!(
                run_stats.applications.iter().map(|app| app.responses).sum::<u64>(),
                run_stats.completed_requests
            );
            assert!(run_stats.clock_speed_changes > 0);
            assert!(run_stats.core_utilization > 0. && run_stats.core_utilization <= 1. + 1e-9);
            assert!(run_stats.average_service_time <= run_stats.max_service_time + 1e-9);
            assert_eq!(run_stats.final_clock_speeds.len(), 2);
            for speed in run_stats.final_clock_speeds.iter() {
                assert!(*speed > 0. && *speed <= 3.0);
            }
            if control_mode != ControlMode::Direct {
                let (a, b) = (run_stats.final_clock_speeds[0], run_stats.final_clock_speeds[1]);
                assert!((a - b).abs() <= 0.5 + 1e-9);
            }
        }
    }
}

#[test]
fn same_seed_same_result() {
    let first = ClusterSimulation::new(7, system(ControlMode::Arbitrated, true), None).run();
    let second = ClusterSimulation::new(7, system(ControlMode::Arbitrated, true), None).run();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn trace_is_saved() {
    let path = std::env::temp_dir().join(format!("compute-farm-trace-{}.json", std::process::id()));
    let run_stats = ClusterSimulation::new(123, system(ControlMode::Arbitrated, true), Some(path.clone())).run();

    let trace: Trace = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(trace.cpus.len(), 1);
    let admitted = trace
        .events
        .iter()
        .filter(|e| matches!(e, TraceEvent::ApplicationAdmitted { .. }))
        .count();
    let rejected = trace
        .events
        .iter()
        .filter(|e| matches!(e, TraceEvent::ApplicationRejected { .. }))
        .count();
    let serviced = trace
        .events
        .iter()
        .filter(|e| matches!(e, TraceEvent::RequestServiced { .. }))
        .count();
    let speed_changes = trace
        .events
        .iter()
        .filter(|e| matches!(e, TraceEvent::ClockSpeedChanged { .. }))
        .count();
    assert_eq!(admitted, 2);
    assert_eq!(rejected, 1);
    assert_eq!(serviced as u64, run_stats.completed_requests);
    assert_eq!(speed_changes as u64, run_stats.clock_speed_changes);
}

#[test]
fn config_files_parse() {
    for name in ["demo.yaml", "per_cpu.yaml"] {
        let config = SystemConfig::from_yaml(format!("{}/../../configs/{}", env!("CARGO_MANIFEST_DIR"), name));
        assert!(!config.cpus.is_empty());
        assert!(!config.applications.is_empty());
    }

    let config = SystemConfig::from_yaml(format!("{}/../../configs/per_cpu.yaml", env!("CARGO_MANIFEST_DIR")));
    assert_eq!(config.total_cores(), 8);
    assert_eq!(config.admission.control_mode, ControlMode::PerCpu);
    assert_eq!(config.applications[1].submit_time, 20000.);
    assert_eq!(config.applications[0].submit_time, 0.);
}
