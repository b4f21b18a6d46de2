use dslab_farm::{
    admission::AdmissionConfig,
    experiment::Experiment,
    system::{ApplicationConfig, CpuConfig, GeneratorConfig, SystemConfig},
};

fn system(mean_inter_arrival_time: f64) -> SystemConfig {
    SystemConfig {
        cpus: vec![CpuConfig {
            cores: 2,
            clock_speed: 1.0,
            max_clock_speed: 3.0,
            max_gap: 0.5,
        }],
        admission: AdmissionConfig::default(),
        generator: GeneratorConfig {
            mean_inter_arrival_time,
            modulation_period: None,
        },
        applications: vec![ApplicationConfig {
            submit_time: 0.,
            mean_instructions: 1000.,
            standard_deviation: 100.,
            step: 0.1,
            target: 800.,
            flex: 50.,
        }],
        duration: 10000.,
    }
}

#[test]
fn every_run_is_reported() {
    let experiment = Experiment::new(
        vec![("slow".to_string(), system(1000.)), ("fast".to_string(), system(500.))],
        vec![3, 1, 2],
        None,
    );
    let results = experiment.run(2);

    assert_eq!(results.len(), 6);
    let order = results.iter().map(|r| (r.system.as_str(), r.seed)).collect::<Vec<_>>();
    assert_eq!(
        order,
        vec![("fast", 1), ("fast", 2), ("fast", 3), ("slow", 1), ("slow", 2), ("slow", 3)]
    );
    for result in results.iter() {
        assert_eq!(result.run_stats.admitted_applications, 1);
    }
}

#[test]
#[should_panic(expected = "runs panicked")]
fn failed_run_is_not_dropped() {
    let experiment = Experiment::new(
        vec![("valid".to_string(), system(1000.)), ("broken".to_string(), system(0.))],
        vec![1],
        None,
    );
    experiment.run(1);
}
