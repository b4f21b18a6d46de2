use std::{
    collections::BTreeMap,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use dslab_farm::{
    experiment::{Experiment, RunResult},
    run_stats::RunStats,
    system::SystemConfig,
};
use env_logger::Builder;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    systems: Vec<PathBuf>,
    seeds: Vec<u64>,
}

/// Runs batch experiment.
#[derive(Parser, Debug)]
struct Args {
    /// Path to config.
    #[arg(short, long)]
    config: PathBuf,

    /// Path to folder with traces.
    #[arg(short, long, default_value = None)]
    traces: Option<PathBuf>,

    /// Path to file with results.
    #[arg(short, long)]
    output: PathBuf,

    /// Do not run experiments, just read results from --output.
    #[arg(long)]
    precalculated: bool,

    /// Number of threads.
    #[arg(long, default_value_t = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))]
    threads: usize,
}

fn filename(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("system")
        .to_string()
}

struct ResultRow {
    name: String,
    admitted: f64,
    service_time: f64,
    max_service_time: f64,
    utilization: f64,
    speed_changes: f64,
    final_speed: f64,
}

fn mean(runs: &[RunStats], f: impl Fn(&RunStats) -> f64) -> f64 {
    runs.iter().map(f).sum::<f64>() / runs.len() as f64
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();

    let result: Vec<RunResult> = if args.precalculated {
        serde_json::from_str(&std::fs::read_to_string(args.output).expect("Can't read file with result"))
            .expect("Can't parse file with result")
    } else {
        let config: Config =
            serde_yaml::from_str(&std::fs::read_to_string(args.config).expect("Can't read config file"))
                .expect("Can't parse config file");
        let experiment = Experiment::new(
            config
                .systems
                .into_iter()
                .enumerate()
                .map(|(i, path)| (format!("{}_{}", i, filename(&path)), SystemConfig::from_yaml(path)))
                .collect(),
            config.seeds,
            args.traces,
        );

        let result = experiment.run(args.threads);
        File::create(args.output)
            .expect("Can't create output file")
            .write_all(
                serde_json::to_string_pretty(&result)
                    .expect("Can't serialize result")
                    .as_bytes(),
            )
            .expect("Can't write to output file");
        result
    };

    let mut system_runs: BTreeMap<String, Vec<RunStats>> = BTreeMap::new();
    for run in result.into_iter() {
        system_runs.entry(run.system).or_default().push(run.run_stats);
    }

    let result = system_runs
        .into_iter()
        .map(|(name, runs)| ResultRow {
            name,
            admitted: mean(&runs, |run| {
                run.admitted_applications as f64 / run.submitted_applications.max(1) as f64 * 100.
            }),
            service_time: mean(&runs, |run| run.average_service_time),
            max_service_time: runs.iter().map(|run| run.max_service_time).fold(0., f64::max),
            utilization: mean(&runs, |run| run.core_utilization * 100.),
            speed_changes: mean(&runs, |run| run.clock_speed_changes as f64),
            final_speed: mean(&runs, |run| {
                run.final_clock_speeds.iter().sum::<f64>() / run.final_clock_speeds.len().max(1) as f64
            }),
        })
        .collect::<Vec<_>>();

    let width = result.iter().map(|x| x.name.len()).max().unwrap_or(0).max("system".len());
    println!(
        "| {: <width$} | admitted | avg service time | max service time | utilization | speed changes | final speed |",
        "system",
        width = width
    );
    println!(
        "|-{:-<width$}-|----------|------------------|------------------|-------------|---------------|-------------|",
        "",
        width = width
    );
    for row in result.into_iter() {
        println!(
            "| {: <width$} | {: >7.1}% | {: >16.3} | {: >16.3} | {: >10.2}% | {: >13.1} | {: >11.2} |",
            row.name,
            row.admitted,
            row.service_time,
            row.max_service_time,
            row.utilization,
            row.speed_changes,
            row.final_speed,
            width = width
        );
    }
}
