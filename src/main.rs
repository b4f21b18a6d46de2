use std::{io::Write, path::PathBuf};

use clap::Parser;
use env_logger::Builder;

use dslab_farm::{cluster_simulation::ClusterSimulation, system::SystemConfig};

/// Runs a single compute farm simulation and prints its stats.
#[derive(Parser, Debug)]
struct Args {
    /// Path to system config.
    #[arg(short, long)]
    config: PathBuf,

    /// Simulation seed.
    #[arg(short, long, default_value_t = 123)]
    seed: u64,

    /// Path to output trace.
    #[arg(short, long, default_value = None)]
    trace: Option<PathBuf>,
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let config = SystemConfig::from_yaml(&args.config);
    log::info!(
        "{} cpus, {} cores, {} applications, duration {} ms",
        config.cpus.len(),
        config.total_cores(),
        config.applications.len(),
        config.duration
    );

    let run_stats = ClusterSimulation::new(args.seed, config, args.trace).run();
    println!(
        "{}",
        serde_json::to_string_pretty(&run_stats).expect("Can't serialize run stats")
    );
}
