use std::{
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use crate::{cluster_simulation::ClusterSimulation, run_stats::RunStats, system::SystemConfig};

struct Run {
    system: (String, SystemConfig),
    seed: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub system: String,
    pub seed: u64,
    pub run_stats: RunStats,
}

/// Runs every named system with every seed.
pub struct Experiment {
    systems: Vec<(String, SystemConfig)>,
    seeds: Vec<u64>,
    traces_folder: Option<PathBuf>,
}

impl Experiment {
    pub fn new(systems: Vec<(String, SystemConfig)>, seeds: Vec<u64>, traces_folder: Option<PathBuf>) -> Self {
        Self {
            systems,
            seeds,
            traces_folder,
        }
    }

    pub fn run(self, threads: usize) -> Vec<RunResult> {
        if let Some(dir) = &self.traces_folder {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| panic!("Can't create folder {}: {e}", dir.display()));
        }

        let runs = self
            .systems
            .into_iter()
            .cartesian_product(self.seeds)
            .map(|(system, seed)| Run { system, seed })
            .collect::<Vec<_>>();

        let total_runs = runs.len();

        let finished_run_atomic = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        let pool = ThreadPool::new(threads);
        let start_time = Instant::now();
        for run in runs.into_iter() {
            let finished_run_atomic = finished_run_atomic.clone();
            let results = results.clone();
            let traces_folder = self.traces_folder.clone();
            pool.execute(move || {
                let sim = ClusterSimulation::new(
                    run.seed,
                    run.system.1,
                    traces_folder.map(|folder| folder.join(format!("{}_{}.json", run.system.0, run.seed))),
                );

                let run_stats = sim.run();

                results.lock().expect("results lock poisoned").push(RunResult {
                    system: run.system.0,
                    seed: run.seed,
                    run_stats,
                });

                let finished_runs = finished_run_atomic.fetch_add(1, Ordering::SeqCst) + 1;

                let elapsed = start_time.elapsed();
                let remaining = Duration::from_secs_f64(
                    elapsed.as_secs_f64() / finished_runs as f64 * (total_runs - finished_runs) as f64,
                );
                print!("\r{}", " ".repeat(70));
                print!(
                    "\rFinished {}/{} [{}%] runs in {:.2?}, remaining time: {:.2?}",
                    finished_runs,
                    total_runs,
                    (finished_runs as f64 * 100. / total_runs as f64).round() as i32,
                    elapsed,
                    remaining
                );
                let _ = std::io::stdout().flush();
            });
        }

        pool.join();
        assert_eq!(pool.panic_count(), 0, "{} of {} runs panicked", pool.panic_count(), total_runs);

        print!("\r{}", " ".repeat(70));
        println!("\rFinished {} runs in {:.2?}", total_runs, start_time.elapsed());

        let mut results = Arc::try_unwrap(results)
            .unwrap_or_else(|_| panic!("results are still shared after all runs finished"))
            .into_inner()
            .expect("results lock poisoned");
        results.sort_by(|a, b| a.system.cmp(&b.system).then(a.seed.cmp(&b.seed)));
        results
    }
}
