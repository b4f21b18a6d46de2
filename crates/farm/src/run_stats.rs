//! Some stats from a completed simulation.

use serde::{Deserialize, Serialize};

use crate::core::CoreStats;

/// Arithmetic mean over all values added so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningMean {
    count: u64,
    mean: f64,
}

impl RunningMean {
    pub fn add(&mut self, value: f64) {
        self.mean = (self.mean * self.count as f64 + value) / (self.count + 1) as f64;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Per-application stats.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub app_id: usize,
    /// Mean service time observed by the application dispatcher.
    pub mean_service_time: f64,
    /// Number of responses received by the dispatcher.
    pub responses: u64,
    /// Commands sent by the actuator.
    pub control_commands: u64,
    /// Commands refused by cores or cpus.
    pub failed_control_commands: u64,
}

/// Some stats from a completed simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunStats {
    /// Simulated time in ms.
    pub duration: f64,
    /// Number of submitted applications.
    pub submitted_applications: usize,
    /// Number of applications which got cores.
    pub admitted_applications: usize,
    /// Number of applications refused by admission control.
    pub rejected_applications: usize,
    /// Requests sent by the generator.
    pub generated_requests: u64,
    /// Requests completely serviced by cores.
    pub completed_requests: u64,
    /// Requests still queued or in service when the simulation ended.
    pub dropped_requests: u64,
    /// Average service time of completed requests.
    pub average_service_time: f64,
    /// Maximum service time of completed requests.
    pub max_service_time: f64,
    /// Fraction of time cores spent servicing requests.
    pub core_utilization: f64,
    /// Accepted clock speed changes over all cores.
    pub clock_speed_changes: u64,
    /// Clock speed of every core at the end of the simulation.
    pub final_clock_speeds: Vec<f64>,
    pub applications: Vec<ApplicationStats>,

    #[serde(skip)]
    total_cores: usize,
    #[serde(skip)]
    total_busy_time: f64,
}

impl RunStats {
    /// Initialize new stats for a cluster with given number of cores.
    pub fn new(total_cores: usize) -> Self {
        RunStats {
            duration: 0.,
            submitted_applications: 0,
            admitted_applications: 0,
            rejected_applications: 0,
            generated_requests: 0,
            completed_requests: 0,
            dropped_requests: 0,
            average_service_time: 0.,
            max_service_time: 0.,
            core_utilization: 0.,
            clock_speed_changes: 0,
            final_clock_speeds: Vec::new(),
            applications: Vec::new(),
            total_cores,
            total_busy_time: 0.,
        }
    }

    /// Register admission result of a submitted application.
    pub fn register_admission(&mut self, admitted: bool) {
        self.submitted_applications += 1;
        if admitted {
            self.admitted_applications += 1;
        } else {
            self.rejected_applications += 1;
        }
    }

    /// Register final counters of a core.
    pub fn register_core(&mut self, stats: &CoreStats, clock_speed: f64) {
        if stats.serviced_requests > 0 {
            self.average_service_time = (self.average_service_time * self.completed_requests as f64
                + stats.total_service_time)
                / (self.completed_requests + stats.serviced_requests) as f64;
        }
        self.completed_requests += stats.serviced_requests;
        self.dropped_requests += stats.dropped_requests;
        self.max_service_time = self.max_service_time.max(stats.max_service_time);
        self.clock_speed_changes += stats.clock_speed_changes;
        self.total_busy_time += stats.busy_time;
        self.final_clock_speeds.push(clock_speed);
    }

    pub fn register_application(&mut self, stats: ApplicationStats) {
        self.applications.push(stats);
    }

    /// Finalize result given the simulated [duration](RunStats::duration).
    pub fn finalize(&mut self, duration: f64, generated_requests: u64) {
        self.duration = duration;
        self.generated_requests = generated_requests;
        if duration > 0. && self.total_cores > 0 {
            self.core_utilization = self.total_busy_time / (duration * self.total_cores as f64);
        }
    }
}
