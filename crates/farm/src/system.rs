use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{admission::AdmissionConfig, application::ControlParams};

/// Cpu with identical cores.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CpuConfig {
    pub cores: usize,
    /// Initial clock speed of every core in instructions per ms.
    pub clock_speed: f64,
    pub max_clock_speed: f64,
    /// Maximum difference between clock speeds of two cores of the cpu.
    pub max_gap: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Mean time between two requests in ms.
    pub mean_inter_arrival_time: f64,
    /// Period of the sinusoidal load modulation, no modulation if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulation_period: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Time at which the application is submitted to admission control.
    #[serde(default)]
    pub submit_time: f64,
    pub mean_instructions: f64,
    pub standard_deviation: f64,
    pub step: f64,
    pub target: f64,
    pub flex: f64,
}

impl ApplicationConfig {
    pub fn control_params(&self) -> ControlParams {
        ControlParams {
            step: self.step,
            target: self.target,
            flex: self.flex,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    pub cpus: Vec<CpuConfig>,
    #[serde(default)]
    pub admission: AdmissionConfig,
    pub generator: GeneratorConfig,
    pub applications: Vec<ApplicationConfig>,
    /// Simulated time in ms.
    pub duration: f64,
}

impl SystemConfig {
    pub fn from_yaml<P: AsRef<Path>>(file: P) -> Self {
        serde_yaml::from_str(
            &std::fs::read_to_string(&file).unwrap_or_else(|_| panic!("Can't read file {}", file.as_ref().display())),
        )
        .unwrap_or_else(|e| panic!("Can't parse YAML from file {}: {e:?}", file.as_ref().display()))
    }

    pub fn total_cores(&self) -> usize {
        self.cpus.iter().map(|cpu| cpu.cores).sum()
    }
}
