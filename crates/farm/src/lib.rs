#![doc = include_str!("../../../README.md")]

pub mod actuator;
pub mod admission;
pub mod application;
pub mod cluster_simulation;
pub mod core;
pub mod cpu;
pub mod dispatcher;
pub mod error;
pub mod experiment;
pub mod generator;
pub mod message;
pub mod provisioner;
pub mod run_stats;
pub mod system;
pub mod trace;
pub mod virtual_machine;
