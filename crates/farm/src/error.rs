//! Error types returned across component boundaries.

use thiserror::Error;

/// Requested clock speed is outside of `(0, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum RateError {
    /// Speed is zero, negative or rounds down to zero.
    #[error("clock speed {speed} must be positive")]
    NotPositive { speed: f64 },
    /// Speed exceeds the maximum supported by the component.
    #[error("clock speed {speed} exceeds maximum {max}")]
    AboveMax { speed: f64, max: f64 },
}

/// Reason why a [Cpu](crate::cpu::Cpu) refused a per-core rate change.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum ArbitrationError {
    #[error(transparent)]
    Rate(#[from] RateError),
    /// No core with such index on the cpu.
    #[error("cpu has no core with index {core_index}")]
    UnknownCore { core_index: usize },
    /// Underclocking would leave a sibling core more than `max_gap` faster.
    #[error("underclock to {speed} would leave core {sibling} at gap {gap} > {max_gap}")]
    GapViolation {
        speed: f64,
        sibling: usize,
        gap: f64,
        max_gap: f64,
    },
}

/// Core pool can't satisfy an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("requested {requested} cores but only {available} are free")]
pub struct PoolExhausted {
    pub requested: usize,
    pub available: usize,
}

/// The provisioning collaborator failed to create a component.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ProvisioningError {
    #[error("component {name} was not created: {reason}")]
    CreationFailed { name: String, reason: String },
}

/// Failed admission of an application.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    PoolExhausted(#[from] PoolExhausted),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error("application {app_id} is invalid: {reason}")]
    InvalidApplication { app_id: usize, reason: String },
}

/// Core can't forward a rate change request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("core {core_index} is not attached to a cpu")]
pub struct NotAttached {
    pub core_index: usize,
}
