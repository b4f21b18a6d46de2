//! Application submitted to the farm.

use serde::{Deserialize, Serialize};

use crate::{error::AdmissionError, message::AppId};

/// Parameters of the service time feedback loop.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ControlParams {
    /// Clock speed change issued per control decision.
    pub step: f64,
    /// Target mean service time in ms.
    pub target: f64,
    /// Half-width of the band around `target` where no action is taken.
    pub flex: f64,
}

/// Application workload description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Application {
    pub id: AppId,
    /// Mean number of instructions per request.
    pub mean_instructions: f64,
    /// Standard deviation of the number of instructions per request.
    pub standard_deviation: f64,
    pub control: ControlParams,
}

impl Application {
    pub fn new(id: AppId, mean_instructions: f64, standard_deviation: f64, control: ControlParams) -> Self {
        Self {
            id,
            mean_instructions,
            standard_deviation,
            control,
        }
    }

    /// Checks workload and control parameters.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        let invalid = |reason: &str| {
            Err(AdmissionError::InvalidApplication {
                app_id: self.id,
                reason: reason.to_string(),
            })
        };
        if self.mean_instructions.is_nan() || self.mean_instructions <= 0. {
            return invalid("mean number of instructions must be positive");
        }
        if !self.standard_deviation.is_finite() || self.standard_deviation < 0. {
            return invalid("standard deviation must be finite and non-negative");
        }
        if self.control.target.is_nan() || self.control.target <= 0. {
            return invalid("target service time must be positive");
        }
        if self.control.flex.is_nan() || self.control.flex < 0. {
            return invalid("flex must be non-negative");
        }
        if self.control.step.is_nan() || self.control.step <= 0. {
            return invalid("step must be positive");
        }
        Ok(())
    }
}
