//! Requests, responses and the events shared between farm components.

use dslab_core::Id;
use serde::Serialize;

pub type RequestId = u64;
pub type AppId = usize;

/// Unit of work submitted by a client of an application.
#[derive(Clone, Debug, Serialize)]
pub struct Request {
    /// Sequence id, also used to correlate the [Response].
    pub id: RequestId,
    /// Application the request belongs to.
    pub app_id: AppId,
    /// Number of instructions, assigned by the dispatcher.
    pub instructions: u64,
    /// Time the request arrived at the component currently holding it.
    pub arrival_time: f64,
}

impl Request {
    pub fn new(id: RequestId, app_id: AppId) -> Self {
        Self {
            id,
            app_id,
            instructions: 0,
            arrival_time: 0.,
        }
    }

    pub fn with_instructions(mut self, instructions: u64) -> Self {
        self.instructions = instructions;
        self
    }
}

/// Result of a serviced request.
#[derive(Clone, Debug, Serialize)]
pub struct Response {
    /// Id of the serviced [Request].
    pub request_id: RequestId,
    /// Service time in ms. Replaced by the running mean once it passes a dispatcher.
    pub duration: f64,
}

// EVENTS --------------------------------------------------------------------------------------------------------------

/// A request to be serviced or forwarded.
#[derive(Clone, Serialize)]
pub struct RequestArrival {
    pub request: Request,
}

/// A response travelling back towards the dispatcher and its actuator.
#[derive(Clone, Serialize)]
pub struct ResponseArrival {
    pub response: Response,
}

/// Asks the receiver to deliver its future responses to `sink`.
#[derive(Clone, Serialize)]
pub struct BindResponseSink {
    pub sink: Id,
}

/// Core asks its cpu to change the core clock speed.
#[derive(Clone, Serialize)]
pub struct RateChangeRequest {
    pub core_index: usize,
    pub speed: f64,
}

/// Cpu answer to [RateChangeRequest].
#[derive(Clone, Serialize)]
pub struct RateChangeResult {
    pub core_index: usize,
    pub speed: f64,
    pub accepted: bool,
}
