//! Per-application request dispatcher.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand_distr::{Distribution, Normal, NormalError};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use dslab_core::{cast, log_debug, log_warn, Event, EventHandler, Id, SimulationContext};

use crate::{
    message::{AppId, BindResponseSink, Request, RequestArrival, Response, ResponseArrival},
    run_stats::RunningMean,
};

/// Attempts made by [NegativeSamples::Resample] before falling back to zero.
const MAX_RESAMPLES: usize = 16;

/// What to do with negative instruction counts drawn from the normal distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegativeSamples {
    /// Treat the request as having zero instructions.
    #[default]
    ClampToZero,
    /// Draw again.
    Resample,
}

/// Draws per-request instruction counts from `N(mean, std_dev)`.
pub struct InstructionSampler {
    distribution: Normal<f64>,
    negative_samples: NegativeSamples,
    rng: Pcg64,
}

impl InstructionSampler {
    pub fn new(mean: f64, std_dev: f64, negative_samples: NegativeSamples, seed: u64) -> Result<Self, NormalError> {
        Ok(Self {
            distribution: Normal::new(mean, std_dev)?,
            negative_samples,
            rng: Pcg64::seed_from_u64(seed),
        })
    }

    pub fn sample(&mut self) -> u64 {
        let mut value = self.distribution.sample(&mut self.rng);
        if self.negative_samples == NegativeSamples::Resample {
            let mut attempts = 0;
            while value < 0. && attempts < MAX_RESAMPLES {
                value = self.distribution.sample(&mut self.rng);
                attempts += 1;
            }
        }
        value.max(0.).round() as u64
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DispatcherStats {
    pub received_requests: u64,
    pub dispatched_requests: u64,
    pub responses: u64,
}

/// Load-balances requests of one application across its endpoints (cores or virtual machines)
/// and reports the running mean service time to the actuator.
///
/// Dispatching doesn't wait for the endpoint: a request is forwarded to the next endpoint in
/// round-robin order as soon as it arrives, the service happens downstream.
pub struct RequestDispatcher {
    app_id: AppId,
    queue: VecDeque<Request>,
    endpoints: VecDeque<Id>,
    actuator: Option<Id>,
    idle: bool,
    responses_wired: bool,
    sampler: InstructionSampler,
    mean: RunningMean,
    stats: DispatcherStats,
    ctx: SimulationContext,
}

impl RequestDispatcher {
    pub fn new(
        app_id: AppId,
        endpoints: Vec<Id>,
        actuator: Option<Id>,
        sampler: InstructionSampler,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            app_id,
            queue: VecDeque::new(),
            endpoints: endpoints.into(),
            actuator,
            idle: true,
            responses_wired: false,
            sampler,
            mean: RunningMean::default(),
            stats: DispatcherStats::default(),
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Endpoints in the order the next requests will be sent to.
    pub fn endpoints(&self) -> impl Iterator<Item = &Id> {
        self.endpoints.iter()
    }

    /// Mean duration of all responses received so far.
    pub fn mean_service_time(&self) -> f64 {
        self.mean.mean()
    }

    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    fn on_request(&mut self, mut request: Request) {
        if !self.responses_wired {
            self.wire_responses();
        }
        request.instructions = self.sampler.sample();
        request.arrival_time = self.ctx.time();
        self.stats.received_requests += 1;
        log_debug!(
            self.ctx,
            "accepting request {} with {} instructions",
            request.id,
            request.instructions
        );
        self.queue.push_back(request);
        if self.idle {
            self.dispatch_queued();
        }
    }

    fn wire_responses(&mut self) {
        log_debug!(self.ctx, "binding responses of {} endpoints", self.endpoints.len());
        for &endpoint in self.endpoints.iter() {
            self.ctx.emit_now(BindResponseSink { sink: self.ctx.id() }, endpoint);
        }
        self.responses_wired = true;
    }

    fn dispatch_queued(&mut self) {
        if self.endpoints.is_empty() {
            log_warn!(self.ctx, "no endpoints, {} requests stay queued", self.queue.len());
            return;
        }
        self.idle = false;
        while let Some(request) = self.queue.pop_front() {
            let Some(endpoint) = self.endpoints.pop_front() else {
                break;
            };
            log_debug!(self.ctx, "dispatching request {} to {}", request.id, endpoint);
            self.ctx.emit_now(RequestArrival { request }, endpoint);
            self.endpoints.push_back(endpoint);
            self.stats.dispatched_requests += 1;
        }
        self.idle = true;
    }

    fn on_response(&mut self, mut response: Response) {
        self.mean.add(response.duration);
        self.stats.responses += 1;
        log_debug!(
            self.ctx,
            "response for request {}, new mean service time {:.3}",
            response.request_id,
            self.mean.mean()
        );
        response.duration = self.mean.mean();
        if let Some(actuator) = self.actuator {
            self.ctx.emit_now(ResponseArrival { response }, actuator);
        }
    }
}

impl EventHandler for RequestDispatcher {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            RequestArrival { request } => {
                self.on_request(request);
            }
            ResponseArrival { response } => {
                self.on_response(response);
            }
        })
    }
}
