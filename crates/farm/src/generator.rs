//! Source of requests for the admitted applications.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, ExpError};
use rand_pcg::Pcg64;
use serde::Serialize;

use dslab_core::{cast, log_debug, log_info, Event, EventHandler, Id, SimulationContext};

use crate::message::{AppId, Request, RequestArrival, RequestId};

#[derive(Clone, Serialize)]
struct GenerateRequest {}

/// Sends requests of randomly chosen applications with exponentially distributed inter-arrival times.
///
/// With a modulation period set, every delay `d` drawn at time `t` becomes `d + d * max(0.1, sin(t / period))`.
pub struct RequestGenerator {
    applications: Vec<(AppId, Id)>,
    next_request_id: RequestId,
    inter_arrival: Exp<f64>,
    modulation_period: Option<f64>,
    stop_time: f64,
    pending: Option<u64>,
    generated: u64,
    rng: Pcg64,
    ctx: SimulationContext,
}

impl RequestGenerator {
    pub fn new(
        mean_inter_arrival_time: f64,
        modulation_period: Option<f64>,
        stop_time: f64,
        ctx: SimulationContext,
    ) -> Result<Self, ExpError> {
        if mean_inter_arrival_time.is_nan() || mean_inter_arrival_time <= 0. {
            return Err(ExpError::LambdaTooSmall);
        }
        let inter_arrival = Exp::new(1. / mean_inter_arrival_time)?;
        let rng = Pcg64::seed_from_u64(ctx.gen_range(0..u64::MAX));
        Ok(Self {
            applications: Vec::new(),
            next_request_id: 0,
            inter_arrival,
            modulation_period,
            stop_time,
            pending: None,
            generated: 0,
            rng,
            ctx,
        })
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Number of requests sent so far.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn applications(&self) -> &[(AppId, Id)] {
        &self.applications
    }

    /// Starts sending requests of `app_id` to `dispatcher`. The first added application starts the generation.
    pub fn add_application(&mut self, app_id: AppId, dispatcher: Id) {
        log_info!(self.ctx, "generating requests of application {} to {}", app_id, dispatcher);
        self.applications.push((app_id, dispatcher));
        if self.pending.is_none() {
            self.schedule_next();
        }
    }

    /// Stops generation. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if let Some(event_id) = self.pending.take() {
            self.ctx.cancel_event(event_id);
            log_info!(self.ctx, "stopped after {} requests", self.generated);
        }
    }

    fn next_delay(&mut self) -> f64 {
        let delay = self.inter_arrival.sample(&mut self.rng);
        match self.modulation_period {
            Some(period) => delay + delay * (self.ctx.time() / period).sin().max(0.1),
            None => delay,
        }
    }

    fn schedule_next(&mut self) {
        let delay = self.next_delay();
        if self.ctx.time() + delay > self.stop_time {
            log_debug!(self.ctx, "next arrival is past stop time {}", self.stop_time);
            self.pending = None;
            return;
        }
        self.pending = Some(self.ctx.emit_self(GenerateRequest {}, delay));
    }

    fn generate(&mut self, event_id: u64) {
        if self.pending != Some(event_id) {
            return;
        }
        let (app_id, dispatcher) = self.applications[self.rng.gen_range(0..self.applications.len())];
        let request = Request::new(self.next_request_id, app_id);
        self.next_request_id += 1;
        self.generated += 1;
        log_debug!(self.ctx, "request {} of application {}", request.id, app_id);
        self.ctx.emit_now(RequestArrival { request }, dispatcher);
        self.schedule_next();
    }
}

impl EventHandler for RequestGenerator {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            GenerateRequest {} => {
                self.generate(event.id);
            }
        })
    }
}
