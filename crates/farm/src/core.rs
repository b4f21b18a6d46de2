//! Model of a single cpu core servicing requests at a variable clock speed.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use serde::Serialize;

use dslab_core::{cast, log_debug, log_info, log_warn, Event, EventHandler, Id, SimulationContext};

use crate::{
    error::{NotAttached, RateError},
    message::{
        BindResponseSink, RateChangeRequest, RateChangeResult, Request, RequestArrival, RequestId, Response,
        ResponseArrival,
    },
    trace::{Trace, TraceEvent},
};

/// Lowest speed a core asks its cpu for.
pub const MIN_REQUESTED_SPEED: f64 = 0.1;

/// Tolerance for clock speed comparisons.
pub(crate) const SPEED_EPSILON: f64 = 1e-9;

/// Rounds clock speed to one decimal place.
pub fn round_speed(speed: f64) -> f64 {
    (speed * 10.).round() / 10.
}

#[derive(Clone, Serialize)]
struct ServiceCompleted {
    request_id: RequestId,
}

/// Counters accumulated by a core.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CoreStats {
    /// Number of completely serviced requests.
    pub serviced_requests: u64,
    /// Sum of service times (waiting + processing) of serviced requests.
    pub total_service_time: f64,
    /// Maximum service time among serviced requests.
    pub max_service_time: f64,
    /// Time spent processing requests.
    pub busy_time: f64,
    /// Number of accepted clock speed changes.
    pub clock_speed_changes: u64,
    /// Requests discarded by shutdown.
    pub dropped_requests: u64,
}

impl CoreStats {
    pub fn average_service_time(&self) -> f64 {
        if self.serviced_requests == 0 {
            0.
        } else {
            self.total_service_time / self.serviced_requests as f64
        }
    }
}

/// Discrete-event model of a core.
///
/// A core owns a FIFO queue of requests and services them one by one. Processing time of a
/// request is its remaining number of instructions divided by the current clock speed.
/// When the clock speed changes during processing, the completion event is cancelled,
/// the instructions done at the old speed are subtracted and the completion is rescheduled
/// at the new speed, so no work is lost or done twice.
///
/// The core is idle iff it has no request in service and no armed completion event.
pub struct Core {
    index: usize,
    clock_speed: f64,
    max_clock_speed: f64,
    queue: VecDeque<Request>,
    servicing: Option<Request>,
    remaining_instructions: f64,
    service_start: f64,
    busy_since: f64,
    pending_completion: Option<u64>,
    response_sink: Option<Id>,
    cpu: Option<Id>,
    shut_down: bool,
    stats: CoreStats,
    trace: Option<Rc<RefCell<Trace>>>,
    ctx: SimulationContext,
}

impl Core {
    /// Creates an idle core with position `index` inside its cpu.
    pub fn new(index: usize, clock_speed: f64, max_clock_speed: f64, ctx: SimulationContext) -> Self {
        assert!(
            clock_speed > 0. && clock_speed <= max_clock_speed,
            "core clock speed must be in (0, {max_clock_speed}], got {clock_speed}"
        );
        Self {
            index,
            clock_speed: round_speed(clock_speed),
            max_clock_speed,
            queue: VecDeque::new(),
            servicing: None,
            remaining_instructions: 0.,
            service_start: 0.,
            busy_since: 0.,
            pending_completion: None,
            response_sink: None,
            cpu: None,
            shut_down: false,
            stats: CoreStats::default(),
            trace: None,
            ctx,
        }
    }

    pub fn with_trace(mut self, trace: Rc<RefCell<Trace>>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Registers the cpu which arbitrates rate change requests of this core.
    pub fn attach_to_cpu(&mut self, cpu: Id) {
        self.cpu = Some(cpu);
    }

    /// Sets the component which receives responses of completed requests.
    pub fn bind_response_sink(&mut self, sink: Id) {
        self.response_sink = Some(sink);
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn clock_speed(&self) -> f64 {
        self.clock_speed
    }

    pub fn max_clock_speed(&self) -> f64 {
        self.max_clock_speed
    }

    pub fn is_idle(&self) -> bool {
        self.servicing.is_none() && self.pending_completion.is_none()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn current_request(&self) -> Option<&Request> {
        self.servicing.as_ref()
    }

    /// Instructions of the current request left at the moment of the last (re)scheduling.
    pub fn remaining_instructions(&self) -> f64 {
        self.remaining_instructions
    }

    /// Instructions of the current request left at the current simulation time.
    pub fn remaining_instructions_now(&self) -> f64 {
        if self.servicing.is_none() {
            return 0.;
        }
        (self.remaining_instructions - (self.ctx.time() - self.service_start) * self.clock_speed).max(0.)
    }

    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }

    /// Queues a request and starts servicing it right away if the core is idle.
    pub fn submit(&mut self, mut request: Request) {
        if self.shut_down {
            log_warn!(self.ctx, "core is shut down, dropping request {}", request.id);
            self.stats.dropped_requests += 1;
            return;
        }
        request.arrival_time = self.ctx.time();
        log_debug!(
            self.ctx,
            "accepting request {} with {} instructions",
            request.id,
            request.instructions
        );
        self.queue.push_back(request);
        if self.is_idle() {
            self.begin_service();
        }
    }

    /// Changes the clock speed, rescheduling the request in service.
    ///
    /// The speed is rounded to one decimal place.
    pub fn set_clock_speed(&mut self, speed: f64) -> Result<(), RateError> {
        if speed > self.max_clock_speed + SPEED_EPSILON {
            return Err(RateError::AboveMax {
                speed,
                max: self.max_clock_speed,
            });
        }
        let new_speed = round_speed(speed).min(self.max_clock_speed);
        if speed <= 0. || new_speed <= 0. {
            return Err(RateError::NotPositive { speed });
        }

        let old_speed = self.clock_speed;
        if self.servicing.is_some() {
            if let Some(event_id) = self.pending_completion.take() {
                self.ctx.cancel_event(event_id);
            }
            let elapsed = self.ctx.time() - self.service_start;
            self.remaining_instructions = (self.remaining_instructions - elapsed * old_speed).max(0.);
            self.clock_speed = new_speed;
            log_debug!(
                self.ctx,
                "clock speed {} -> {}, rescheduling with {} remaining instructions",
                old_speed,
                new_speed,
                self.remaining_instructions
            );
            self.schedule_service();
        } else {
            self.clock_speed = new_speed;
            log_debug!(self.ctx, "clock speed {} -> {}", old_speed, new_speed);
        }

        self.stats.clock_speed_changes += 1;
        if let Some(trace) = &self.trace {
            trace.borrow_mut().log(TraceEvent::ClockSpeedChanged {
                time: self.ctx.time(),
                core: self.ctx.id(),
                from: old_speed,
                to: new_speed,
            });
        }
        Ok(())
    }

    /// Asks the owning cpu to change the speed of this core.
    ///
    /// The desired speed is clamped to `[MIN_REQUESTED_SPEED, max_clock_speed]`. The cpu decides
    /// and applies the outcome, this call only reports whether the request was sent.
    pub fn request_rate_change(&self, desired_speed: f64) -> Result<(), NotAttached> {
        let cpu = self.cpu.ok_or(NotAttached {
            core_index: self.index,
        })?;
        let speed = desired_speed.clamp(MIN_REQUESTED_SPEED, self.max_clock_speed);
        log_debug!(self.ctx, "asking cpu for clock speed {}", speed);
        self.ctx.emit_now(
            RateChangeRequest {
                core_index: self.index,
                speed,
            },
            cpu,
        );
        Ok(())
    }

    /// Cancels the pending completion and discards all requests. No events are produced afterwards.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Some(event_id) = self.pending_completion.take() {
            self.ctx.cancel_event(event_id);
        }
        if let Some(request) = self.servicing.take() {
            self.stats.busy_time += self.ctx.time() - self.busy_since;
            log_debug!(self.ctx, "shutdown interrupts request {}", request.id);
            self.stats.dropped_requests += 1;
        }
        self.stats.dropped_requests += self.queue.len() as u64;
        self.queue.clear();
        self.remaining_instructions = 0.;
        log_info!(
            self.ctx,
            "shut down after {} requests with average service time {:.3}",
            self.stats.serviced_requests,
            self.stats.average_service_time()
        );
    }

    fn begin_service(&mut self) {
        let Some(request) = self.queue.pop_front() else {
            return;
        };
        self.remaining_instructions = request.instructions as f64;
        self.busy_since = self.ctx.time();
        log_debug!(self.ctx, "begin servicing request {}", request.id);
        self.servicing = Some(request);
        self.schedule_service();
    }

    fn schedule_service(&mut self) {
        let Some(request_id) = self.servicing.as_ref().map(|request| request.id) else {
            return;
        };
        self.service_start = self.ctx.time();
        let processing_time = self.remaining_instructions / self.clock_speed;
        self.pending_completion = Some(self.ctx.emit_self(ServiceCompleted { request_id }, processing_time));
    }

    fn end_service(&mut self, event_id: u64) {
        if self.pending_completion != Some(event_id) {
            log_debug!(self.ctx, "ignoring stale completion event {}", event_id);
            return;
        }
        self.pending_completion = None;
        let Some(request) = self.servicing.take() else {
            return;
        };
        let now = self.ctx.time();
        let service_time = now - request.arrival_time;
        log_debug!(
            self.ctx,
            "end servicing request {} with service time {}",
            request.id,
            service_time
        );

        if let Some(sink) = self.response_sink {
            self.ctx.emit_now(
                ResponseArrival {
                    response: Response {
                        request_id: request.id,
                        duration: service_time,
                    },
                },
                sink,
            );
        }
        self.stats.serviced_requests += 1;
        self.stats.total_service_time += service_time;
        self.stats.max_service_time = self.stats.max_service_time.max(service_time);
        self.stats.busy_time += now - self.busy_since;
        if let Some(trace) = &self.trace {
            trace.borrow_mut().log(TraceEvent::RequestServiced {
                time: now,
                core: self.ctx.id(),
                request_id: request.id,
                service_time,
            });
        }

        self.remaining_instructions = 0.;
        self.begin_service();
    }
}

impl EventHandler for Core {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            RequestArrival { request } => {
                self.submit(request);
            }
            ServiceCompleted { request_id } => {
                log_debug!(self.ctx, "completion timer fired for request {}", request_id);
                self.end_service(event.id);
            }
            BindResponseSink { sink } => {
                log_debug!(self.ctx, "responses now go to {}", sink);
                self.bind_response_sink(sink);
            }
            RateChangeResult {
                core_index,
                speed,
                accepted,
            } => {
                if accepted {
                    log_debug!(self.ctx, "cpu accepted speed {} for core {}", speed, core_index);
                } else {
                    log_debug!(self.ctx, "cpu rejected speed {} for core {}", speed, core_index);
                }
            }
        })
    }
}
