//! Virtual machine passing requests to its cores and responses back to its sink.

use std::collections::VecDeque;

use dslab_core::{cast, log_debug, log_warn, Event, EventHandler, Id, SimulationContext};

use crate::message::{BindResponseSink, RequestArrival, ResponseArrival};

pub struct VirtualMachine {
    cores: VecDeque<Id>,
    response_sink: Option<Id>,
    cores_wired: bool,
    ctx: SimulationContext,
}

impl VirtualMachine {
    pub fn new(cores: Vec<Id>, ctx: SimulationContext) -> Self {
        Self {
            cores: cores.into(),
            response_sink: None,
            cores_wired: false,
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn cores(&self) -> impl Iterator<Item = &Id> {
        self.cores.iter()
    }
}

impl EventHandler for VirtualMachine {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            RequestArrival { request } => {
                if let Some(core) = self.cores.pop_front() {
                    log_debug!(self.ctx, "forwarding request {} to core {}", request.id, core);
                    self.ctx.emit_now(RequestArrival { request }, core);
                    self.cores.push_back(core);
                } else {
                    log_warn!(self.ctx, "no cores, dropping request {}", request.id);
                }
            }
            ResponseArrival { response } => {
                if let Some(sink) = self.response_sink {
                    self.ctx.emit_now(ResponseArrival { response }, sink);
                }
            }
            BindResponseSink { sink } => {
                self.response_sink = Some(sink);
                if !self.cores_wired {
                    for &core in self.cores.iter() {
                        self.ctx.emit_now(BindResponseSink { sink: self.ctx.id() }, core);
                    }
                    self.cores_wired = true;
                }
            }
        })
    }
}
