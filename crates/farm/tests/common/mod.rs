#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use dslab_core::{cast, Event, EventHandler, Id, Simulation, SimulationContext};
use serde::Serialize;

use dslab_farm::message::{BindResponseSink, Request, RequestArrival, Response, ResponseArrival};

/// Wakes the simulation up at a given time.
#[derive(Clone, Serialize)]
pub struct Tick {}

#[derive(Clone, Debug)]
pub enum Received {
    Request(f64, Request),
    Response(f64, Response),
    Sink(Id),
}

/// Stands in for any component and keeps everything it receives.
pub struct Recorder {
    pub received: Vec<Received>,
    ctx: SimulationContext,
}

impl Recorder {
    pub fn requests(&self) -> Vec<Request> {
        self.received
            .iter()
            .filter_map(|r| match r {
                Received::Request(_, request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<(f64, Response)> {
        self.received
            .iter()
            .filter_map(|r| match r {
                Received::Response(time, response) => Some((*time, response.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn sinks(&self) -> Vec<Id> {
        self.received
            .iter()
            .filter_map(|r| match r {
                Received::Sink(sink) => Some(*sink),
                _ => None,
            })
            .collect()
    }
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            RequestArrival { request } => {
                self.received.push(Received::Request(self.ctx.time(), request));
            }
            ResponseArrival { response } => {
                self.received.push(Received::Response(self.ctx.time(), response));
            }
            BindResponseSink { sink } => {
                self.received.push(Received::Sink(sink));
            }
            Tick {} => {}
        })
    }
}

pub fn add_recorder(sim: &mut Simulation, name: &str) -> (Rc<RefCell<Recorder>>, Id) {
    let recorder = Rc::new(RefCell::new(Recorder {
        received: Vec::new(),
        ctx: sim.create_context(name),
    }));
    let id = sim.add_handler(name, recorder.clone());
    (recorder, id)
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}
