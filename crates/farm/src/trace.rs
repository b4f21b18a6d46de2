use std::{fs::File, io::Write, path::Path};

use dslab_core::Id;
use serde::{Deserialize, Serialize};

use crate::system::CpuConfig;

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TraceEvent {
    RequestServiced {
        time: f64,
        core: Id,
        request_id: u64,
        service_time: f64,
    },
    ClockSpeedChanged {
        time: f64,
        core: Id,
        from: f64,
        to: f64,
    },
    ApplicationAdmitted {
        time: f64,
        app_id: usize,
        dispatcher: Id,
        cores: Vec<Id>,
    },
    ApplicationRejected {
        time: f64,
        app_id: usize,
        reason: String,
    },
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Trace {
    pub cpus: Vec<CpuConfig>,
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new(cpus: Vec<CpuConfig>) -> Self {
        Self {
            cpus,
            events: Vec::new(),
        }
    }

    pub fn log(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        File::create(path)?.write_all(json.as_bytes())
    }
}
