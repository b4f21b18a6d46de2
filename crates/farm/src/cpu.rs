//! Model of a cpu arbitrating clock speeds of its cores.

use std::{cell::RefCell, rc::Rc};

use dslab_core::{cast, log_debug, log_info, log_warn, Event, EventHandler, Id, SimulationContext};

use crate::{
    core::{round_speed, Core, SPEED_EPSILON},
    error::{ArbitrationError, RateError},
    message::{RateChangeRequest, RateChangeResult},
};

/// Owns a fixed set of cores and keeps their clock speeds within `max_gap` of each other.
pub struct Cpu {
    cores: Vec<Rc<RefCell<Core>>>,
    max_clock_speed: f64,
    max_gap: f64,
    ctx: SimulationContext,
}

impl Cpu {
    /// Creates a cpu owning `cores`. Core indices must match their positions in `cores`
    /// and every core must support `max_clock_speed`.
    pub fn new(cores: Vec<Rc<RefCell<Core>>>, max_clock_speed: f64, max_gap: f64, ctx: SimulationContext) -> Self {
        assert!(!cores.is_empty(), "cpu must own at least one core");
        for (index, core) in cores.iter().enumerate() {
            let core = core.borrow();
            assert_eq!(core.index(), index, "core index doesn't match its position");
            assert!(
                core.max_clock_speed() + SPEED_EPSILON >= max_clock_speed,
                "core {} max clock speed {} is below cpu max clock speed {}",
                index,
                core.max_clock_speed(),
                max_clock_speed
            );
        }
        log_info!(
            ctx,
            "cpu with {} cores created, max clock speed {}, max gap {}",
            cores.len(),
            max_clock_speed,
            max_gap
        );
        Self {
            cores,
            max_clock_speed,
            max_gap,
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn cores(&self) -> &[Rc<RefCell<Core>>] {
        &self.cores
    }

    pub fn max_clock_speed(&self) -> f64 {
        self.max_clock_speed
    }

    pub fn max_gap(&self) -> f64 {
        self.max_gap
    }

    pub fn clock_speeds(&self) -> Vec<f64> {
        self.cores.iter().map(|core| core.borrow().clock_speed()).collect()
    }

    /// Highest clock speed among the cores.
    pub fn top_clock_speed(&self) -> f64 {
        self.clock_speeds().into_iter().fold(0., f64::max)
    }

    /// Sets the same clock speed on every core. Every core is attempted, the first failure is returned.
    pub fn set_all_cores_speed(&mut self, speed: f64) -> Result<(), RateError> {
        if speed <= 0. {
            return Err(RateError::NotPositive { speed });
        }
        if speed > self.max_clock_speed + SPEED_EPSILON {
            return Err(RateError::AboveMax {
                speed,
                max: self.max_clock_speed,
            });
        }
        let mut result = Ok(());
        for (index, core) in self.cores.iter().enumerate() {
            let core_result = core.borrow_mut().set_clock_speed(speed);
            if let Err(e) = core_result {
                log_warn!(self.ctx, "core {} refused speed {}: {}", index, speed, e);
                result = result.and(Err(e));
            }
        }
        result
    }

    /// Decides whether core `core_index` may run at `speed` and applies the decision.
    /// The speed is rounded to one decimal place before it is compared with the siblings.
    ///
    /// * Overclock above every sibling is allowed. Siblings left more than `max_gap` behind are raised
    ///   to `speed` as well.
    /// * Underclock below every sibling is allowed only if no sibling ends up more than `max_gap` faster.
    ///   Otherwise nothing changes.
    /// * Speeds within the current range of the siblings are always allowed.
    pub fn arbitrate(&mut self, speed: f64, core_index: usize) -> Result<(), ArbitrationError> {
        if speed > self.max_clock_speed + SPEED_EPSILON {
            return Err(RateError::AboveMax {
                speed,
                max: self.max_clock_speed,
            }
            .into());
        }
        if speed <= 0. {
            return Err(RateError::NotPositive { speed }.into());
        }
        if core_index >= self.cores.len() {
            return Err(ArbitrationError::UnknownCore { core_index });
        }
        let requested = speed;
        let speed = round_speed(speed).min(self.max_clock_speed);
        if speed <= 0. {
            return Err(RateError::NotPositive { speed: requested }.into());
        }

        let siblings = self
            .cores
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != core_index)
            .map(|(index, core)| (index, core.borrow().clock_speed()))
            .collect::<Vec<_>>();
        let max_sibling = siblings.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
        let min_sibling = siblings.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);

        if speed > max_sibling {
            for &(index, sibling_speed) in siblings.iter() {
                if speed - sibling_speed > self.max_gap + SPEED_EPSILON {
                    log_debug!(
                        self.ctx,
                        "raising core {} from {} to {} to keep the gap",
                        index,
                        sibling_speed,
                        speed
                    );
                    self.cores[index].borrow_mut().set_clock_speed(speed)?;
                }
            }
        } else if speed < min_sibling {
            for &(index, sibling_speed) in siblings.iter() {
                let gap = sibling_speed - speed;
                if gap > self.max_gap + SPEED_EPSILON {
                    return Err(ArbitrationError::GapViolation {
                        speed,
                        sibling: index,
                        gap,
                        max_gap: self.max_gap,
                    });
                }
            }
        }

        self.cores[core_index].borrow_mut().set_clock_speed(speed)?;
        Ok(())
    }
}

impl EventHandler for Cpu {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            RateChangeRequest { core_index, speed } => {
                log_debug!(self.ctx, "core {} asks for clock speed {}", core_index, speed);
                let accepted = match self.arbitrate(speed, core_index) {
                    Ok(()) => true,
                    Err(e) => {
                        log_debug!(self.ctx, "rate change rejected: {}", e);
                        false
                    }
                };
                self.ctx.emit_now(
                    RateChangeResult {
                        core_index,
                        speed,
                        accepted,
                    },
                    event.src,
                );
            }
        })
    }
}
