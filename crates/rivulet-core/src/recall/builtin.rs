//! Built-in recall behaviors.
//!
//! | Name          | Stage | Effect |
//! |---------------|-------|--------|
//! | `render`      | Pre   | clears the range's buffers |
//! |               | Inter | hands each recycling to the node's renderer |
//! | `gain`        | Inter | scales the range's buffers; runs after `render` |
//! | `count-ticks` | Post  | finishes after a fixed number of ticks |

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{RecallBehavior, RunContext, RunStatus, Stage};

/// Renders the playing range through the node's [`Renderer`](crate::Renderer).
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderRecycling;

impl RecallBehavior for RenderRecycling {
    fn name(&self) -> &'static str {
        "render"
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(*self)
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> RunStatus {
        match ctx.stage() {
            Stage::Pre => {
                ctx.for_each_recycling(|r| r.buffer_mut().clear());
            }
            Stage::Inter => {
                ctx.render();
            }
            Stage::Post => {}
        }
        RunStatus::Continue
    }
}

/// Scales the playing range by a constant gain after it was rendered.
#[derive(Clone, Copy, Debug)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    /// Linear gain factor.
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// The gain factor.
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl RecallBehavior for Gain {
    fn name(&self) -> &'static str {
        "gain"
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(*self)
    }

    fn dependencies(&self) -> &[&'static str] {
        &["render"]
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> RunStatus {
        if ctx.stage() == Stage::Inter {
            let gain = self.gain;
            ctx.for_each_recycling(|r| r.buffer_mut().scale(gain));
        }
        RunStatus::Continue
    }
}

/// Finishes after `limit` ticks.
///
/// Duplicates share the optional counter, which totals ticks over every
/// instance.
#[derive(Clone, Debug)]
pub struct CountTicks {
    limit: u64,
    counted: u64,
    counter: Option<Arc<AtomicU64>>,
}

impl CountTicks {
    /// Finishes after `limit` ticks; `0` never finishes.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            counted: 0,
            counter: None,
        }
    }

    /// Also adds every completed tick to `counter`.
    pub fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.counter = Some(counter);
        self
    }
}

impl RecallBehavior for CountTicks {
    fn name(&self) -> &'static str {
        "count-ticks"
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(Self {
            limit: self.limit,
            counted: 0,
            counter: self.counter.clone(),
        })
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> RunStatus {
        if ctx.stage() != Stage::Post {
            return RunStatus::Continue;
        }
        self.counted += 1;
        if let Some(counter) = &self.counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if self.limit > 0 && self.counted >= self.limit {
            RunStatus::Done
        } else {
            RunStatus::Continue
        }
    }
}
