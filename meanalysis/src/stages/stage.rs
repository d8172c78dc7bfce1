use std::time::Instant;

use crate::counters::Counters;
use crate::engine::IntegrationEngine;
use crate::event::Event;

/// Per-event mutable state a stage may touch besides the event itself.
pub struct StageContext<'a> {
    pub counters: &'a mut Counters,
    pub engine: &'a mut dyn IntegrationEngine,
    /// Wall-clock limit for the current event.
    pub deadline: Option<Instant>,
}

impl<'a> StageContext<'a> {
    pub fn new(counters: &'a mut Counters, engine: &'a mut dyn IntegrationEngine, deadline: Option<Instant>) -> Self {
        StageContext { counters, engine, deadline }
    }

    pub fn budget_exhausted(&self) -> bool {
        matches!(self.deadline, Some(limit) if Instant::now() >= limit)
    }

    /// Count a per-event failure under the stage's group.
    pub fn record_failure(&mut self, group: &str, err: &mecore::Error) {
        self.counters.inc(group, err.counter_name());
    }
}

/// One step of the per-event pipeline.
///
/// Stages hold only read-only configuration; all event state lives in `Event`. A stage
/// returning `false` stops the pipeline for that event.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Counters reported even when they stay at zero. `processed` and `passes` are
    /// registered by the pipeline.
    fn counter_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool;
}
