//! Ordered stage chain and the sequential and event-parallel drivers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use mecore::density::registry::DensityRegistry;

use crate::config::Config;
use crate::counters::Counters;
use crate::engine::{ConfigRegistry, IntegrationEngine};
use crate::error::Result;
use crate::event::{Event, EventInput};
use crate::stages::btag_lr::BTagLikelihoodStage;
use crate::stages::category::CategoryStage;
use crate::stages::event_id::EventIdFilter;
use crate::stages::gen_level::GenLevelStage;
use crate::stages::jets::JetSelector;
use crate::stages::leptons::LeptonSelector;
use crate::stages::mem::MemStage;
use crate::stages::stage::{Stage, StageContext};
use crate::stages::top_match::TopCandidateMatchStage;
use crate::stages::truth_match::TruthMatchStage;
use crate::stages::wtag::WTagStage;

pub struct Pipeline {
    config: Config,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Validate the configuration and build the stage chain.
    ///
    /// Arguments:
    ///
    /// * `config` - analysis configuration
    /// * `densities` - b-tag discriminant density tables, shared by all workers
    /// * `registry` - named engine configurations `mem.methods_to_run` refers to
    ///
    /// Returns:
    ///
    /// * `Pipeline` - ready to process events, or the first configuration error
    pub fn new(config: Config, densities: Arc<DensityRegistry>, registry: &ConfigRegistry) -> Result<Self> {
        config.validate(registry)?;
        let engine_configs = registry.resolve(&config.mem.methods_to_run)?;

        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(EventIdFilter::new(&config.general)),
            Box::new(LeptonSelector::new(&config.leptons)),
            Box::new(JetSelector::new(&config.jets)),
            Box::new(BTagLikelihoodStage::new(&config.jets, densities)),
            Box::new(WTagStage),
            Box::new(CategoryStage::new(&config.categories, &config.mem)),
            Box::new(GenLevelStage::new(&config.matching)),
            Box::new(TruthMatchStage::new(&config.matching)),
        ];
        if config.top_matching.enabled {
            stages.push(Box::new(TopCandidateMatchStage::new(&config.top_matching)));
        }
        stages.push(Box::new(MemStage::new(&config.mem, engine_configs)));

        log::info!(
            "pipeline: {} stages, engine configurations {:?}, hypotheses {:?}",
            stages.len(),
            config.mem.methods_to_run,
            config.mem.hypotheses
        );
        Ok(Pipeline { config, stages })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Counter set with every stage counter registered at zero.
    pub fn new_counters(&self) -> Counters {
        let mut counters = Counters::new();
        for stage in &self.stages {
            counters.register(stage.name(), "processed");
            counters.register(stage.name(), "passes");
            for name in stage.counter_names() {
                counters.register(stage.name(), &name);
            }
        }
        counters
    }

    fn deadline(&self) -> Option<Instant> {
        self.config
            .budget
            .event_budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms))
    }

    /// Run one event through the stages until one of them rejects it.
    pub fn process_event(
        &self,
        input: EventInput,
        engine: &mut dyn IntegrationEngine,
        counters: &mut Counters,
    ) -> Event {
        let mut event = Event::new(input);
        log::debug!(
            "event {:?}: {} jets, {} leptons",
            event.id(),
            event.input.jets.len(),
            event.input.leptons.len()
        );

        let mut ctx = StageContext::new(counters, engine, self.deadline());
        for stage in &self.stages {
            ctx.counters.inc(stage.name(), "processed");
            if !stage.process(&mut event, &mut ctx) {
                log::debug!("event {:?} stopped at stage {}", event.id(), stage.name());
                break;
            }
            ctx.counters.inc(stage.name(), "passes");
        }
        event
    }

    /// Process events in parallel on the current rayon pool, one engine per worker.
    ///
    /// Events come back in input order; counters are summed over all events.
    pub fn process_events<E, F>(&self, inputs: Vec<EventInput>, make_engine: F) -> (Vec<Event>, Counters)
    where
        E: IntegrationEngine,
        F: Fn() -> E + Sync + Send,
    {
        let processed: Vec<(Event, Counters)> = inputs
            .into_par_iter()
            .map_init(make_engine, |engine, input| {
                let mut counters = Counters::new();
                let event = self.process_event(input, engine, &mut counters);
                (event, counters)
            })
            .collect();

        let mut total = self.new_counters();
        let events = processed
            .into_iter()
            .map(|(event, counters)| {
                total.merge(&counters);
                event
            })
            .collect();
        (events, total)
    }
}
