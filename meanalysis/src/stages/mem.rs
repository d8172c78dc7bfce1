//! Gate, object assembly and the per (hypothesis, configuration) engine runs.

use serde::Serialize;

use crate::config::MemConfig;
use crate::engine::{EngineOutput, FinalState, Hypothesis, MemObject, NamedConfiguration, ObjectType, Observable, PsVar};
use crate::event::Event;
use crate::stages::category::{BTagCategory, Categorization};
use crate::stages::jets::JetTagging;
use crate::stages::leptons::LeptonSelection;
use crate::stages::stage::{Stage, StageContext};
use crate::stages::truth_match::{MatchRequirement, TruthMatchSummary};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HypothesisResult {
    pub hypothesis: Hypothesis,
    pub config_name: String,
    pub output: EngineOutput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Passed,
    NotMeCategory,
    LowBTag,
    Unmatched(MatchRequirement),
}

impl GateDecision {
    pub fn counter_name(&self) -> &'static str {
        match self {
            GateDecision::Passed => "gate_passed",
            GateDecision::NotMeCategory => "not_me_category",
            GateDecision::LowBTag => "low_btag",
            GateDecision::Unmatched(_) => "unmatched",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemResults {
    pub gate: GateDecision,
    pub final_state: Option<FinalState>,
    pub vars: Vec<PsVar>,
    /// One entry per (hypothesis, configuration), in evaluation order.
    pub entries: Vec<HypothesisResult>,
    /// Set when the event budget ran out before all runs were done.
    pub truncated: bool,
}

impl MemResults {
    fn gated(gate: GateDecision) -> Self {
        MemResults { gate, final_state: None, vars: Vec::new(), entries: Vec::new(), truncated: false }
    }

    pub fn get(&self, hypothesis: Hypothesis, config_name: &str) -> Option<&EngineOutput> {
        self.entries
            .iter()
            .find(|r| r.hypothesis == hypothesis && r.config_name == config_name)
            .map(|r| &r.output)
    }
}

/// Decide whether an event is handed to the engine.
///
/// A match requirement larger than the truth collection it refers to passes on its own;
/// events without truth have empty collections.
pub fn gate(cat: &Categorization, matches: Option<&TruthMatchSummary>, conf: &MemConfig) -> GateDecision {
    if !conf.me_categories.contains(&cat.category) {
        return GateDecision::NotMeCategory;
    }
    if cat.btag_category != BTagCategory::H {
        return GateDecision::LowBTag;
    }
    if let Some(required) = conf.require_matched.get(&cat.category) {
        for (&req, &n) in required {
            let (have, available) = match matches {
                Some(m) => (m.counts.get(req), m.truth_sizes.get(req.label())),
                None => (0, 0),
            };
            if available < n {
                continue;
            }
            if have < n {
                return GateDecision::Unmatched(req);
            }
        }
    }
    GateDecision::Passed
}

/// Engine inputs in push order: tagged jets, W candidates, leptons, missing energy.
pub fn assemble_objects(
    event: &Event,
    tagging: &JetTagging,
    cat: &Categorization,
    leptons: &LeptonSelection,
) -> Vec<MemObject> {
    let jets = &event.input.jets;
    let jet_object = |i: usize| {
        let j = &jets[i];
        MemObject::new(ObjectType::Jet, j.pt, j.eta, j.phi, j.mass).with_observable(Observable::BTag, tagging.btag_flag(i))
    };

    let mut objects: Vec<MemObject> = tagging.tagged.iter().map(|&i| jet_object(i)).collect();
    objects.extend(cat.w_candidates.iter().map(|&i| jet_object(i)));
    objects.extend(leptons.good.iter().map(|&i| {
        let l = &event.input.leptons[i];
        MemObject::new(ObjectType::Lepton, l.pt, l.eta, l.phi, l.mass).with_observable(Observable::Charge, l.charge as f64)
    }));
    objects.push(MemObject::new(ObjectType::Met, event.input.met_pt, 0.0, event.input.met_phi, 0.0));
    objects
}

pub struct MemStage {
    conf: MemConfig,
    configs: Vec<NamedConfiguration>,
}

impl MemStage {
    pub fn new(conf: &MemConfig, configs: Vec<NamedConfiguration>) -> Self {
        MemStage { conf: conf.clone(), configs }
    }

    /// Flag events whose default tth/ttbb probabilities are unusable.
    fn check_default(&self, event: &Event, res: &MemResults, ctx: &mut StageContext<'_>) {
        if !self.conf.calc_me || !self.configs.iter().any(|c| c.name == "default") {
            return;
        }
        let p_tth = res.get(Hypothesis::Tth, "default").map(|o| o.p);
        let p_ttbb = res.get(Hypothesis::Ttbb, "default").map(|o| o.p);
        let non_positive = p_tth.into_iter().chain(p_ttbb).any(|p| p <= 0.0);
        let low_ratio = match (p_tth, p_ttbb) {
            (Some(s), Some(b)) if s > 0.0 && b > 0.0 => s / (s + self.conf.bad_prob_weight * b) < self.conf.bad_prob_ratio,
            _ => false,
        };
        if non_positive || low_ratio {
            log::warn!("event {:?}: bad default probabilities tth={:?} ttbb={:?}", event.id(), p_tth, p_ttbb);
            ctx.counters.inc(self.name(), "bad_prob");
        }
    }
}

impl Stage for MemStage {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn counter_names(&self) -> Vec<String> {
        ["gate_passed", "not_me_category", "low_btag", "unmatched", "engine_calls", "budget_exceeded", "bad_prob"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let (cat, tagging, leptons) = match (event.category.get(), event.tagging.get(), event.leptons.get()) {
            (Some(c), Some(t), Some(l)) => (c, t, l),
            _ => {
                let err = mecore::Error::InputInsufficient("category or tagging missing".into());
                ctx.record_failure(self.name(), &err);
                event.mem.set(Err(err));
                return false;
            }
        };

        let decision = gate(cat, event.truth_matches.get(), &self.conf);
        ctx.counters.inc(self.name(), decision.counter_name());
        if decision != GateDecision::Passed {
            log::debug!("event {:?}: ME gate failed ({:?})", event.id(), decision);
            event.mem.set(Ok(MemResults::gated(decision)));
            return true;
        }

        let objects = assemble_objects(event, tagging, cat, leptons);
        let final_state = FinalState::from_lepton_count(leptons.good.len());
        let vars = if cat.category.misses_w_quark() {
            vec![PsVar::CosQbar1, PsVar::PhiQbar1]
        } else {
            Vec::new()
        };
        log::info!(
            "event {:?}: {} {:?} passes ME gate, {} objects, final state {:?}",
            event.id(),
            cat.category,
            cat.btag_category,
            objects.len(),
            final_state
        );

        let mut res = MemResults { gate: decision, final_state: Some(final_state), vars, entries: Vec::new(), truncated: false };
        'runs: for &hypothesis in &self.conf.hypotheses {
            for config in &self.configs {
                if ctx.budget_exhausted() {
                    log::warn!(
                        "event {:?}: time budget exhausted after {} engine runs",
                        event.id(),
                        res.entries.len()
                    );
                    ctx.counters.inc(self.name(), "budget_exceeded");
                    res.truncated = true;
                    break 'runs;
                }
                let output = if self.conf.calc_me {
                    ctx.engine.next_event();
                    ctx.engine.set_config(config);
                    for obj in &objects {
                        ctx.engine.push_object(obj.clone());
                    }
                    ctx.counters.inc(self.name(), "engine_calls");
                    ctx.engine.run(final_state, hypothesis, &res.vars)
                } else {
                    EngineOutput::default()
                };
                log::debug!("{} {}: p={:e} +- {:e}", hypothesis, config.name, output.p, output.p_err);
                res.entries.push(HypothesisResult { hypothesis, config_name: config.name.clone(), output });
            }
        }

        self.check_default(event, &res, ctx);
        let complete = !res.truncated;
        event.mem.set(Ok(res));
        complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::Counters;
    use crate::engine::{ConfigRegistry, IntegrationEngine};
    use crate::event::{EventInput, Jet, Lepton};
    use crate::stages::category::Category;
    use crate::stages::jets::TaggingSource;
    use crate::stages::truth_match::{MatchCounts, TruthSizes};
    use std::collections::BTreeMap;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        pushed: Vec<MemObject>,
        p: f64,
    }

    impl IntegrationEngine for Recorder {
        fn next_event(&mut self) {
            self.calls.push("next_event".into());
            self.pushed.clear();
        }
        fn set_config(&mut self, config: &NamedConfiguration) {
            self.calls.push(format!("set_config {}", config.name));
        }
        fn push_object(&mut self, object: MemObject) {
            self.calls.push("push".into());
            self.pushed.push(object);
        }
        fn run(&mut self, _fs: FinalState, hypothesis: Hypothesis, _vars: &[PsVar]) -> EngineOutput {
            self.calls.push(format!("run {}", hypothesis));
            EngineOutput { p: self.p, ..Default::default() }
        }
    }

    /// Returns fixed probabilities per hypothesis.
    struct FixedOdds {
        p_tth: f64,
        p_ttbb: f64,
    }

    impl IntegrationEngine for FixedOdds {
        fn next_event(&mut self) {}
        fn set_config(&mut self, _config: &NamedConfiguration) {}
        fn push_object(&mut self, _object: MemObject) {}
        fn run(&mut self, _fs: FinalState, hypothesis: Hypothesis, _vars: &[PsVar]) -> EngineOutput {
            let p = match hypothesis {
                Hypothesis::Tth => self.p_tth,
                Hypothesis::Ttbb => self.p_ttbb,
            };
            EngineOutput { p, ..Default::default() }
        }
    }

    fn categorization(category: Category, btag: BTagCategory) -> Categorization {
        Categorization {
            category,
            category_code: category.code(),
            btag_category: btag,
            btag_category_code: btag.code(),
            w_candidates: vec![4, 5],
        }
    }

    fn event(category: Category, btag: BTagCategory) -> Event {
        let jets = (0..6).map(|i| Jet::new(100.0 - 10.0 * i as f64, 0.1 * i as f64, 0.5 * i as f64, 5.0, 0.5)).collect();
        let lepton = Lepton {
            pt: 40.0,
            eta: 0.5,
            phi: 1.0,
            mass: 0.0,
            pdg_id: 13,
            charge: -1,
            rel_iso03: 0.0,
            rel_iso04: 0.0,
            tight_id: true,
            loose_id: true,
        };
        let input = EventInput {
            run: 1,
            lumi: 1,
            evt: 7,
            jets,
            leptons: vec![lepton],
            met_pt: 55.0,
            met_phi: -2.0,
            ..Default::default()
        };
        let mut ev = Event::new(input);
        ev.leptons.set(Ok(LeptonSelection { is_sl: true, good: vec![0], ..Default::default() }));
        ev.tagging.set(Ok(JetTagging {
            source: TaggingSource::LikelihoodRatio,
            tagged: vec![0, 1, 2, 3],
            untagged: vec![4, 5],
            flagged: vec![0, 1, 2, 3],
        }));
        ev.category.set(Ok(categorization(category, btag)));
        ev
    }

    fn summary(tb: usize, tb_truth: usize) -> TruthMatchSummary {
        TruthMatchSummary {
            counts: MatchCounts { tb, ..Default::default() },
            truth_sizes: TruthSizes { wq: 2, tb: tb_truth, hb: 2 },
            ..Default::default()
        }
    }

    fn requiring_tb(n: usize) -> MemConfig {
        let mut conf = MemConfig::default();
        let mut req = BTreeMap::new();
        req.insert(MatchRequirement::Tb, n);
        conf.require_matched.insert(Category::Cat1, req);
        conf
    }

    #[test]
    fn test_gate_category_and_btag() {
        let conf = MemConfig::default();
        let nocat = categorization(Category::NoCat, BTagCategory::H);
        assert_eq!(gate(&nocat, None, &conf), GateDecision::NotMeCategory);
        let low = categorization(Category::Cat1, BTagCategory::L);
        assert_eq!(gate(&low, None, &conf), GateDecision::LowBTag);
        let high = categorization(Category::Cat6, BTagCategory::H);
        assert_eq!(gate(&high, None, &conf), GateDecision::Passed);
    }

    #[test]
    fn test_gate_auto_passes_short_truth() {
        let cat = categorization(Category::Cat1, BTagCategory::H);
        let conf = requiring_tb(4);
        // three truth b quarks cannot satisfy a requirement of four
        assert_eq!(gate(&cat, Some(&summary(0, 3)), &conf), GateDecision::Passed);
        assert_eq!(gate(&cat, None, &conf), GateDecision::Passed);

        let conf = requiring_tb(2);
        assert_eq!(gate(&cat, Some(&summary(1, 2)), &conf), GateDecision::Unmatched(MatchRequirement::Tb));
        assert_eq!(gate(&cat, Some(&summary(2, 2)), &conf), GateDecision::Passed);
    }

    #[test]
    fn test_object_order_and_observables() {
        let ev = event(Category::Cat1, BTagCategory::H);
        let objects = assemble_objects(
            &ev,
            ev.tagging.get().unwrap(),
            ev.category.get().unwrap(),
            ev.leptons.get().unwrap(),
        );
        let kinds: Vec<ObjectType> = objects.iter().map(|o| o.kind).collect();
        assert_eq!(kinds[..6], [ObjectType::Jet; 6]);
        assert_eq!(kinds[6], ObjectType::Lepton);
        assert_eq!(kinds[7], ObjectType::Met);
        assert_eq!(objects[0].observable(Observable::BTag), Some(1.0));
        assert_eq!(objects[4].observable(Observable::BTag), Some(0.0));
        assert_eq!(objects[6].observable(Observable::Charge), Some(-1.0));
    }

    #[test]
    fn test_runs_every_hypothesis_and_config() {
        let reg = ConfigRegistry::standard();
        let configs = reg.resolve(&["default".to_string(), "NoJacobian".to_string()]).unwrap();
        let stage = MemStage::new(&MemConfig::default(), configs);
        let mut counters = Counters::new();
        let mut engine = Recorder { p: 1.0e-20, ..Default::default() };

        let mut ev = event(Category::Cat2, BTagCategory::H);
        {
            let mut ctx = StageContext::new(&mut counters, &mut engine, None);
            assert!(stage.process(&mut ev, &mut ctx));
        }
        let res = ev.mem.get().unwrap();
        assert_eq!(res.entries.len(), 4);
        assert_eq!(res.final_state, Some(FinalState::LH));
        assert_eq!(res.vars, vec![PsVar::CosQbar1, PsVar::PhiQbar1]);
        assert_eq!(res.entries[1].config_name, "NoJacobian");
        assert_eq!(res.entries[2].hypothesis, Hypothesis::Ttbb);

        let per_run = 3 + 8;
        assert_eq!(engine.calls.len(), 4 * per_run);
        assert_eq!(engine.calls[0], "next_event");
        assert_eq!(engine.calls[1], "set_config default");
        assert_eq!(engine.calls[per_run - 1], "run tth");
        assert_eq!(engine.pushed.len(), 8);
        assert_eq!(counters.get("mem", "engine_calls"), 4);
        assert_eq!(counters.get("mem", "bad_prob"), 0);
    }

    #[test]
    fn test_gate_failure_is_empty_and_counted() {
        let stage = MemStage::new(&MemConfig::default(), ConfigRegistry::standard().resolve(&["default".to_string()]).unwrap());
        let mut counters = Counters::new();
        let mut engine = Recorder::default();
        let mut ev = event(Category::Cat1, BTagCategory::L);
        {
            let mut ctx = StageContext::new(&mut counters, &mut engine, None);
            assert!(stage.process(&mut ev, &mut ctx));
        }
        assert!(ev.mem.get().unwrap().entries.is_empty());
        assert!(engine.calls.is_empty());
        assert_eq!(counters.get("mem", "low_btag"), 1);
    }

    #[test]
    fn test_without_calc_me_records_defaults() {
        let conf = MemConfig { calc_me: false, ..Default::default() };
        let stage = MemStage::new(&conf, ConfigRegistry::standard().resolve(&["default".to_string()]).unwrap());
        let mut counters = Counters::new();
        let mut engine = Recorder::default();
        let mut ev = event(Category::Cat1, BTagCategory::H);
        {
            let mut ctx = StageContext::new(&mut counters, &mut engine, None);
            assert!(stage.process(&mut ev, &mut ctx));
        }
        let res = ev.mem.get().unwrap();
        assert_eq!(res.entries.len(), 2);
        assert!(res.entries.iter().all(|r| r.output == EngineOutput::default()));
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn test_bad_probability_is_flagged() {
        let stage = MemStage::new(&MemConfig::default(), ConfigRegistry::standard().resolve(&["default".to_string()]).unwrap());
        let mut counters = Counters::new();
        let mut engine = Recorder { p: 0.0, ..Default::default() };
        let mut ev = event(Category::Cat1, BTagCategory::H);
        {
            let mut ctx = StageContext::new(&mut counters, &mut engine, None);
            assert!(stage.process(&mut ev, &mut ctx));
        }
        assert_eq!(ev.mem.get().unwrap().entries.len(), 2);
        assert_eq!(counters.get("mem", "bad_prob"), 1);
    }

    #[test]
    fn test_low_signal_ratio_is_flagged() {
        let conf = MemConfig::default();
        let stage = MemStage::new(&conf, ConfigRegistry::standard().resolve(&["default".to_string()]).unwrap());
        let flagged = |p_tth: f64| {
            let mut counters = Counters::new();
            let mut engine = FixedOdds { p_tth, p_ttbb: 1.0 };
            let mut ev = event(Category::Cat1, BTagCategory::H);
            {
                let mut ctx = StageContext::new(&mut counters, &mut engine, None);
                assert!(stage.process(&mut ev, &mut ctx));
            }
            counters.get("mem", "bad_prob")
        };

        // ratio = p_tth / (p_tth + 0.02 * p_ttbb), cut at 1e-4
        assert!(1.0e-6 / (1.0e-6 + conf.bad_prob_weight) < conf.bad_prob_ratio);
        assert_eq!(flagged(1.0e-6), 1);
        assert!(2.1e-6 / (2.1e-6 + conf.bad_prob_weight) > conf.bad_prob_ratio);
        assert_eq!(flagged(2.1e-6), 0);
        assert_eq!(flagged(0.5), 0);
    }

    #[test]
    fn test_expired_budget_truncates() {
        let stage = MemStage::new(&MemConfig::default(), ConfigRegistry::standard().resolve(&["default".to_string()]).unwrap());
        let mut counters = Counters::new();
        let mut engine = Recorder::default();
        let mut ev = event(Category::Cat1, BTagCategory::H);
        {
            let mut ctx = StageContext::new(&mut counters, &mut engine, Some(Instant::now()));
            assert!(!stage.process(&mut ev, &mut ctx));
        }
        let res = ev.mem.get().unwrap();
        assert!(res.truncated);
        assert!(res.entries.is_empty());
        assert_eq!(counters.get("mem", "budget_exceeded"), 1);
    }
}
