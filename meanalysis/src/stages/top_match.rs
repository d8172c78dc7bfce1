//! Diagnostic matching of the hadronic top decay quarks to jets and to the subjets of a
//! boosted top candidate. Runs on cat1 events only and never rejects an event.

use serde::Serialize;

use mecore::algorithm::matching::unique_delta_r_assignment;
use mecore::kinematics::object::Kinematic;

use crate::config::TopMatchConfig;
use crate::event::{Event, GenParticle, GenTruth, TopCandidate};
use crate::stages::category::Category;
use crate::stages::stage::{Stage, StageContext};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopMatchResult {
    /// Index into the input top candidates.
    pub candidate: usize,
    /// Index into the top b quarks of the b from the hadronic top.
    pub hadronic_b: usize,
    /// Input jet indices for (b, q1, q2).
    pub jet_links: Vec<usize>,
    pub jet_delta_r: Vec<f64>,
    /// Subjet indices (0 = W1, 1 = W2, 2 = non-W) for (b, q1, q2).
    pub subjet_links: Vec<usize>,
    pub subjet_delta_r: Vec<f64>,
}

impl TopMatchResult {
    pub fn jet_sum_delta_r(&self) -> f64 {
        self.jet_delta_r.iter().sum()
    }

    pub fn subjet_sum_delta_r(&self) -> f64 {
        self.subjet_delta_r.iter().sum()
    }
}

#[inline]
fn passes_cuts(c: &TopCandidate, conf: &TopMatchConfig) -> bool {
    c.pt > conf.min_pt && c.mass > conf.min_mass && c.mass < conf.max_mass && c.f_w < conf.max_f_w
}

/// Candidates passing the cuts, and the one closest to the top mass among them.
pub fn select_top_candidate(candidates: &[TopCandidate], conf: &TopMatchConfig) -> (usize, Option<usize>) {
    let passing: Vec<usize> = (0..candidates.len()).filter(|&i| passes_cuts(&candidates[i], conf)).collect();
    let best = passing.iter().copied().min_by(|&a, &b| {
        let da = (candidates[a].mass - conf.top_mass).abs();
        let db = (candidates[b].mass - conf.top_mass).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    (passing.len(), best)
}

/// Drop a repeated trailing pair of W quarks (same pt as the leading pair).
pub fn dedup_wz_quarks(quarks: &[GenParticle]) -> &[GenParticle] {
    let n = quarks.len();
    if n >= 4 && quarks[n - 1].pt == quarks[1].pt && quarks[n - 2].pt == quarks[0].pt {
        &quarks[..n - 2]
    } else {
        quarks
    }
}

/// Why the truth quarks of the hadronic top could not be assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuarkShortfall {
    TooFewW,
    TooFewB,
    TooManyW,
    TooManyB,
}

impl QuarkShortfall {
    pub fn counter_name(&self) -> &'static str {
        match self {
            QuarkShortfall::TooFewW => "too_few_wz",
            QuarkShortfall::TooFewB => "too_few_b",
            QuarkShortfall::TooManyW => "too_many_wz",
            QuarkShortfall::TooManyB => "too_many_b",
        }
    }
}

/// (b, q1, q2) of the hadronic top and the index of its b among the top b quarks.
///
/// The hadronic b is the one whose combination with both W quarks lies closer to the top
/// mass; the first b wins a tie.
pub fn hadronic_top_quarks(truth: &GenTruth, top_mass: f64) -> Result<(usize, [GenParticle; 3]), QuarkShortfall> {
    let wq = dedup_wz_quarks(&truth.wz_quarks);
    let bq = &truth.b_from_top;
    if wq.len() < 2 {
        return Err(QuarkShortfall::TooFewW);
    }
    if bq.len() < 2 {
        return Err(QuarkShortfall::TooFewB);
    }
    if wq.len() > 2 {
        return Err(QuarkShortfall::TooManyW);
    }
    if bq.len() > 2 {
        return Err(QuarkShortfall::TooManyB);
    }

    let w_sum = wq[0].p4() + wq[1].p4();
    let delta = |b: &GenParticle| ((b.p4() + w_sum).mass() - top_mass).abs();
    let hadronic = if delta(&bq[1]) < delta(&bq[0]) { 1 } else { 0 };
    Ok((hadronic, [bq[hadronic], wq[0], wq[1]]))
}

#[derive(Clone, Debug)]
pub struct TopCandidateMatchStage {
    conf: TopMatchConfig,
}

impl TopCandidateMatchStage {
    pub fn new(conf: &TopMatchConfig) -> Self {
        TopCandidateMatchStage { conf: conf.clone() }
    }

    fn skip(&self, event: &mut Event, ctx: &mut StageContext<'_>, counter: &str, err: mecore::Error) -> bool {
        ctx.counters.inc(self.name(), counter);
        event.top_match.set(Err(err));
        true
    }
}

impl Stage for TopCandidateMatchStage {
    fn name(&self) -> &'static str {
        "top_match"
    }

    fn counter_names(&self) -> Vec<String> {
        [
            "not_cat1",
            "no_truth",
            "no_candidate",
            "none_survived_cuts",
            "one_survived_cuts",
            "several_survived_cuts",
            "too_few_wz",
            "too_few_b",
            "too_many_wz",
            "too_many_b",
            "no_jet_for_quark",
            "two_quarks_one_jet",
            "no_unique_match",
            "successful",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let is_cat1 = matches!(event.category.get(), Some(c) if c.category == Category::Cat1);
        if !is_cat1 {
            return self.skip(event, ctx, "not_cat1", mecore::Error::InputInsufficient("event is not cat1".into()));
        }
        if event.input.top_candidates.is_empty() {
            return self.skip(event, ctx, "no_candidate", mecore::Error::InputInsufficient("no top candidate".into()));
        }

        let (n_passing, best) = select_top_candidate(&event.input.top_candidates, &self.conf);
        let candidate = match (n_passing, best) {
            (1, Some(c)) => {
                ctx.counters.inc(self.name(), "one_survived_cuts");
                c
            }
            (_, Some(c)) => {
                ctx.counters.inc(self.name(), "several_survived_cuts");
                c
            }
            (_, None) => {
                let err = mecore::Error::InputInsufficient("no top candidate passes the cuts".into());
                return self.skip(event, ctx, "none_survived_cuts", err);
            }
        };

        let truth = match event.truth() {
            Some(t) => t.clone(),
            None => {
                return self.skip(event, ctx, "no_truth", mecore::Error::InputInsufficient("no generator truth".into()));
            }
        };
        let (hadronic_b, quarks) = match hadronic_top_quarks(&truth, self.conf.top_mass) {
            Ok(q) => q,
            Err(shortfall) => {
                let err = mecore::Error::InputInsufficient(format!("top quarks: {}", shortfall.counter_name()));
                return self.skip(event, ctx, shortfall.counter_name(), err);
            }
        };

        let good: Vec<usize> = event.jets.get().map(|s| s.good.clone()).unwrap_or_default();
        let good_jets: Vec<_> = good.iter().map(|&i| &event.input.jets[i]).collect();
        let subjets = event.input.top_candidates[candidate].subjets();

        let matched = unique_delta_r_assignment(&quarks, &good_jets, self.conf.delta_r).and_then(|jets| {
            unique_delta_r_assignment(&quarks, &subjets, self.conf.delta_r).map(|subs| (jets, subs))
        });

        match matched {
            Ok((jets, subs)) => {
                ctx.counters.inc(self.name(), "successful");
                log::debug!(
                    "event {:?}: top candidate {} matched, subjet links {:?}",
                    event.id(),
                    candidate,
                    subs.links
                );
                let res = TopMatchResult {
                    candidate,
                    hadronic_b,
                    jet_links: jets.links.iter().map(|&k| good[k]).collect(),
                    jet_delta_r: jets.delta_r,
                    subjet_links: subs.links,
                    subjet_delta_r: subs.delta_r,
                };
                event.top_match.set(Ok(res));
                true
            }
            Err(failure) => self.skip(event, ctx, failure.counter_name(), failure.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JetConfig;
    use crate::counters::Counters;
    use crate::engine::NullEngine;
    use crate::event::{EventInput, Jet};
    use crate::stages::category::{BTagCategory, Categorization};
    use crate::stages::jets::select_jets;
    use mecore::kinematics::object::PtEtaPhiM;

    fn particle(pt: f64, eta: f64, phi: f64) -> GenParticle {
        GenParticle { pt, eta, phi, mass: 0.0, pdg_id: 0 }
    }

    fn truth() -> GenTruth {
        GenTruth {
            wz_quarks: vec![particle(50.0, 0.0, 0.0), particle(40.0, 0.5, 0.5)],
            b_from_top: vec![particle(60.0, -0.5, 0.2), particle(150.0, -2.0, 3.0)],
            ..Default::default()
        }
    }

    fn candidate(mass: f64) -> TopCandidate {
        TopCandidate {
            pt: 250.0,
            eta: 0.0,
            phi: 0.2,
            mass,
            f_w: 0.1,
            sj_w1: PtEtaPhiM::new(50.0, 0.0, 0.0, 0.0),
            sj_w2: PtEtaPhiM::new(40.0, 0.5, 0.5, 0.0),
            sj_non_w: PtEtaPhiM::new(60.0, -0.5, 0.2, 0.0),
        }
    }

    fn cat1_event(truth: Option<GenTruth>) -> Event {
        let input = EventInput {
            jets: vec![
                Jet::new(60.0, -0.5, 0.2, 5.0, 0.9),
                Jet::new(50.0, 0.0, 0.0, 5.0, 0.1),
                Jet::new(40.0, 0.5, 0.5, 5.0, 0.2),
                Jet::new(45.0, 2.0, -2.0, 5.0, 0.8),
            ],
            truth,
            top_candidates: vec![candidate(130.0), candidate(175.0)],
            ..Default::default()
        };
        let mut event = Event::new(input);
        let sel = select_jets(&event.input.jets, &JetConfig::default());
        event.jets.set(Ok(sel));
        event.category.set(Ok(Categorization {
            category: Category::Cat1,
            category_code: 1,
            btag_category: BTagCategory::H,
            btag_category_code: 1,
            w_candidates: vec![1, 2],
        }));
        event
    }

    #[test]
    fn test_candidate_selection() {
        let conf = TopMatchConfig::default();
        let mut wide = candidate(175.0);
        wide.f_w = 0.5;
        let cands = vec![candidate(130.0), wide, candidate(175.0), candidate(230.0)];
        assert_eq!(select_top_candidate(&cands, &conf), (2, Some(2)));
        assert_eq!(select_top_candidate(&cands[3..], &conf), (0, None));
    }

    #[test]
    fn test_hadronic_b_closest_to_top_mass() {
        let mut t = truth();
        let (had, quarks) = hadronic_top_quarks(&t, 172.04).unwrap();
        assert_eq!(had, 0);
        assert_eq!(quarks[0].pt, 60.0);
        t.b_from_top.swap(0, 1);
        assert_eq!(hadronic_top_quarks(&t, 172.04).unwrap().0, 1);
    }

    #[test]
    fn test_quark_shortfalls() {
        let mut t = truth();
        let q = t.wz_quarks.clone();
        // repeated pair collapses back to two quarks
        t.wz_quarks = vec![q[0], q[1], q[0], q[1]];
        assert_eq!(dedup_wz_quarks(&t.wz_quarks).len(), 2);
        assert!(hadronic_top_quarks(&t, 172.04).is_ok());

        t.wz_quarks = vec![q[0], q[1], particle(10.0, 1.0, 1.0)];
        assert_eq!(hadronic_top_quarks(&t, 172.04).unwrap_err(), QuarkShortfall::TooManyW);
        t.wz_quarks = vec![q[0]];
        t.b_from_top.pop();
        assert_eq!(hadronic_top_quarks(&t, 172.04).unwrap_err(), QuarkShortfall::TooFewW);
        t.wz_quarks = q;
        assert_eq!(hadronic_top_quarks(&t, 172.04).unwrap_err(), QuarkShortfall::TooFewB);
    }

    #[test]
    fn test_matches_jets_and_subjets() {
        let stage = TopCandidateMatchStage::new(&TopMatchConfig::default());
        let mut counters = Counters::new();
        let mut engine = NullEngine::default();
        let mut ctx = StageContext::new(&mut counters, &mut engine, None);

        let mut event = cat1_event(Some(truth()));
        assert!(stage.process(&mut event, &mut ctx));
        let res = event.top_match.get().unwrap();
        assert_eq!(res.candidate, 1);
        assert_eq!(res.hadronic_b, 0);
        assert_eq!(res.jet_links, vec![0, 1, 2]);
        assert_eq!(res.subjet_links, vec![2, 0, 1]);
        assert!(res.jet_sum_delta_r() < 1e-9);
        assert_eq!(counters.get("top_match", "successful"), 1);
        assert_eq!(counters.get("top_match", "several_survived_cuts"), 1);
    }

    #[test]
    fn test_never_rejects_event() {
        let stage = TopCandidateMatchStage::new(&TopMatchConfig::default());
        let mut counters = Counters::new();
        let mut engine = NullEngine::default();

        let mut data = cat1_event(None);
        let mut ctx = StageContext::new(&mut counters, &mut engine, None);
        assert!(stage.process(&mut data, &mut ctx));
        assert!(data.top_match.error().is_some());

        let mut not_cat1 = Event::new(EventInput::default());
        assert!(stage.process(&mut not_cat1, &mut ctx));
        assert_eq!(counters.get("top_match", "no_truth"), 1);
        assert_eq!(counters.get("top_match", "not_cat1"), 1);
    }
}
