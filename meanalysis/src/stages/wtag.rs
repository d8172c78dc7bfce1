//! W-boson mass reconstruction from pairs of untagged jets.

use serde::Serialize;

use mecore::algorithm::pairs::{rank_pairs_by_mass, W_MASS_TARGET};
use mecore::kinematics::object::ScoredObject;

use crate::event::{Event, Jet};
use crate::stages::stage::{Stage, StageContext};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WTagResult {
    /// Mass of the pair closest to the W mass; `None` with fewer than two untagged jets.
    pub w_mass: Option<f64>,
    /// All pair masses, best first.
    pub masses: Vec<f64>,
    /// Input jet indices of the two best pairs.
    pub best_pairs: Vec<(usize, usize)>,
    /// Jets proposed as W-decay quarks.
    pub candidates: Vec<usize>,
}

/// Rank all untagged pairs and collect the members of the two best ones.
pub fn reconstruct_w(jets: &[Jet], untagged: &[usize]) -> WTagResult {
    let subset: Vec<ScoredObject> = untagged
        .iter()
        .map(|&i| ScoredObject::from_kinematic(&jets[i], false, i))
        .collect();
    let ranked = rank_pairs_by_mass(&subset, W_MASS_TARGET);
    if ranked.is_empty() {
        return WTagResult { candidates: untagged.to_vec(), ..Default::default() };
    }

    let best_pairs: Vec<(usize, usize)> = ranked
        .iter()
        .take(2)
        .map(|p| (subset[p.left].index, subset[p.right].index))
        .collect();

    let mut candidates = Vec::with_capacity(4);
    for &(a, b) in &best_pairs {
        for j in [a, b] {
            if !candidates.contains(&j) {
                candidates.push(j);
            }
        }
    }

    WTagResult {
        w_mass: Some(ranked[0].score),
        masses: ranked.iter().map(|p| p.score).collect(),
        best_pairs,
        candidates,
    }
}

#[derive(Clone, Debug, Default)]
pub struct WTagStage;

impl Stage for WTagStage {
    fn name(&self) -> &'static str {
        "wtag"
    }

    fn counter_names(&self) -> Vec<String> {
        vec!["input_insufficient".to_string()]
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let untagged = match event.tagging.get() {
            Some(t) => t.untagged.clone(),
            None => {
                let err = mecore::Error::InputInsufficient("jet tagging missing".into());
                ctx.record_failure(self.name(), &err);
                event.wtag.set(Err(err));
                return false;
            }
        };

        let res = reconstruct_w(&event.input.jets, &untagged);
        match res.w_mass {
            Some(m) => log::debug!("event {:?}: W mass {:.2} from pairs {:?}", event.id(), m, res.best_pairs),
            None => ctx.counters.inc(self.name(), "input_insufficient"),
        }
        event.wtag.set(Ok(res));
        true
    }
}
