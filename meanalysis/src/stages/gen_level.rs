//! Generator-level decay category and radiation-mode flavour counting.

use serde::{Deserialize, Serialize};

use mecore::kinematics::object::Kinematic;

use crate::config::MatchingConfig;
use crate::event::{Event, GenParticle, GenTruth, Jet};
use crate::stages::stage::{Stage, StageContext};

/// The W-quark branch repeats every quark once; only the first half is kept.
pub fn w_quarks(truth: &GenTruth) -> &[GenParticle] {
    &truth.wz_quarks[..truth.wz_quarks.len() / 2]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenCategory {
    /// One lepton, one neutrino, two W quarks, two top b quarks
    Sl,
    /// Two leptons, two neutrinos, no W quarks, two top b quarks
    Dl,
    /// No leptons, four W quarks, two top b quarks
    Fh,
}

impl GenCategory {
    pub fn code(&self) -> i32 {
        match self {
            GenCategory::Sl => 0,
            GenCategory::Dl => 1,
            GenCategory::Fh => 2,
        }
    }
}

pub fn gen_category(truth: &GenTruth) -> Option<GenCategory> {
    let counts = (
        truth.lep_from_top.len(),
        truth.nu_from_top.len(),
        w_quarks(truth).len(),
        truth.b_from_top.len(),
    );
    match counts {
        (1, 1, 2, 2) => Some(GenCategory::Sl),
        (2, 2, 0, 2) => Some(GenCategory::Dl),
        (0, 0, 4, 2) => Some(GenCategory::Fh),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GenSummary {
    pub gen_category: Option<GenCategory>,
    pub gen_category_code: i32,
    /// Good jets away from the top b quarks with true b flavour.
    pub n_match_sim_b: usize,
    /// As above, with true c flavour.
    pub n_match_sim_c: usize,
}

/// Count additional heavy-flavour jets not attributable to the top b quarks.
pub fn radiation_counts(jets: &[Jet], good: &[usize], b_from_top: &[GenParticle], conf: &MatchingConfig) -> (usize, usize) {
    let mut n_b = 0;
    let mut n_c = 0;
    for &i in good {
        let jet = &jets[i];
        if !(jet.pt() > conf.radiation_pt && jet.eta().abs() < conf.radiation_eta) {
            continue;
        }
        if b_from_top.iter().any(|b| b.delta_r_to(jet) < conf.radiation_delta_r) {
            continue;
        }
        match jet.mc_flavour.abs() {
            5 => n_b += 1,
            4 => n_c += 1,
            _ => {}
        }
    }
    (n_b, n_c)
}

#[derive(Clone, Debug)]
pub struct GenLevelStage {
    conf: MatchingConfig,
}

impl GenLevelStage {
    pub fn new(conf: &MatchingConfig) -> Self {
        GenLevelStage { conf: conf.clone() }
    }
}

impl Stage for GenLevelStage {
    fn name(&self) -> &'static str {
        "gen"
    }

    fn counter_names(&self) -> Vec<String> {
        vec!["sl".to_string(), "dl".to_string(), "fh".to_string(), "none".to_string(), "data".to_string()]
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let truth = match event.truth() {
            Some(t) => t,
            None => {
                ctx.counters.inc(self.name(), "data");
                event.gen.set(Err(mecore::Error::InputInsufficient("no generator truth".into())));
                return true;
            }
        };
        let good: &[usize] = event.jets.get().map(|s| s.good.as_slice()).unwrap_or(&[]);

        let cat = gen_category(truth);
        let (n_b, n_c) = radiation_counts(&event.input.jets, good, &truth.b_from_top, &self.conf);
        let key = match cat {
            Some(GenCategory::Sl) => "sl",
            Some(GenCategory::Dl) => "dl",
            Some(GenCategory::Fh) => "fh",
            None => "none",
        };
        ctx.counters.inc(self.name(), key);
        log::trace!(
            "gen: {} W quarks, {} top b, {} higgs b, category {:?}",
            w_quarks(truth).len(),
            truth.b_from_top.len(),
            truth.b_from_higgs.len(),
            cat
        );

        let summary = GenSummary {
            gen_category: cat,
            gen_category_code: cat.map(|c| c.code()).unwrap_or(-1),
            n_match_sim_b: n_b,
            n_match_sim_c: n_c,
        };
        event.gen.set(Ok(summary));
        true
    }
}
