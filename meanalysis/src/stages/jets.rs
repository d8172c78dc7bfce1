//! Jet selection and working-point b-tag counting.

use std::collections::BTreeMap;

use serde::Serialize;

use mecore::kinematics::object::indices_by_pt_desc;

use crate::config::{JetConfig, WorkingPoint};
use crate::event::{Event, Jet};
use crate::stages::stage::{Stage, StageContext};

/// Selected jets; every index points into the input jet list.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct JetSelection {
    /// Jets passing the kinematic cuts, pt-descending, truncated.
    pub good: Vec<usize>,
    pub n_tagged_by_wp: BTreeMap<String, usize>,
    /// Split of `good` at the selected working point.
    pub btagged_disc: Vec<usize>,
    pub buntagged_disc: Vec<usize>,
    /// Tagged jets with |hadron flavour| 5.
    pub n_tagwp_tagged_true_bjets: usize,
}

impl JetSelection {
    pub fn n_jets(&self) -> usize {
        self.good.len()
    }
}

/// How the final tagged/untagged split was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaggingSource {
    LikelihoodRatio,
    Discriminant,
}

/// Final b-tag split used by the W-tag, category and integration stages.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JetTagging {
    pub source: TaggingSource,
    pub tagged: Vec<usize>,
    pub untagged: Vec<usize>,
    /// Tagged jets with the highest discriminant, treated as b quarks downstream.
    pub flagged: Vec<usize>,
}

impl JetTagging {
    /// 1 for jets treated as b quarks, 0 otherwise.
    pub fn btag_flag(&self, jet: usize) -> f64 {
        if self.flagged.contains(&jet) {
            1.0
        } else {
            0.0
        }
    }

    pub fn is_flagged(&self, jet: usize) -> bool {
        self.flagged.contains(&jet)
    }
}

/// Jets among `candidates` with pt above and |eta| below the cuts, pt-descending.
pub fn filter_jets(jets: &[Jet], candidates: &[usize], pt: f64, eta: f64, max_jets: usize) -> Vec<usize> {
    let kept: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| jets[i].pt > pt && jets[i].eta.abs() < eta)
        .collect();
    let subset: Vec<&Jet> = kept.iter().map(|&i| &jets[i]).collect();
    let mut sorted: Vec<usize> = indices_by_pt_desc(&subset).into_iter().map(|k| kept[k]).collect();
    sorted.truncate(max_jets);
    sorted
}

/// Split `good` into (tagged, untagged) at a working point. Order is preserved.
pub fn split_by_working_point(jets: &[Jet], good: &[usize], wp: &WorkingPoint) -> (Vec<usize>, Vec<usize>) {
    good.iter().copied().partition(|&i| jets[i].discriminant(wp.algo) > wp.cut)
}

pub fn select_jets(jets: &[Jet], conf: &JetConfig) -> JetSelection {
    let all: Vec<usize> = (0..jets.len()).collect();
    let good = filter_jets(jets, &all, conf.pt, conf.eta, conf.max_jets);

    let mut sel = JetSelection { good, ..Default::default() };
    for (name, wp) in &conf.btag_wps {
        let (tagged, untagged) = split_by_working_point(jets, &sel.good, wp);
        sel.n_tagged_by_wp.insert(name.clone(), tagged.len());
        if *name == conf.btag_wp {
            sel.btagged_disc = tagged;
            sel.buntagged_disc = untagged;
        }
    }
    sel.n_tagwp_tagged_true_bjets = sel
        .btagged_disc
        .iter()
        .filter(|&&i| jets[i].mc_flavour.abs() == 5)
        .count();
    sel
}

#[derive(Clone, Debug)]
pub struct JetSelector {
    conf: JetConfig,
}

impl JetSelector {
    pub fn new(conf: &JetConfig) -> Self {
        JetSelector { conf: conf.clone() }
    }
}

impl Stage for JetSelector {
    fn name(&self) -> &'static str {
        "jets"
    }

    fn counter_names(&self) -> Vec<String> {
        let mut names = vec!["any".to_string(), "good".to_string()];
        names.extend(self.conf.btag_wps.keys().cloned());
        names
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        for j in &event.input.jets {
            log::trace!("input jet pt={} eta={} phi={} m={} csv={}", j.pt, j.eta, j.phi, j.mass, j.btag_csv);
        }
        let sel = select_jets(&event.input.jets, &self.conf);

        ctx.counters.add(self.name(), "any", event.input.jets.len() as u64);
        ctx.counters.add(self.name(), "good", sel.good.len() as u64);
        for (name, n) in &sel.n_tagged_by_wp {
            ctx.counters.add(self.name(), name, *n as u64);
        }

        let passes = sel.good.len() >= self.conf.min_jets;
        event.jets.set(Ok(sel));
        passes
    }
}
