//! Angular matching of good jets to generator quarks from W, top and Higgs decays.

use serde::{Deserialize, Serialize};

use mecore::algorithm::matching::{LabelledMatcher, TruthMatch};

use crate::config::MatchingConfig;
use crate::event::{Event, GenParticle, GenTruth, Jet};
use crate::stages::gen_level::w_quarks;
use crate::stages::jets::JetTagging;
use crate::stages::stage::{Stage, StageContext};

/// Truth collection a jet can be matched to. Declaration order is the tie-break priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLabel {
    /// Light quark from W decay
    Wq,
    /// b quark from top decay
    Tb,
    /// b quark from Higgs decay
    Hb,
}

impl MatchLabel {
    pub const ALL: [MatchLabel; 3] = [MatchLabel::Wq, MatchLabel::Tb, MatchLabel::Hb];
}

/// Match count a category may require: plain, or also consistent with the jet's b-tag flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRequirement {
    Wq,
    WqBtag,
    Tb,
    TbBtag,
    Hb,
    HbBtag,
}

impl MatchRequirement {
    pub const ALL: [MatchRequirement; 6] = [
        MatchRequirement::Wq,
        MatchRequirement::WqBtag,
        MatchRequirement::Tb,
        MatchRequirement::TbBtag,
        MatchRequirement::Hb,
        MatchRequirement::HbBtag,
    ];

    pub fn label(&self) -> MatchLabel {
        match self {
            MatchRequirement::Wq | MatchRequirement::WqBtag => MatchLabel::Wq,
            MatchRequirement::Tb | MatchRequirement::TbBtag => MatchLabel::Tb,
            MatchRequirement::Hb | MatchRequirement::HbBtag => MatchLabel::Hb,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRequirement::Wq => "wq",
            MatchRequirement::WqBtag => "wq_btag",
            MatchRequirement::Tb => "tb",
            MatchRequirement::TbBtag => "tb_btag",
            MatchRequirement::Hb => "hb",
            MatchRequirement::HbBtag => "hb_btag",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchCounts {
    pub wq: usize,
    pub wq_btag: usize,
    pub tb: usize,
    pub tb_btag: usize,
    pub hb: usize,
    pub hb_btag: usize,
}

impl MatchCounts {
    pub fn get(&self, req: MatchRequirement) -> usize {
        match req {
            MatchRequirement::Wq => self.wq,
            MatchRequirement::WqBtag => self.wq_btag,
            MatchRequirement::Tb => self.tb,
            MatchRequirement::TbBtag => self.tb_btag,
            MatchRequirement::Hb => self.hb,
            MatchRequirement::HbBtag => self.hb_btag,
        }
    }
}

/// Size of each truth collection used for matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TruthSizes {
    pub wq: usize,
    pub tb: usize,
    pub hb: usize,
}

impl TruthSizes {
    pub fn of(truth: &GenTruth) -> Self {
        TruthSizes {
            wq: w_quarks(truth).len(),
            tb: truth.b_from_top.len(),
            hb: truth.b_from_higgs.len(),
        }
    }

    pub fn get(&self, label: MatchLabel) -> usize {
        match label {
            MatchLabel::Wq => self.wq,
            MatchLabel::Tb => self.tb,
            MatchLabel::Hb => self.hb,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TruthMatchSummary {
    /// Good jets (input indices) in the order of `matches`.
    pub jets: Vec<usize>,
    pub matches: Vec<Option<TruthMatch<MatchLabel>>>,
    pub counts: MatchCounts,
    pub truth_sizes: TruthSizes,
}

/// Match every jet to the closest truth quark of any label.
///
/// Labels are tried in the order wq, tb, hb and a later candidate only wins when strictly
/// closer, so exact ties go to the earlier label and the lower truth index.
pub fn match_jets(
    jets: &[Jet],
    good: &[usize],
    truth: &GenTruth,
    conf: &MatchingConfig,
) -> Vec<Option<TruthMatch<MatchLabel>>> {
    let reco: Vec<&Jet> = good.iter().map(|&i| &jets[i]).collect();
    let collections: [(MatchLabel, &[GenParticle]); 3] = [
        (MatchLabel::Wq, w_quarks(truth)),
        (MatchLabel::Tb, truth.b_from_top.as_slice()),
        (MatchLabel::Hb, truth.b_from_higgs.as_slice()),
    ];
    LabelledMatcher::new(conf.delta_r).match_all(&reco, &collections)
}

/// Plain and tag-consistent match counts. W quarks count as consistent on jets not
/// flagged as b; top and Higgs b quarks on flagged jets.
pub fn count_matches(good: &[usize], matches: &[Option<TruthMatch<MatchLabel>>], tagging: &JetTagging) -> MatchCounts {
    let mut counts = MatchCounts::default();
    for (&jet, m) in good.iter().zip(matches) {
        let label = match m {
            Some(tm) => tm.label,
            None => continue,
        };
        let flagged = tagging.is_flagged(jet);
        match label {
            MatchLabel::Wq => {
                counts.wq += 1;
                if !flagged {
                    counts.wq_btag += 1;
                }
            }
            MatchLabel::Tb => {
                counts.tb += 1;
                if flagged {
                    counts.tb_btag += 1;
                }
            }
            MatchLabel::Hb => {
                counts.hb += 1;
                if flagged {
                    counts.hb_btag += 1;
                }
            }
        }
    }
    counts
}

#[derive(Clone, Debug)]
pub struct TruthMatchStage {
    conf: MatchingConfig,
}

impl TruthMatchStage {
    pub fn new(conf: &MatchingConfig) -> Self {
        TruthMatchStage { conf: conf.clone() }
    }
}

impl Stage for TruthMatchStage {
    fn name(&self) -> &'static str {
        "truth_match"
    }

    fn counter_names(&self) -> Vec<String> {
        MatchRequirement::ALL.iter().map(|r| r.as_str().to_string()).collect()
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let (truth, sel, tagging) = match (event.truth(), event.jets.get(), event.tagging.get()) {
            (Some(t), Some(s), Some(tag)) => (t, s, tag),
            (None, _, _) => {
                event
                    .truth_matches
                    .set(Err(mecore::Error::InputInsufficient("no generator truth".into())));
                return true;
            }
            _ => {
                let err = mecore::Error::InputInsufficient("jet tagging missing".into());
                ctx.record_failure(self.name(), &err);
                event.truth_matches.set(Err(err));
                return true;
            }
        };

        let matches = match_jets(&event.input.jets, &sel.good, truth, &self.conf);
        let counts = count_matches(&sel.good, &matches, tagging);

        for (&jet, m) in sel.good.iter().zip(&matches) {
            if let Some(tm) = m {
                log::trace!("jet {} matched to {:?}[{}] dR={:.3}", jet, tm.label, tm.truth_index, tm.delta_r);
            }
        }
        for req in MatchRequirement::ALL {
            ctx.counters.add(self.name(), req.as_str(), counts.get(req) as u64);
        }

        let summary = TruthMatchSummary {
            jets: sel.good.clone(),
            matches,
            counts,
            truth_sizes: TruthSizes::of(truth),
        };
        event.truth_matches.set(Ok(summary));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::jets::TaggingSource;

    fn particle(eta: f64, phi: f64) -> GenParticle {
        GenParticle { pt: 50.0, eta, phi, mass: 0.0, pdg_id: 0 }
    }

    fn jet(eta: f64, phi: f64) -> Jet {
        Jet::new(50.0, eta, phi, 5.0, 0.5)
    }

    #[test]
    fn test_each_jet_keeps_at_most_one_match() {
        let jets = vec![jet(0.0, 0.0), jet(1.0, 1.0), jet(-1.0, 2.0), jet(2.0, -2.0)];
        let truth = GenTruth {
            // duplicated branch: only the first two count
            wz_quarks: vec![particle(0.1, 0.0), particle(2.0, -2.0), particle(0.0, 0.0), particle(2.0, -2.0)],
            b_from_top: vec![particle(0.05, 0.0), particle(1.0, 1.1)],
            b_from_higgs: vec![particle(-1.0, 2.05)],
            ..Default::default()
        };
        let good = vec![0, 1, 2, 3];
        let m = match_jets(&jets, &good, &truth, &MatchingConfig::default());
        assert_eq!(m.len(), 4);
        assert_eq!(m[0].unwrap().label, MatchLabel::Tb);
        assert_eq!(m[1].unwrap().label, MatchLabel::Tb);
        assert_eq!(m[1].unwrap().truth_index, 1);
        assert_eq!(m[2].unwrap().label, MatchLabel::Hb);
        assert_eq!(m[3].unwrap().label, MatchLabel::Wq);
        assert_eq!(m[3].unwrap().truth_index, 1);

        let tagging = JetTagging {
            source: TaggingSource::Discriminant,
            tagged: vec![0, 2],
            untagged: vec![1, 3],
            flagged: vec![0, 2],
        };
        let counts = count_matches(&good, &m, &tagging);
        assert_eq!(counts.tb, 2);
        assert_eq!(counts.tb_btag, 1);
        assert_eq!(counts.hb_btag, 1);
        assert_eq!(counts.wq, 1);
        assert_eq!(counts.wq_btag, 1);
        assert_eq!(counts.tb + counts.hb + counts.wq, m.iter().filter(|x| x.is_some()).count());
    }

    #[test]
    fn test_tie_goes_to_earlier_label() {
        let jets = vec![jet(0.0, 0.0)];
        let truth = GenTruth {
            wz_quarks: vec![particle(0.2, 0.0), particle(0.2, 0.0)],
            b_from_top: vec![particle(-0.2, 0.0)],
            ..Default::default()
        };
        let m = match_jets(&jets, &[0], &truth, &MatchingConfig::default());
        assert_eq!(m[0].unwrap().label, MatchLabel::Wq);
    }

    #[test]
    fn test_sizes_use_deduplicated_w_quarks() {
        let truth = GenTruth {
            wz_quarks: vec![particle(0.0, 0.0); 4],
            b_from_top: vec![particle(0.0, 0.0); 2],
            ..Default::default()
        };
        let sizes = TruthSizes::of(&truth);
        assert_eq!(sizes.get(MatchLabel::Wq), 2);
        assert_eq!(sizes.get(MatchLabel::Hb), 0);
    }
}
