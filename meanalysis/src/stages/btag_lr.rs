//! b-tag likelihood ratio: 4b versus 2b hypotheses from the discriminant densities,
//! and the resulting tagged/untagged jet split.

use std::sync::Arc;

use serde::Serialize;

use mecore::algorithm::likelihood::{likelihood_ratio, PermutationLikelihoodScorer, RoleProbabilities, RoleSplit};
use mecore::density::registry::{DensityRegistry, PdfKind};
use mecore::kinematics::object::Kinematic;

use crate::config::{JetConfig, UntaggedSelection};
use crate::event::{Event, Jet};
use crate::stages::jets::{JetSelection, JetTagging, TaggingSource};
use crate::stages::stage::{Stage, StageContext};

/// Likelihoods of one density-table family.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LikelihoodPair {
    pub lr_4b: f64,
    pub lr_2b: f64,
    /// lr_4b / (lr_4b + lr_2b)
    pub ratio: f64,
    /// Input jet indices in the best 4b ordering; the first four are the b candidates.
    pub best_4b: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BTagLikelihoods {
    /// Jets entering the scan: highest discriminant first.
    pub lr_jets: Vec<usize>,
    pub legacy: LikelihoodPair,
    pub eta_binned: LikelihoodPair,
    pub pt_eta: LikelihoodPair,
}

impl BTagLikelihoods {
    /// Ratio used for the b-tag category.
    pub fn ratio(&self) -> f64 {
        self.eta_binned.ratio
    }
}

/// Good jets ordered by descending discriminant (stable), capped at `max`.
pub fn jets_for_likelihood(jets: &[Jet], sel: &JetSelection, conf: &JetConfig) -> Vec<usize> {
    let mut idx = sel.good.clone();
    idx.sort_by(|&a, &b| {
        jets[b]
            .discriminant(conf.btag_algo)
            .partial_cmp(&jets[a].discriminant(conf.btag_algo))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    idx.truncate(conf.max_lr_jets);
    idx
}

pub struct BTagLikelihoodStage {
    conf: JetConfig,
    densities: Arc<DensityRegistry>,
    scorer: PermutationLikelihoodScorer,
}

impl BTagLikelihoodStage {
    pub fn new(conf: &JetConfig, densities: Arc<DensityRegistry>) -> Self {
        BTagLikelihoodStage {
            conf: conf.clone(),
            densities,
            scorer: PermutationLikelihoodScorer::new(conf.max_permutation_objects),
        }
    }

    fn score_kind(
        &self,
        jets: &[Jet],
        lr_jets: &[usize],
        kind: PdfKind,
        deadline: Option<std::time::Instant>,
    ) -> mecore::Result<LikelihoodPair> {
        let probs = lr_jets
            .iter()
            .map(|&i| {
                let j = &jets[i];
                self.densities
                    .role_probabilities(kind, j.pt(), j.eta(), j.discriminant(self.conf.btag_algo))
            })
            .collect::<mecore::Result<Vec<RoleProbabilities>>>()?;

        let four = self.scorer.score_until(&probs, RoleSplit::new(4, 0), deadline)?;
        let two = self.scorer.score_until(&probs, RoleSplit::new(2, 0), deadline)?;

        Ok(LikelihoodPair {
            lr_4b: four.mean,
            lr_2b: two.mean,
            ratio: likelihood_ratio(four.mean, two.mean),
            best_4b: four.best_assignment.iter().map(|&k| lr_jets[k]).collect(),
        })
    }

    /// Run the scan for all three table families.
    pub fn likelihoods(
        &self,
        jets: &[Jet],
        sel: &JetSelection,
        deadline: Option<std::time::Instant>,
    ) -> mecore::Result<BTagLikelihoods> {
        let lr_jets = jets_for_likelihood(jets, sel, &self.conf);
        Ok(BTagLikelihoods {
            legacy: self.score_kind(jets, &lr_jets, PdfKind::Legacy, deadline)?,
            eta_binned: self.score_kind(jets, &lr_jets, PdfKind::EtaBinned, deadline)?,
            pt_eta: self.score_kind(jets, &lr_jets, PdfKind::PtEta, deadline)?,
            lr_jets,
        })
    }

    /// Tagged/untagged split plus the jets flagged as b quarks.
    pub fn tagging(&self, jets: &[Jet], sel: &JetSelection, lr: Option<&BTagLikelihoods>) -> JetTagging {
        let (source, tagged, untagged) = match (self.conf.untagged_selection, lr) {
            (UntaggedSelection::LikelihoodRatio, Some(lr)) => {
                let best = &lr.eta_binned.best_4b;
                let n = best.len().min(4);
                (TaggingSource::LikelihoodRatio, best[..n].to_vec(), best[n..].to_vec())
            }
            _ => (
                TaggingSource::Discriminant,
                sel.btagged_disc.clone(),
                sel.buntagged_disc.clone(),
            ),
        };

        let mut flagged = tagged.clone();
        flagged.sort_by(|&a, &b| {
            jets[b]
                .discriminant(self.conf.btag_algo)
                .partial_cmp(&jets[a].discriminant(self.conf.btag_algo))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        flagged.truncate(self.conf.n_btag_flagged);

        JetTagging { source, tagged, untagged, flagged }
    }
}

impl Stage for BTagLikelihoodStage {
    fn name(&self) -> &'static str {
        "btag_lr"
    }

    fn counter_names(&self) -> Vec<String> {
        vec!["lr_fallback".to_string()]
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let sel = match event.jets.get() {
            Some(sel) => sel.clone(),
            None => {
                let err = mecore::Error::InputInsufficient("jet selection missing".into());
                ctx.record_failure(self.name(), &err);
                event.btag_lr.set(Err(err));
                return false;
            }
        };

        let result = self.likelihoods(&event.input.jets, &sel, ctx.deadline);
        if let Err(e) = &result {
            ctx.record_failure(self.name(), e);
            if !e.is_recoverable() {
                log::warn!("event {:?}: b-tag likelihood aborted: {}", event.id(), e);
                event.btag_lr.set(result);
                return false;
            }
            if self.conf.untagged_selection == UntaggedSelection::LikelihoodRatio {
                log::debug!("event {:?}: likelihood not computable ({}), using discriminant split", event.id(), e);
                ctx.counters.inc(self.name(), "lr_fallback");
            }
        }

        let tagging = self.tagging(&event.input.jets, &sel, result.as_ref().ok());
        event.btag_lr.set(result);
        event.tagging.set(Ok(tagging));
        true
    }
}
