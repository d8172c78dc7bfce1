//! Lepton selection: tiered collections per flavour and the single/di-lepton decision.

use serde::Serialize;

use mecore::kinematics::object::indices_by_pt_desc;

use crate::config::{LeptonConfig, LeptonCuts, LeptonTier};
use crate::event::{Event, IsoType, Lepton, LeptonFlavour};
use crate::stages::stage::{Stage, StageContext};

/// Indices into the input leptons of one flavour, per tier, pt-descending.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LeptonCollections {
    pub tight: Vec<usize>,
    pub tight_veto: Vec<usize>,
    pub loose: Vec<usize>,
    pub loose_veto: Vec<usize>,
}

impl LeptonCollections {
    pub fn tier(&self, tier: LeptonTier) -> &[usize] {
        match tier {
            LeptonTier::Tight => &self.tight,
            LeptonTier::TightVeto => &self.tight_veto,
            LeptonTier::Loose => &self.loose,
            LeptonTier::LooseVeto => &self.loose_veto,
        }
    }

    fn tier_mut(&mut self, tier: LeptonTier) -> &mut Vec<usize> {
        match tier {
            LeptonTier::Tight => &mut self.tight,
            LeptonTier::TightVeto => &mut self.tight_veto,
            LeptonTier::Loose => &mut self.loose,
            LeptonTier::LooseVeto => &mut self.loose_veto,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LeptonSelection {
    pub mu: LeptonCollections,
    pub el: LeptonCollections,
    pub is_sl: bool,
    pub is_dl: bool,
    /// Tight leptons for single-lepton events, loose ones for di-lepton events; muons first.
    pub good: Vec<usize>,
}

impl LeptonSelection {
    pub fn flavour(&self, flavour: LeptonFlavour) -> &LeptonCollections {
        match flavour {
            LeptonFlavour::Muon => &self.mu,
            LeptonFlavour::Electron => &self.el,
        }
    }

    /// Number of leptons of both flavours in `tier`.
    pub fn count(&self, tier: LeptonTier) -> usize {
        self.mu.tier(tier).len() + self.el.tier(tier).len()
    }
}

/// Whether a lepton passes the kinematic, isolation and ID requirements of `tier`.
#[inline]
pub fn passes_cuts(lep: &Lepton, cuts: &LeptonCuts, iso: IsoType, tier: LeptonTier) -> bool {
    let id = match tier.base() {
        LeptonTier::Tight => lep.tight_id,
        _ => lep.loose_id,
    };
    lep.pt > cuts.pt && lep.eta.abs() < cuts.eta && lep.isolation(iso).abs() < cuts.iso && id
}

/// Select `candidates` passing `cuts`, excluding `exclude`, sorted by descending pt.
pub fn filter_leptons(
    leptons: &[Lepton],
    candidates: &[usize],
    cuts: &LeptonCuts,
    iso: IsoType,
    tier: LeptonTier,
    exclude: &[usize],
    max_count: Option<usize>,
) -> Vec<usize> {
    let kept: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|i| !exclude.contains(i))
        .filter(|&i| passes_cuts(&leptons[i], cuts, iso, tier))
        .collect();

    let subset: Vec<&Lepton> = kept.iter().map(|&i| &leptons[i]).collect();
    let mut sorted: Vec<usize> = indices_by_pt_desc(&subset).into_iter().map(|k| kept[k]).collect();
    if let Some(max) = max_count {
        sorted.truncate(max);
    }
    sorted
}

/// Build all tier collections and decide single/di-lepton.
pub fn select_leptons(leptons: &[Lepton], conf: &LeptonConfig) -> LeptonSelection {
    let mut sel = LeptonSelection::default();

    for flavour in [LeptonFlavour::Muon, LeptonFlavour::Electron] {
        let fconf = conf.flavour(flavour);
        let candidates: Vec<usize> = (0..leptons.len())
            .filter(|&i| leptons[i].flavour() == Some(flavour))
            .collect();

        let mut colls = LeptonCollections::default();
        for tier in LeptonTier::ALL {
            let exclude = if tier.is_veto() {
                colls.tier(tier.base()).to_vec()
            } else {
                Vec::new()
            };
            *colls.tier_mut(tier) = filter_leptons(
                leptons,
                &candidates,
                fconf.cuts(tier),
                fconf.iso_type,
                tier,
                &exclude,
                conf.max_per_collection,
            );
        }

        match flavour {
            LeptonFlavour::Muon => sel.mu = colls,
            LeptonFlavour::Electron => sel.el = colls,
        }
    }

    sel.is_sl = sel.count(LeptonTier::Tight) == 1 && sel.count(LeptonTier::TightVeto) == 0;
    sel.is_dl = sel.count(LeptonTier::Loose) == 2 && sel.count(LeptonTier::LooseVeto) == 0;

    if sel.is_sl && !sel.is_dl {
        sel.good = sel.mu.tight.iter().chain(sel.el.tight.iter()).copied().collect();
    } else if sel.is_dl && !sel.is_sl {
        sel.good = sel.mu.loose.iter().chain(sel.el.loose.iter()).copied().collect();
    }
    sel
}

#[derive(Clone, Debug)]
pub struct LeptonSelector {
    conf: LeptonConfig,
}

impl LeptonSelector {
    pub fn new(conf: &LeptonConfig) -> Self {
        LeptonSelector { conf: conf.clone() }
    }
}

impl Stage for LeptonSelector {
    fn name(&self) -> &'static str {
        "leptons"
    }

    fn counter_names(&self) -> Vec<String> {
        let mut names = vec!["any".to_string(), "sl".to_string(), "dl".to_string(), "slanddl".to_string()];
        for flavour in [LeptonFlavour::Muon, LeptonFlavour::Electron] {
            for tier in LeptonTier::ALL {
                names.push(format!("{}_{}", flavour.as_str(), tier.as_str()));
            }
        }
        names
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let sel = select_leptons(&event.input.leptons, &self.conf);

        ctx.counters.add(self.name(), "any", event.input.leptons.len() as u64);
        for flavour in [LeptonFlavour::Muon, LeptonFlavour::Electron] {
            for tier in LeptonTier::ALL {
                let key = format!("{}_{}", flavour.as_str(), tier.as_str());
                ctx.counters.add(self.name(), &key, sel.flavour(flavour).tier(tier).len() as u64);
            }
        }
        if sel.is_sl {
            ctx.counters.inc(self.name(), "sl");
        }
        if sel.is_dl {
            ctx.counters.inc(self.name(), "dl");
        }

        let passes = match (sel.is_sl, sel.is_dl) {
            (true, true) => {
                log::debug!("event {:?} passes both single- and di-lepton selection", event.id());
                ctx.counters.inc(self.name(), "slanddl");
                false
            }
            (sl, dl) => sl || dl,
        };

        event.leptons.set(Ok(sel));
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn muon(pt: f64, iso: f64, tight: bool) -> Lepton {
        Lepton {
            pt,
            eta: 0.5,
            phi: 0.0,
            mass: 0.105,
            pdg_id: 13,
            charge: -1,
            rel_iso03: iso,
            rel_iso04: iso,
            tight_id: tight,
            loose_id: true,
        }
    }

    fn electron(pt: f64) -> Lepton {
        Lepton {
            pt,
            eta: -1.0,
            phi: 1.0,
            mass: 0.0,
            pdg_id: -11,
            charge: 1,
            rel_iso03: 0.01,
            rel_iso04: 0.01,
            tight_id: true,
            loose_id: true,
        }
    }

    #[test]
    fn test_single_lepton() {
        let leps = vec![muon(45.0, 0.05, true)];
        let sel = select_leptons(&leps, &LeptonConfig::default());
        assert!(sel.is_sl);
        assert!(!sel.is_dl);
        assert_eq!(sel.good, vec![0]);
    }

    #[test]
    fn test_di_lepton_sorted_muons_first() {
        // two loose leptons that fail the tight pt cut
        let leps = vec![electron(25.0), muon(22.0, 0.05, true)];
        let sel = select_leptons(&leps, &LeptonConfig::default());
        assert!(sel.is_dl);
        assert!(!sel.is_sl);
        assert_eq!(sel.good, vec![1, 0]);
    }

    #[test]
    fn test_veto_excludes_base_tier() {
        let leps = vec![muon(45.0, 0.05, true), muon(15.0, 0.1, true)];
        let sel = select_leptons(&leps, &LeptonConfig::default());
        assert_eq!(sel.mu.tight, vec![0]);
        assert_eq!(sel.mu.tight_veto, vec![1]);
        assert!(!sel.is_sl);
    }

    #[test]
    fn test_collections_sorted_and_truncated() {
        let leps = vec![muon(25.0, 0.05, true), muon(40.0, 0.05, true), muon(32.0, 0.05, true)];
        let mut conf = LeptonConfig::default();
        assert_eq!(select_leptons(&leps, &conf).mu.loose, vec![1, 2, 0]);
        conf.max_per_collection = Some(2);
        assert_eq!(select_leptons(&leps, &conf).mu.loose, vec![1, 2]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let leps = vec![
            muon(25.0, 0.05, true),
            muon(40.0, 0.3, true),
            muon(32.0, 0.05, false),
            muon(50.0, 0.01, true),
        ];
        let conf = LeptonConfig::default();
        let all: Vec<usize> = (0..leps.len()).collect();
        for tier in [LeptonTier::Tight, LeptonTier::Loose] {
            let cuts = conf.mu.cuts(tier);
            let once = filter_leptons(&leps, &all, cuts, conf.mu.iso_type, tier, &[], None);
            let twice = filter_leptons(&leps, &once, cuts, conf.mu.iso_type, tier, &[], None);
            assert_eq!(once, twice);
        }
    }
}
