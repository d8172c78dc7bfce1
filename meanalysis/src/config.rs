//! Analysis configuration, deserialised from JSON.
//!
//! Every section has defaults so a partial document (or `{}`) is a valid configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{ConfigRegistry, Hypothesis};
use crate::error::{Error, Result};
use crate::event::{BTagAlgo, IsoType, LeptonFlavour};
use crate::stages::category::Category;
use crate::stages::truth_match::MatchRequirement;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub leptons: LeptonConfig,
    pub jets: JetConfig,
    pub categories: CategoryConfig,
    pub matching: MatchingConfig,
    pub top_matching: TopMatchConfig,
    pub mem: MemConfig,
    pub budget: BudgetConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Only these (run, lumi, event) triples are processed when set.
    pub event_whitelist: Option<Vec<(u32, u32, u64)>>,
}

/// Kinematic and isolation thresholds of one lepton tier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeptonCuts {
    pub pt: f64,
    pub eta: f64,
    pub iso: f64,
}

impl LeptonCuts {
    pub fn new(pt: f64, eta: f64, iso: f64) -> Self {
        LeptonCuts { pt, eta, iso }
    }
}

/// Lepton quality tier. Veto tiers hold what the matching non-veto tier rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeptonTier {
    Tight,
    TightVeto,
    Loose,
    LooseVeto,
}

impl LeptonTier {
    pub const ALL: [LeptonTier; 4] = [
        LeptonTier::Tight,
        LeptonTier::TightVeto,
        LeptonTier::Loose,
        LeptonTier::LooseVeto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeptonTier::Tight => "tight",
            LeptonTier::TightVeto => "tight_veto",
            LeptonTier::Loose => "loose",
            LeptonTier::LooseVeto => "loose_veto",
        }
    }

    /// The non-veto tier this one is built against.
    pub fn base(&self) -> LeptonTier {
        match self {
            LeptonTier::Tight | LeptonTier::TightVeto => LeptonTier::Tight,
            LeptonTier::Loose | LeptonTier::LooseVeto => LeptonTier::Loose,
        }
    }

    pub fn is_veto(&self) -> bool {
        matches!(self, LeptonTier::TightVeto | LeptonTier::LooseVeto)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlavourCuts {
    pub iso_type: IsoType,
    pub tight: LeptonCuts,
    pub tight_veto: LeptonCuts,
    pub loose: LeptonCuts,
    pub loose_veto: LeptonCuts,
}

impl FlavourCuts {
    pub fn cuts(&self, tier: LeptonTier) -> &LeptonCuts {
        match tier {
            LeptonTier::Tight => &self.tight,
            LeptonTier::TightVeto => &self.tight_veto,
            LeptonTier::Loose => &self.loose,
            LeptonTier::LooseVeto => &self.loose_veto,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LeptonConfig {
    pub mu: FlavourCuts,
    pub el: FlavourCuts,
    /// Optional cap on every lepton collection after sorting.
    pub max_per_collection: Option<usize>,
}

impl LeptonConfig {
    pub fn flavour(&self, flavour: LeptonFlavour) -> &FlavourCuts {
        match flavour {
            LeptonFlavour::Muon => &self.mu,
            LeptonFlavour::Electron => &self.el,
        }
    }
}

impl Default for LeptonConfig {
    fn default() -> Self {
        LeptonConfig {
            mu: FlavourCuts {
                iso_type: IsoType::RelIso04,
                tight: LeptonCuts::new(30.0, 2.1, 0.12),
                tight_veto: LeptonCuts::new(10.0, 2.4, 0.2),
                loose: LeptonCuts::new(20.0, 2.4, 0.12),
                loose_veto: LeptonCuts::new(10.0, 2.4, 0.2),
            },
            el: FlavourCuts {
                iso_type: IsoType::RelIso03,
                tight: LeptonCuts::new(30.0, 2.5, 0.1),
                tight_veto: LeptonCuts::new(20.0, 2.5, 0.15),
                loose: LeptonCuts::new(20.0, 2.5, 0.1),
                loose_veto: LeptonCuts::new(10.0, 2.5, 0.15),
            },
            max_per_collection: None,
        }
    }
}

/// A b-tag working point: jets with discriminant above `cut` are tagged.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkingPoint {
    pub algo: BTagAlgo,
    pub cut: f64,
}

/// Which split of the jets into tagged/untagged feeds the downstream stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UntaggedSelection {
    /// Best 4b ordering of the likelihood scan
    #[serde(rename = "btagLR")]
    LikelihoodRatio,
    /// Discriminant above the selected working point
    #[serde(rename = "btagCSV")]
    Discriminant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JetConfig {
    pub pt: f64,
    pub eta: f64,
    pub max_jets: usize,
    pub min_jets: usize,
    pub btag_algo: BTagAlgo,
    pub btag_wps: BTreeMap<String, WorkingPoint>,
    pub btag_wp: String,
    pub untagged_selection: UntaggedSelection,
    /// Jets with the highest discriminant entering the likelihood scan.
    pub max_lr_jets: usize,
    /// Hard cap on the factorial enumeration.
    pub max_permutation_objects: usize,
    /// Number of tagged jets flagged as b quarks for the integration.
    pub n_btag_flagged: usize,
}

impl Default for JetConfig {
    fn default() -> Self {
        let mut btag_wps = BTreeMap::new();
        btag_wps.insert("CSVL".to_string(), WorkingPoint { algo: BTagAlgo::Csv, cut: 0.244 });
        btag_wps.insert("CSVM".to_string(), WorkingPoint { algo: BTagAlgo::Csv, cut: 0.679 });
        btag_wps.insert("CSVT".to_string(), WorkingPoint { algo: BTagAlgo::Csv, cut: 0.898 });
        JetConfig {
            pt: 30.0,
            eta: 2.5,
            max_jets: 9,
            min_jets: 4,
            btag_algo: BTagAlgo::Csv,
            btag_wps,
            btag_wp: "CSVM".to_string(),
            untagged_selection: UntaggedSelection::LikelihoodRatio,
            max_lr_jets: 6,
            max_permutation_objects: mecore::algorithm::likelihood::DEFAULT_MAX_OBJECTS,
            n_btag_flagged: 4,
        }
    }
}

/// W-mass windows, half-open `[lo, hi)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub w_window_six_jets: (f64, f64),
    pub w_window_more_jets: (f64, f64),
}

impl Default for CategoryConfig {
    fn default() -> Self {
        CategoryConfig {
            w_window_six_jets: (60.0, 100.0),
            w_window_more_jets: (72.0, 94.0),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub delta_r: f64,
    pub radiation_delta_r: f64,
    pub radiation_pt: f64,
    pub radiation_eta: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            delta_r: 0.3,
            radiation_delta_r: 0.5,
            radiation_pt: 20.0,
            radiation_eta: 2.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TopMatchConfig {
    pub enabled: bool,
    pub min_pt: f64,
    pub min_mass: f64,
    pub max_mass: f64,
    pub max_f_w: f64,
    pub top_mass: f64,
    pub delta_r: f64,
}

impl Default for TopMatchConfig {
    fn default() -> Self {
        TopMatchConfig {
            enabled: true,
            min_pt: 200.0,
            min_mass: 120.0,
            max_mass: 220.0,
            max_f_w: 0.175,
            top_mass: 172.04,
            delta_r: 0.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MemConfig {
    pub calc_me: bool,
    /// Named engine configurations, evaluated in this order.
    pub methods_to_run: Vec<String>,
    pub me_categories: Vec<Category>,
    /// Minimum 4b/2b likelihood ratio for the high b-tag category, per category.
    pub btag_lr_cut: BTreeMap<Category, f64>,
    /// Minimum truth-match counts per category.
    pub require_matched: BTreeMap<Category, BTreeMap<MatchRequirement, usize>>,
    pub hypotheses: Vec<Hypothesis>,
    /// p_tth / (p_tth + weight * p_ttbb) below `bad_prob_ratio` is reported.
    pub bad_prob_weight: f64,
    pub bad_prob_ratio: f64,
}

impl Default for MemConfig {
    fn default() -> Self {
        let btag_lr_cut = [
            (Category::NoCat, 0.0),
            (Category::Cat1, 0.6),
            (Category::Cat2, 0.6),
            (Category::Cat3, 0.6),
            (Category::Cat6, 0.6),
        ]
        .into_iter()
        .collect();
        MemConfig {
            calc_me: true,
            methods_to_run: vec!["default".to_string()],
            me_categories: vec![Category::Cat1, Category::Cat2, Category::Cat3, Category::Cat6],
            btag_lr_cut,
            require_matched: BTreeMap::new(),
            hypotheses: vec![Hypothesis::Tth, Hypothesis::Ttbb],
            bad_prob_weight: 0.02,
            bad_prob_ratio: 1.0e-4,
        }
    }
}

impl MemConfig {
    /// LR threshold for `cat`; categories without an entry never reach `H`.
    pub fn lr_cut(&self, cat: Category) -> f64 {
        self.btag_lr_cut.get(&cat).copied().unwrap_or(f64::INFINITY)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Wall-clock limit per event, in milliseconds.
    pub event_budget_ms: Option<u64>,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Config::from_json_str(&raw)
    }

    /// Check cross-references between sections and against the named-configuration registry.
    pub fn validate(&self, registry: &ConfigRegistry) -> Result<()> {
        if !self.jets.btag_wps.contains_key(&self.jets.btag_wp) {
            return Err(mecore::Error::ConfigurationMissing(format!(
                "selected b-tag working point '{}' is not defined",
                self.jets.btag_wp
            ))
            .into());
        }
        registry.resolve(&self.mem.methods_to_run)?;

        if self.jets.max_lr_jets > self.jets.max_permutation_objects {
            return Err(Error::Config(format!(
                "max_lr_jets ({}) exceeds max_permutation_objects ({})",
                self.jets.max_lr_jets, self.jets.max_permutation_objects
            )));
        }
        if self.jets.min_jets == 0 || self.jets.min_jets > self.jets.max_jets {
            return Err(Error::Config(format!(
                "min_jets must be in 1..={}, got {}",
                self.jets.max_jets, self.jets.min_jets
            )));
        }
        for (name, (lo, hi)) in [
            ("w_window_six_jets", self.categories.w_window_six_jets),
            ("w_window_more_jets", self.categories.w_window_more_jets),
        ] {
            if lo.is_nan() || hi.is_nan() {
                return Err(Error::Config(format!("{} has a NaN bound: [{}, {})", name, lo, hi)));
            }
            if lo >= hi {
                return Err(Error::Config(format!("{} is empty: [{}, {})", name, lo, hi)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let conf = Config::from_json_str("{}").unwrap();
        assert_eq!(conf.jets.max_jets, 9);
        assert_eq!(conf.jets.min_jets, 4);
        assert_eq!(conf.jets.max_lr_jets, 6);
        assert_eq!(conf.categories.w_window_six_jets, (60.0, 100.0));
        assert_eq!(conf.mem.methods_to_run, vec!["default".to_string()]);
        assert!(conf.validate(&ConfigRegistry::standard()).is_ok());
    }

    #[test]
    fn test_partial_sections_and_renames() {
        let json = r#"{
            "jets": {"untagged_selection": "btagCSV", "btag_wp": "CSVT"},
            "mem": {"me_categories": ["cat1", "cat6"],
                    "btag_lr_cut": {"cat1": 0.9},
                    "require_matched": {"cat1": {"wq_btag": 2, "tb": 2}}},
            "general": {"event_whitelist": [[1, 2, 3]]}
        }"#;
        let conf = Config::from_json_str(json).unwrap();
        assert_eq!(conf.jets.untagged_selection, UntaggedSelection::Discriminant);
        assert_eq!(conf.jets.pt, 30.0);
        assert_eq!(conf.mem.me_categories, vec![Category::Cat1, Category::Cat6]);
        assert_eq!(conf.mem.lr_cut(Category::Cat1), 0.9);
        assert_eq!(conf.mem.lr_cut(Category::Cat2), f64::INFINITY);
        assert_eq!(conf.mem.require_matched[&Category::Cat1][&MatchRequirement::WqBtag], 2);
        assert_eq!(conf.general.event_whitelist, Some(vec![(1, 2, 3)]));
    }

    #[test]
    fn test_validate_catches_dangling_names() {
        let mut conf = Config::default();
        conf.jets.btag_wp = "CSVX".to_string();
        match conf.validate(&ConfigRegistry::standard()) {
            Err(Error::Core(mecore::Error::ConfigurationMissing(msg))) => assert!(msg.contains("CSVX")),
            other => panic!("expected ConfigurationMissing, got {:?}", other),
        }

        let mut conf = Config::default();
        conf.mem.methods_to_run.push("NoSuchMethod".to_string());
        assert!(matches!(
            conf.validate(&ConfigRegistry::standard()),
            Err(Error::Core(mecore::Error::ConfigurationMissing(_)))
        ));

        let mut conf = Config::default();
        conf.jets.max_lr_jets = 12;
        assert!(matches!(conf.validate(&ConfigRegistry::standard()), Err(Error::Config(_))));
    }

    #[test]
    fn test_w_window_bounds() {
        let mut conf = Config::default();
        conf.categories.w_window_more_jets = (100.0, 100.0);
        match conf.validate(&ConfigRegistry::standard()) {
            Err(Error::Config(msg)) => assert!(msg.contains("w_window_more_jets is empty")),
            other => panic!("expected empty window, got {:?}", other),
        }

        conf.categories.w_window_more_jets = (f64::NAN, 100.0);
        match conf.validate(&ConfigRegistry::standard()) {
            Err(Error::Config(msg)) => assert!(msg.contains("NaN")),
            other => panic!("expected NaN bound, got {:?}", other),
        }
    }
}
