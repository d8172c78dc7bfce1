//! Event schema: the read-only input snapshot plus one `Derived` slot per stage output.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use mecore::kinematics::object::{Kinematic, PtEtaPhiM};

use crate::stages::btag_lr::BTagLikelihoods;
use crate::stages::category::Categorization;
use crate::stages::gen_level::GenSummary;
use crate::stages::jets::{JetSelection, JetTagging};
use crate::stages::leptons::LeptonSelection;
use crate::stages::mem::MemResults;
use crate::stages::top_match::TopMatchResult;
use crate::stages::truth_match::TruthMatchSummary;
use crate::stages::wtag::WTagResult;

/// b-tag discriminant a jet is scored with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BTagAlgo {
    #[serde(rename = "btagCSV")]
    Csv,
    #[serde(rename = "btagCMVA")]
    Cmva,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jet {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
    #[serde(default)]
    pub btag_csv: f64,
    #[serde(default)]
    pub btag_cmva: f64,
    /// Hadron flavour from simulation, 0 on data.
    #[serde(default)]
    pub mc_flavour: i32,
}

impl Jet {
    pub fn new(pt: f64, eta: f64, phi: f64, mass: f64, btag_csv: f64) -> Self {
        Jet { pt, eta, phi, mass, btag_csv, btag_cmva: 0.0, mc_flavour: 0 }
    }

    #[inline]
    pub fn discriminant(&self, algo: BTagAlgo) -> f64 {
        match algo {
            BTagAlgo::Csv => self.btag_csv,
            BTagAlgo::Cmva => self.btag_cmva,
        }
    }
}

impl Kinematic for Jet {
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
    fn phi(&self) -> f64 {
        self.phi
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeptonFlavour {
    #[serde(rename = "mu")]
    Muon,
    #[serde(rename = "el")]
    Electron,
}

impl LeptonFlavour {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeptonFlavour::Muon => "mu",
            LeptonFlavour::Electron => "el",
        }
    }
}

/// Relative isolation variable used for a lepton flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsoType {
    #[serde(rename = "relIso03")]
    RelIso03,
    #[serde(rename = "relIso04")]
    RelIso04,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lepton {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    #[serde(default)]
    pub mass: f64,
    pub pdg_id: i32,
    pub charge: i32,
    #[serde(default)]
    pub rel_iso03: f64,
    #[serde(default)]
    pub rel_iso04: f64,
    #[serde(default)]
    pub tight_id: bool,
    #[serde(default)]
    pub loose_id: bool,
}

impl Lepton {
    /// Electron for |pdg id| 11, muon for 13, nothing otherwise.
    pub fn flavour(&self) -> Option<LeptonFlavour> {
        match self.pdg_id.abs() {
            11 => Some(LeptonFlavour::Electron),
            13 => Some(LeptonFlavour::Muon),
            _ => None,
        }
    }

    #[inline]
    pub fn isolation(&self, iso: IsoType) -> f64 {
        match iso {
            IsoType::RelIso03 => self.rel_iso03,
            IsoType::RelIso04 => self.rel_iso04,
        }
    }
}

impl Kinematic for Lepton {
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
    fn phi(&self) -> f64 {
        self.phi
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenParticle {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    #[serde(default)]
    pub mass: f64,
    #[serde(default)]
    pub pdg_id: i32,
}

impl Kinematic for GenParticle {
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
    fn phi(&self) -> f64 {
        self.phi
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

/// Generator-level decay products. Absent on collision data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenTruth {
    pub wz_quarks: Vec<GenParticle>,
    pub b_from_top: Vec<GenParticle>,
    pub b_from_higgs: Vec<GenParticle>,
    pub lep_from_top: Vec<GenParticle>,
    pub nu_from_top: Vec<GenParticle>,
}

/// Boosted top-tagger candidate with its three subjets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopCandidate {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
    /// W-mass compatibility of the subjet pairs.
    pub f_w: f64,
    pub sj_w1: PtEtaPhiM,
    pub sj_w2: PtEtaPhiM,
    pub sj_non_w: PtEtaPhiM,
}

impl TopCandidate {
    /// Subjets in the order (W1, W2, non-W).
    pub fn subjets(&self) -> [PtEtaPhiM; 3] {
        [self.sj_w1, self.sj_w2, self.sj_non_w]
    }
}

impl Kinematic for TopCandidate {
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
    fn phi(&self) -> f64 {
        self.phi
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

/// Immutable per-event snapshot handed to the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    pub run: u32,
    pub lumi: u32,
    pub evt: u64,
    #[serde(default)]
    pub jets: Vec<Jet>,
    #[serde(default)]
    pub leptons: Vec<Lepton>,
    #[serde(default)]
    pub met_pt: f64,
    #[serde(default)]
    pub met_phi: f64,
    #[serde(default)]
    pub truth: Option<GenTruth>,
    #[serde(default)]
    pub top_candidates: Vec<TopCandidate>,
}

/// A derived field: not yet computed, known to be uncomputable, or computed.
///
/// Each slot is written once by the stage that owns it.
#[derive(Clone, Debug, PartialEq)]
pub enum Derived<T> {
    Pending,
    NotComputable(mecore::Error),
    Ready(T),
}

impl<T> Default for Derived<T> {
    fn default() -> Self {
        Derived::Pending
    }
}

impl<T> Derived<T> {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Derived::Pending)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Derived::Ready(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Derived::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&mecore::Error> {
        match self {
            Derived::NotComputable(e) => Some(e),
            _ => None,
        }
    }

    /// Store a stage result.
    pub fn set(&mut self, value: mecore::Result<T>) {
        debug_assert!(self.is_pending(), "derived field written twice");
        *self = match value {
            Ok(v) => Derived::Ready(v),
            Err(e) => Derived::NotComputable(e),
        };
    }
}

impl<T: Serialize> Serialize for Derived<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Derived::Pending => serializer.serialize_none(),
            Derived::NotComputable(e) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("not_computable", e.counter_name())?;
                map.serialize_entry("reason", &e.to_string())?;
                map.end()
            }
            Derived::Ready(v) => v.serialize(serializer),
        }
    }
}

/// One event moving through the pipeline.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Event {
    pub input: EventInput,
    pub leptons: Derived<LeptonSelection>,
    pub jets: Derived<JetSelection>,
    pub btag_lr: Derived<BTagLikelihoods>,
    pub tagging: Derived<JetTagging>,
    pub wtag: Derived<WTagResult>,
    pub category: Derived<Categorization>,
    pub gen: Derived<GenSummary>,
    pub truth_matches: Derived<TruthMatchSummary>,
    pub top_match: Derived<TopMatchResult>,
    pub mem: Derived<MemResults>,
}

impl Event {
    pub fn new(input: EventInput) -> Self {
        Event { input, ..Default::default() }
    }

    pub fn id(&self) -> (u32, u32, u64) {
        (self.input.run, self.input.lumi, self.input.evt)
    }

    /// Generator truth; only simulated events carry it.
    pub fn truth(&self) -> Option<&GenTruth> {
        self.input.truth.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_lifecycle() {
        let mut d: Derived<usize> = Derived::default();
        assert!(d.is_pending());
        assert_eq!(d.get(), None);
        d.set(Ok(3));
        assert!(d.is_ready());
        assert_eq!(d.get(), Some(&3));

        let mut e: Derived<usize> = Derived::Pending;
        e.set(Err(mecore::Error::InputInsufficient("no jets".into())));
        assert!(e.get().is_none());
        assert_eq!(e.error().map(|e| e.counter_name()), Some("input_insufficient"));
    }

    #[test]
    fn test_derived_serialization() {
        let ready: Derived<f64> = Derived::Ready(1.5);
        assert_eq!(serde_json::to_string(&ready).unwrap(), "1.5");
        let pending: Derived<f64> = Derived::Pending;
        assert_eq!(serde_json::to_string(&pending).unwrap(), "null");
        let failed: Derived<f64> = Derived::NotComputable(mecore::Error::BudgetExceeded("mem".into()));
        let v: serde_json::Value = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["not_computable"], "budget_exceeded");
    }

    #[test]
    fn test_input_deserializes_with_defaults() {
        let json = r#"{"run": 1, "lumi": 2, "evt": 3,
            "jets": [{"pt": 40.0, "eta": 0.1, "phi": 0.2, "mass": 5.0, "btag_csv": 0.9}],
            "leptons": [{"pt": 35.0, "eta": 0.3, "phi": -1.0, "pdg_id": -13, "charge": 1, "tight_id": true}]}"#;
        let input: EventInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.jets[0].mc_flavour, 0);
        assert_eq!(input.leptons[0].flavour(), Some(LeptonFlavour::Muon));
        assert!(input.truth.is_none());
        assert!(input.top_candidates.is_empty());
        assert!(Event::new(input).truth().is_none());
    }
}
