//! Contract with the external probability-integration engine and the registry of
//! named engine configurations.

use std::fmt;

use serde::{Deserialize, Serialize};

use mecore::kinematics::lorentz::LorentzVector;

/// Terms of the integrand, combined into a bit mask.
pub mod integrand {
    pub const CONSTANT: u32 = 1 << 0;
    pub const SCATT_AMPL: u32 = 1 << 1;
    pub const DECAY_AMPL: u32 = 1 << 2;
    pub const JACOBIAN: u32 = 1 << 3;
    pub const PDF: u32 = 1 << 4;
    pub const TRANSFER: u32 = 1 << 5;

    pub const ALL: u32 = CONSTANT | SCATT_AMPL | DECAY_AMPL | JACOBIAN | PDF | TRANSFER;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    Jet,
    Lepton,
    Met,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observable {
    BTag,
    Charge,
}

/// One reconstructed object handed to the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct MemObject {
    pub p4: LorentzVector,
    pub kind: ObjectType,
    pub observables: Vec<(Observable, f64)>,
}

impl MemObject {
    pub fn new(kind: ObjectType, pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        MemObject {
            p4: LorentzVector::from_pt_eta_phi_m(pt, eta, phi, mass),
            kind,
            observables: Vec::new(),
        }
    }

    pub fn with_observable(mut self, obs: Observable, value: f64) -> Self {
        self.observables.push((obs, value));
        self
    }

    pub fn observable(&self, obs: Observable) -> Option<f64> {
        self.observables.iter().find(|(o, _)| *o == obs).map(|(_, v)| *v)
    }
}

/// Decay channel of the top pair, from the number of selected leptons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalState {
    /// Two leptons
    LL,
    /// One lepton
    LH,
    /// Fully hadronic
    HH,
}

impl FinalState {
    pub fn from_lepton_count(n: usize) -> Self {
        match n {
            2 => FinalState::LL,
            1 => FinalState::LH,
            _ => FinalState::HH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hypothesis {
    #[serde(rename = "tth")]
    Tth,
    #[serde(rename = "ttbb")]
    Ttbb,
}

impl fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hypothesis::Tth => write!(f, "tth"),
            Hypothesis::Ttbb => write!(f, "ttbb"),
        }
    }
}

/// Phase-space variable integrated over instead of measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsVar {
    /// cos(theta) of the unreconstructed W-decay antiquark
    CosQbar1,
    /// phi of the unreconstructed W-decay antiquark
    PhiQbar1,
}

/// Result of one engine run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub p: f64,
    pub p_err: f64,
    pub chi2: f64,
    pub time_ms: f64,
    pub num_perm: usize,
    pub efficiency: f64,
}

/// Immutable bundle of engine settings, identified by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedConfiguration {
    pub name: String,
    /// Bit mask over `integrand::*`.
    pub integrand: u32,
    /// Multiplier on the number of integration points.
    pub n_points_factor: f64,
    /// Confidence level of the light-quark energy integration range.
    pub j_range_cl: f64,
    /// Confidence level of the b-quark energy integration range.
    pub b_range_cl: f64,
    /// Confidence level of the neutrino integration range.
    pub m_range_cl: f64,
    /// Assign jets to quarks starting from the highest pt.
    pub highpt_first: bool,
}

impl NamedConfiguration {
    pub fn new(name: &str) -> Self {
        NamedConfiguration {
            name: name.to_string(),
            integrand: integrand::ALL,
            n_points_factor: 1.0,
            j_range_cl: 0.95,
            b_range_cl: 0.95,
            m_range_cl: 0.95,
            highpt_first: true,
        }
    }

    pub fn with_points(mut self, factor: f64) -> Self {
        self.n_points_factor = factor;
        self
    }

    pub fn without_term(mut self, term: u32) -> Self {
        self.integrand &= !term;
        self
    }

    pub fn with_quark_range(mut self, cl: f64) -> Self {
        self.j_range_cl = cl;
        self.b_range_cl = cl;
        self
    }

    pub fn has_term(&self, term: u32) -> bool {
        self.integrand & term == term
    }
}

/// Fixed set of named configurations, built once and passed to the stages that need it.
#[derive(Clone, Debug)]
pub struct ConfigRegistry {
    configs: Vec<NamedConfiguration>,
}

impl ConfigRegistry {
    pub fn new(configs: Vec<NamedConfiguration>) -> Self {
        ConfigRegistry { configs }
    }

    /// The standard variations around the default engine settings.
    pub fn standard() -> Self {
        let mut nu_phi = NamedConfiguration::new("NuPhiRestriction");
        nu_phi.m_range_cl = 99.0;
        let mut pt_order = NamedConfiguration::new("JetsPtOrder");
        pt_order.highpt_first = false;
        let mut pt_order_range = NamedConfiguration::new("JetsPtOrderIntegrationRange").with_quark_range(0.99);
        pt_order_range.highpt_first = false;

        ConfigRegistry::new(vec![
            NamedConfiguration::new("default"),
            NamedConfiguration::new("NumPointsDouble").with_points(2.0),
            NamedConfiguration::new("NumPointsHalf").with_points(0.5),
            NamedConfiguration::new("NoJacobian").without_term(integrand::JACOBIAN),
            NamedConfiguration::new("NoDecayAmpl").without_term(integrand::DECAY_AMPL),
            NamedConfiguration::new("NoPDF").without_term(integrand::PDF),
            NamedConfiguration::new("NoScattAmpl").without_term(integrand::SCATT_AMPL),
            NamedConfiguration::new("QuarkEnergy98").with_quark_range(0.98),
            NamedConfiguration::new("QuarkEnergy10").with_quark_range(0.10),
            nu_phi,
            pt_order,
            pt_order_range,
        ])
    }

    pub fn get(&self, name: &str) -> Option<&NamedConfiguration> {
        self.configs.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Look up every name, in order. An unknown name is fatal.
    pub fn resolve(&self, names: &[String]) -> mecore::Result<Vec<NamedConfiguration>> {
        names
            .iter()
            .map(|n| {
                self.get(n)
                    .cloned()
                    .ok_or_else(|| mecore::Error::ConfigurationMissing(format!("engine configuration '{}'", n)))
            })
            .collect()
    }
}

/// Per-worker engine handle.
///
/// The caller drives it as: `next_event`, `set_config`, `push_object` for every object,
/// then `run`. State pushed before `next_event` is discarded.
pub trait IntegrationEngine {
    fn next_event(&mut self);
    fn set_config(&mut self, config: &NamedConfiguration);
    fn push_object(&mut self, object: MemObject);
    fn run(&mut self, final_state: FinalState, hypothesis: Hypothesis, vars: &[PsVar]) -> EngineOutput;
}

/// Engine stand-in returning default outputs; used when no integrator is linked.
#[derive(Clone, Debug, Default)]
pub struct NullEngine {
    n_objects: usize,
}

impl IntegrationEngine for NullEngine {
    fn next_event(&mut self) {
        self.n_objects = 0;
    }

    fn set_config(&mut self, _config: &NamedConfiguration) {}

    fn push_object(&mut self, _object: MemObject) {
        self.n_objects += 1;
    }

    fn run(&mut self, final_state: FinalState, hypothesis: Hypothesis, _vars: &[PsVar]) -> EngineOutput {
        log::debug!(
            "null engine run: {:?} {} with {} objects",
            final_state,
            hypothesis,
            self.n_objects
        );
        EngineOutput::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry() {
        let reg = ConfigRegistry::standard();
        assert_eq!(reg.len(), 12);
        let default = reg.get("default").unwrap();
        assert!(default.has_term(integrand::ALL));
        assert!(default.highpt_first);

        let no_jac = reg.get("NoJacobian").unwrap();
        assert!(!no_jac.has_term(integrand::JACOBIAN));
        assert!(no_jac.has_term(integrand::PDF));

        assert_eq!(reg.get("NumPointsDouble").unwrap().n_points_factor, 2.0);
        assert_eq!(reg.get("QuarkEnergy10").unwrap().b_range_cl, 0.10);
        assert_eq!(reg.get("NuPhiRestriction").unwrap().m_range_cl, 99.0);

        let range = reg.get("JetsPtOrderIntegrationRange").unwrap();
        assert!(!range.highpt_first);
        assert_eq!(range.j_range_cl, 0.99);
    }

    #[test]
    fn test_resolve_keeps_order_and_rejects_unknown() {
        let reg = ConfigRegistry::standard();
        let names = vec!["NoPDF".to_string(), "default".to_string()];
        let resolved = reg.resolve(&names).unwrap();
        assert_eq!(resolved[0].name, "NoPDF");
        assert_eq!(resolved[1].name, "default");

        let bad = vec!["default".to_string(), "Nope".to_string()];
        assert!(matches!(reg.resolve(&bad), Err(mecore::Error::ConfigurationMissing(_))));
    }

    #[test]
    fn test_final_state_from_leptons() {
        assert_eq!(FinalState::from_lepton_count(2), FinalState::LL);
        assert_eq!(FinalState::from_lepton_count(1), FinalState::LH);
        assert_eq!(FinalState::from_lepton_count(0), FinalState::HH);
    }

    #[test]
    fn test_null_engine_returns_defaults() {
        let mut engine = NullEngine::default();
        engine.next_event();
        engine.set_config(&NamedConfiguration::new("default"));
        engine.push_object(MemObject::new(ObjectType::Met, 30.0, 0.0, 1.0, 0.0));
        let out = engine.run(FinalState::LH, Hypothesis::Tth, &[PsVar::CosQbar1]);
        assert_eq!(out, EngineOutput::default());
    }
}
