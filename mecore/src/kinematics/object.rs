use serde::{Deserialize, Serialize};

use crate::kinematics::lorentz::{delta_r, LorentzVector};

/// Anything carrying collider coordinates (pt, eta, phi, mass).
pub trait Kinematic {
    fn pt(&self) -> f64;
    fn eta(&self) -> f64;
    fn phi(&self) -> f64;
    fn mass(&self) -> f64;

    fn p4(&self) -> LorentzVector {
        LorentzVector::from_pt_eta_phi_m(self.pt(), self.eta(), self.phi(), self.mass())
    }

    /// Angular distance to another object, computed on the stored coordinates.
    fn delta_r_to<K: Kinematic + ?Sized>(&self, other: &K) -> f64 {
        delta_r(self.eta(), self.phi(), other.eta(), other.phi())
    }
}

impl<K: Kinematic + ?Sized> Kinematic for &K {
    fn pt(&self) -> f64 {
        (**self).pt()
    }
    fn eta(&self) -> f64 {
        (**self).eta()
    }
    fn phi(&self) -> f64 {
        (**self).phi()
    }
    fn mass(&self) -> f64 {
        (**self).mass()
    }
}

/// Plain (pt, eta, phi, mass) record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PtEtaPhiM {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
}

impl PtEtaPhiM {
    pub fn new(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        PtEtaPhiM { pt, eta, phi, mass }
    }
}

impl Kinematic for PtEtaPhiM {
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

/// A 4-vector with a discrete tag and the index of the object it was built from.
///
/// `index` points into the origin collection and never owns it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredObject {
    pub kinematics: PtEtaPhiM,
    pub tagged: bool,
    pub index: usize,
}

impl ScoredObject {
    pub fn from_kinematic<K: Kinematic + ?Sized>(object: &K, tagged: bool, index: usize) -> Self {
        ScoredObject {
            kinematics: PtEtaPhiM::new(object.pt(), object.eta(), object.phi(), object.mass()),
            tagged,
            index,
        }
    }
}

impl Kinematic for ScoredObject {
    fn pt(&self) -> f64 {
        self.kinematics.pt
    }
    fn eta(&self) -> f64 {
        self.kinematics.eta
    }
    fn phi(&self) -> f64 {
        self.kinematics.phi
    }
    fn mass(&self) -> f64 {
        self.kinematics.mass
    }
}

/// Invariant mass of the two-object system.
pub fn pair_mass<A: Kinematic + ?Sized, B: Kinematic + ?Sized>(a: &A, b: &B) -> f64 {
    (a.p4() + b.p4()).mass()
}

/// Indices of `objects` ordered by descending pt. Equal pt keeps input order.
pub fn indices_by_pt_desc<K: Kinematic>(objects: &[K]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..objects.len()).collect();
    idx.sort_by(|&a, &b| {
        objects[b]
            .pt()
            .partial_cmp(&objects[a].pt())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scored_object_keeps_back_reference() {
        let raw = PtEtaPhiM::new(30.0, 0.5, 1.0, 4.0);
        let s = ScoredObject::from_kinematic(&raw, true, 7);
        assert_eq!(s.index, 7);
        assert!(s.tagged);
        assert_relative_eq!(s.delta_r_to(&raw), 0.0);
    }

    #[test]
    fn test_indices_by_pt_desc_stable() {
        let objs = vec![
            PtEtaPhiM::new(20.0, 0.0, 0.0, 0.0),
            PtEtaPhiM::new(50.0, 0.0, 0.0, 0.0),
            PtEtaPhiM::new(20.0, 1.0, 0.0, 0.0),
        ];
        assert_eq!(indices_by_pt_desc(&objs), vec![1, 0, 2]);
    }
}
