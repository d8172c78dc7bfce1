use std::f64::consts::PI;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use nalgebra::Vector4;

/// Pseudorapidity reported for vectors along the beam axis.
const ETA_AT_ZERO_PT: f64 = 1.0e10;

/// A Lorentz 4-vector stored as (px, py, pz, E).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LorentzVector {
    p: Vector4<f64>,
}

impl Default for LorentzVector {
    fn default() -> Self {
        LorentzVector::zero()
    }
}

impl LorentzVector {
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        LorentzVector { p: Vector4::new(px, py, pz, e) }
    }

    pub fn zero() -> Self {
        LorentzVector { p: Vector4::zeros() }
    }

    /// Build from collider coordinates.
    ///
    /// Arguments:
    ///
    /// * `pt` - transverse momentum
    /// * `eta` - pseudorapidity
    /// * `phi` - azimuthal angle
    /// * `mass` - invariant mass; a negative mass is interpreted as -sqrt(p^2 - E^2)
    ///
    /// # Examples
    ///
    /// ```
    /// use mecore::kinematics::lorentz::LorentzVector;
    ///
    /// let v = LorentzVector::from_pt_eta_phi_m(40.0, 0.0, 0.0, 0.0);
    /// assert!((v.e() - 40.0).abs() < 1e-12);
    /// assert!((v.pt() - 40.0).abs() < 1e-12);
    /// ```
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let pt = pt.abs();
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        let e = if mass >= 0.0 {
            (p2 + mass * mass).sqrt()
        } else {
            (p2 - mass * mass).max(0.0).sqrt()
        };
        LorentzVector::new(px, py, pz, e)
    }

    #[inline]
    pub fn px(&self) -> f64 {
        self.p[0]
    }

    #[inline]
    pub fn py(&self) -> f64 {
        self.p[1]
    }

    #[inline]
    pub fn pz(&self) -> f64 {
        self.p[2]
    }

    #[inline]
    pub fn e(&self) -> f64 {
        self.p[3]
    }

    /// Squared 3-momentum.
    pub fn p2(&self) -> f64 {
        self.px() * self.px() + self.py() * self.py() + self.pz() * self.pz()
    }

    /// Squared invariant mass, E^2 - p^2.
    pub fn m2(&self) -> f64 {
        self.e() * self.e() - self.p2()
    }

    /// Invariant mass. Space-like vectors (from rounding) return -sqrt(-m2).
    pub fn mass(&self) -> f64 {
        let m2 = self.m2();
        if m2 < 0.0 {
            -(-m2).sqrt()
        } else {
            m2.sqrt()
        }
    }

    pub fn pt(&self) -> f64 {
        self.px().hypot(self.py())
    }

    pub fn phi(&self) -> f64 {
        if self.px() == 0.0 && self.py() == 0.0 {
            0.0
        } else {
            self.py().atan2(self.px())
        }
    }

    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt > 0.0 {
            (self.pz() / pt).asinh()
        } else if self.pz() > 0.0 {
            ETA_AT_ZERO_PT
        } else if self.pz() < 0.0 {
            -ETA_AT_ZERO_PT
        } else {
            0.0
        }
    }

    /// Azimuthal separation folded into [-pi, pi).
    pub fn delta_phi(&self, other: &LorentzVector) -> f64 {
        delta_phi(self.phi(), other.phi())
    }

    /// Angular distance sqrt(d_eta^2 + d_phi^2).
    pub fn delta_r(&self, other: &LorentzVector) -> f64 {
        delta_r(self.eta(), self.phi(), other.eta(), other.phi())
    }
}

/// Fold an azimuthal difference into [-pi, pi). Non-finite input gives NaN.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    (phi1 - phi2 + PI).rem_euclid(2.0 * PI) - PI
}

/// Angular distance in the (eta, phi) plane.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let d_eta = eta1 - eta2;
    let d_phi = delta_phi(phi1, phi2);
    (d_eta * d_eta + d_phi * d_phi).sqrt()
}

impl Add for LorentzVector {
    type Output = LorentzVector;

    fn add(self, rhs: LorentzVector) -> LorentzVector {
        LorentzVector { p: self.p + rhs.p }
    }
}

impl AddAssign for LorentzVector {
    fn add_assign(&mut self, rhs: LorentzVector) {
        self.p += rhs.p;
    }
}

impl Sum for LorentzVector {
    fn sum<I: Iterator<Item = LorentzVector>>(iter: I) -> Self {
        iter.fold(LorentzVector::zero(), |acc, v| acc + v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_trip_coordinates() {
        let v = LorentzVector::from_pt_eta_phi_m(55.0, -1.3, 2.1, 7.5);
        assert_relative_eq!(v.pt(), 55.0, epsilon = 1e-9);
        assert_relative_eq!(v.eta(), -1.3, epsilon = 1e-9);
        assert_relative_eq!(v.phi(), 2.1, epsilon = 1e-9);
        assert_relative_eq!(v.mass(), 7.5, epsilon = 1e-6);
    }

    #[test]
    fn test_back_to_back_pair_mass() {
        // m^2 = 2 pt1 pt2 (cosh(d_eta) - cos(d_phi)) = 2 * 40 * 40 * 2
        let a = LorentzVector::from_pt_eta_phi_m(40.0, 0.0, 0.0, 0.0);
        let b = LorentzVector::from_pt_eta_phi_m(40.0, 0.0, PI, 0.0);
        assert_relative_eq!((a + b).mass(), 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_delta_phi_wraps() {
        assert_relative_eq!(delta_phi(3.0, -3.0), 6.0 - 2.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(-3.0, 3.0), 2.0 * PI - 6.0, epsilon = 1e-12);
        assert_relative_eq!(delta_r(0.0, 3.1, 0.0, -3.1), 2.0 * PI - 6.2, epsilon = 1e-12);
    }

    #[test]
    fn test_delta_phi_extreme_inputs_terminate() {
        let d = delta_phi(1.0e18, 0.0);
        assert!((-PI..=PI).contains(&d));
        assert_relative_eq!(delta_phi(0.5 + 20.0 * PI, 0.0), 0.5, epsilon = 1e-9);
        assert!(delta_phi(f64::INFINITY, 0.0).is_nan());
        assert!(delta_phi(0.0, f64::NEG_INFINITY).is_nan());
    }

    #[test]
    fn test_sum_of_vectors() {
        let parts = vec![
            LorentzVector::new(1.0, 0.0, 0.0, 2.0),
            LorentzVector::new(-1.0, 0.0, 0.0, 2.0),
        ];
        let total: LorentzVector = parts.into_iter().sum();
        assert_relative_eq!(total.mass(), 4.0, epsilon = 1e-12);
        assert_eq!(total.pt(), 0.0);
        assert_eq!(total.phi(), 0.0);
    }
}
