//! Four-vector kinematics in the (pt, eta, phi, E) representation.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::{Add, Sub};

/// Pseudorapidity assigned to a vector along the beam axis (pt = 0).
pub const ETA_MAX: f64 = 22756.0;

/// Lorentz vector stored as transverse momentum, pseudorapidity, azimuth and energy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LorentzVector {
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuthal angle in (-pi, pi].
    pub phi: f64,
    /// Energy (GeV).
    pub energy: f64,
}

impl LorentzVector {
    /// Build from (pt, eta, phi, E).
    pub fn new(pt: f64, eta: f64, phi: f64, energy: f64) -> Self {
        Self { pt, eta, phi, energy }
    }

    /// Massless vector with the given (pt, eta, phi).
    pub fn massless(pt: f64, eta: f64, phi: f64) -> Self {
        Self { pt, eta, phi, energy: pt * eta.cosh() }
    }

    /// Build from Cartesian components.
    pub fn from_px_py_pz_e(px: f64, py: f64, pz: f64, energy: f64) -> Self {
        let pt = px.hypot(py);
        let phi = if pt > 0.0 { py.atan2(px) } else { 0.0 };
        let eta = if pt > 0.0 {
            (pz / pt).asinh()
        } else if pz > 0.0 {
            ETA_MAX
        } else if pz < 0.0 {
            -ETA_MAX
        } else {
            0.0
        };
        Self { pt, eta, phi, energy }
    }

    /// x component of the momentum.
    pub fn px(&self) -> f64 {
        self.pt * self.phi.cos()
    }

    /// y component of the momentum.
    pub fn py(&self) -> f64 {
        self.pt * self.phi.sin()
    }

    /// z component of the momentum.
    pub fn pz(&self) -> f64 {
        self.pt * self.eta.sinh()
    }

    /// Magnitude of the three-momentum.
    pub fn p(&self) -> f64 {
        self.pt * self.eta.cosh()
    }

    /// Invariant mass. Space-like vectors return `-sqrt(-m^2)`.
    pub fn mass(&self) -> f64 {
        let p = self.p();
        let m2 = self.energy * self.energy - p * p;
        if m2 >= 0.0 { m2.sqrt() } else { -(-m2).sqrt() }
    }

    /// Multiply momentum and energy by `factor`, keeping the direction.
    pub fn scaled(&self, factor: f64) -> Self {
        Self { pt: self.pt * factor, eta: self.eta, phi: self.phi, energy: self.energy * factor }
    }

    /// Angular distance to `other` in (eta, phi) space.
    pub fn delta_r(&self, other: &LorentzVector) -> f64 {
        delta_r(self.eta, self.phi, other.eta, other.phi)
    }
}

impl Add for LorentzVector {
    type Output = LorentzVector;

    fn add(self, rhs: LorentzVector) -> LorentzVector {
        LorentzVector::from_px_py_pz_e(
            self.px() + rhs.px(),
            self.py() + rhs.py(),
            self.pz() + rhs.pz(),
            self.energy + rhs.energy,
        )
    }
}

impl Sub for LorentzVector {
    type Output = LorentzVector;

    fn sub(self, rhs: LorentzVector) -> LorentzVector {
        LorentzVector::from_px_py_pz_e(
            self.px() - rhs.px(),
            self.py() - rhs.py(),
            self.pz() - rhs.pz(),
            self.energy - rhs.energy,
        )
    }
}

/// Azimuthal difference wrapped into [-pi, pi].
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut d = phi1 - phi2;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d < -PI {
        d += 2.0 * PI;
    }
    d
}

/// `sqrt(deta^2 + dphi^2)`.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    (deta * deta + dphi * dphi).sqrt()
}
