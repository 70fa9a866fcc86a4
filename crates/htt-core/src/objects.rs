//! Physics objects carried in the event record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vector::LorentzVector;

/// Fields shared by every reconstructed object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique identifier within the event.
    pub id: u64,
    /// Four-momentum.
    pub vector: LorentzVector,
    /// Electric charge in units of e.
    #[serde(default)]
    pub charge: i32,
}

impl Candidate {
    /// Build a candidate.
    pub fn new(id: u64, vector: LorentzVector, charge: i32) -> Self {
        Self { id, vector, charge }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.vector.pt
    }

    /// Pseudorapidity.
    pub fn eta(&self) -> f64 {
        self.vector.eta
    }

    /// Azimuth.
    pub fn phi(&self) -> f64 {
        self.vector.phi
    }
}

/// Hadronically decaying tau candidate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tau {
    /// Kinematics, charge and id.
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Decay-mode classification (0 = 1-prong, 1 = 1-prong + pi0s, 10 = 3-prong, ...).
    #[serde(default)]
    pub decay_mode: i32,
    /// Named discriminator values.
    #[serde(default)]
    pub tau_ids: BTreeMap<String, f64>,
}

impl Tau {
    /// Discriminator value by name.
    pub fn tau_id(&self, name: &str) -> Option<f64> {
        self.tau_ids.get(name).copied()
    }
}

/// Electron candidate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Electron {
    /// Kinematics, charge and id.
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Relative PF isolation.
    #[serde(default)]
    pub iso: f64,
}

/// Analysis muon.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Muon {
    /// Kinematics, charge and id.
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Global muon flag.
    #[serde(default)]
    pub is_global: bool,
    /// Tracker muon flag.
    #[serde(default)]
    pub is_tracker: bool,
    /// Particle-flow muon flag.
    #[serde(default)]
    pub is_pf: bool,
    /// Sum of charged hadron pT in the isolation cone.
    #[serde(default)]
    pub dr04_pfiso_charged: f64,
    /// Sum of neutral hadron E_T in the isolation cone.
    #[serde(default)]
    pub dr04_pfiso_neutral: f64,
    /// Sum of photon E_T in the isolation cone.
    #[serde(default)]
    pub dr04_pfiso_gamma: f64,
    /// Sum of pileup charged pT in the isolation cone.
    #[serde(default)]
    pub dr04_pfiso_pu: f64,
    /// Transverse impact parameter w.r.t. the primary vertex.
    #[serde(default)]
    pub dxy_vertex: f64,
    /// Longitudinal impact parameter w.r.t. the primary vertex.
    #[serde(default)]
    pub dz_vertex: f64,
}

impl Muon {
    /// Delta-beta corrected relative isolation.
    pub fn rel_iso_db(&self) -> f64 {
        let neutral =
            (self.dr04_pfiso_neutral + self.dr04_pfiso_gamma - 0.5 * self.dr04_pfiso_pu).max(0.0);
        if self.candidate.pt() <= 0.0 {
            return f64::INFINITY;
        }
        (self.dr04_pfiso_charged + neutral) / self.candidate.pt()
    }
}

/// A lepton that can appear in a dilepton pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lepton {
    /// Electron leg.
    Electron(Electron),
    /// Muon leg.
    Muon(Muon),
    /// Hadronic tau leg.
    Tau(Tau),
}

impl Lepton {
    /// Common candidate fields.
    pub fn candidate(&self) -> &Candidate {
        match self {
            Lepton::Electron(e) => &e.candidate,
            Lepton::Muon(m) => &m.candidate,
            Lepton::Tau(t) => &t.candidate,
        }
    }

    /// Object id.
    pub fn id(&self) -> u64 {
        self.candidate().id
    }

    /// Four-momentum.
    pub fn vector(&self) -> &LorentzVector {
        &self.candidate().vector
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.candidate().pt()
    }

    /// Charge.
    pub fn charge(&self) -> i32 {
        self.candidate().charge
    }

    /// The tau, if this leg is one.
    pub fn as_tau(&self) -> Option<&Tau> {
        match self {
            Lepton::Tau(t) => Some(t),
            _ => None,
        }
    }

    /// The electron, if this leg is one.
    pub fn as_electron(&self) -> Option<&Electron> {
        match self {
            Lepton::Electron(e) => Some(e),
            _ => None,
        }
    }

    /// Short name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Lepton::Electron(_) => "electron",
            Lepton::Muon(_) => "muon",
            Lepton::Tau(_) => "tau",
        }
    }
}

/// Two-lepton candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeCandidate {
    /// First leg (electron or muon in the lepton-tau channels).
    pub lepton1: Lepton,
    /// Second leg (the tau in the lepton-tau channels).
    pub lepton2: Lepton,
}

impl CompositeCandidate {
    /// Build a pair.
    pub fn new(lepton1: Lepton, lepton2: Lepton) -> Self {
        Self { lepton1, lepton2 }
    }

    /// Scalar sum of the two legs' pT.
    pub fn scalar_pt_sum(&self) -> f64 {
        self.lepton1.pt() + self.lepton2.pt()
    }

    /// Total charge of the pair.
    pub fn charge(&self) -> i32 {
        self.lepton1.charge() + self.lepton2.charge()
    }

    /// Legs carry charges of opposite sign.
    pub fn opposite_sign(&self) -> bool {
        self.lepton1.charge().signum() * self.lepton2.charge().signum() < 0
    }

    /// Legs carry charges of the same sign.
    pub fn same_sign(&self) -> bool {
        self.lepton1.charge().signum() * self.lepton2.charge().signum() > 0
    }

    /// Visible four-momentum of the pair.
    pub fn vector(&self) -> LorentzVector {
        *self.lepton1.vector() + *self.lepton2.vector()
    }
}

/// Missing transverse energy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Met {
    /// Object id.
    #[serde(default)]
    pub id: u64,
    /// MET vector; only px and py are physical.
    pub vector: LorentzVector,
    /// Scalar sum of transverse energy.
    #[serde(default)]
    pub sum_et: f64,
}

impl Met {
    /// Replace the vector with (px, py), setting pz = 0 and E = |(px, py)|.
    pub fn set_transverse(&mut self, px: f64, py: f64) {
        let et = (px * px + py * py).sqrt();
        self.vector = LorentzVector::from_px_py_pz_e(px, py, 0.0, et);
    }
}

/// Generator-level particle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenParticle {
    /// Position in the full generator record.
    pub index: usize,
    /// PDG id.
    pub pdgid: i32,
    /// Generator status code.
    pub status: i32,
    /// Four-momentum.
    pub vector: LorentzVector,
    /// Indices (into the full record) of the daughters.
    #[serde(default)]
    pub daughters: Vec<usize>,
}

impl GenParticle {
    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.vector.pt
    }
}

/// Jet of generator-level particles.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenJet {
    /// Visible four-momentum.
    pub vector: LorentzVector,
    /// Indices of the constituent particles.
    #[serde(default)]
    pub constituents: Vec<usize>,
    /// Free-form flavour tag (e.g. tau decay topology).
    #[serde(default)]
    pub flavour: String,
}

/// Particle-flow jet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PFJet {
    /// Kinematics, charge and id.
    #[serde(flatten)]
    pub candidate: Candidate,
    /// b-tagging discriminant.
    #[serde(default)]
    pub btag: f64,
    /// Passes the pileup jet id.
    #[serde(default = "default_true")]
    pub pu_id: bool,
}

fn default_true() -> bool {
    true
}

/// Detector-level muon before conversion into an analysis [`Muon`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecoMuon {
    /// Four-momentum.
    pub vector: LorentzVector,
    /// Charge.
    pub charge: i32,
    /// Global muon flag.
    #[serde(default)]
    pub is_global: bool,
    /// Tracker muon flag.
    #[serde(default)]
    pub is_tracker: bool,
    /// Particle-flow muon flag.
    #[serde(default)]
    pub is_pf: bool,
    /// Inner-track reference point (x, y, z) in cm.
    #[serde(default)]
    pub track_vertex: [f64; 3],
    /// PF isolation sums keyed by name, e.g. `charged_pfiso_04`.
    #[serde(default)]
    pub isolation: BTreeMap<String, f64>,
    /// Boolean id decisions keyed by name.
    #[serde(default)]
    pub ids: BTreeMap<String, bool>,
}

/// Reconstructed primary vertex.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    /// Position (x, y, z) in cm.
    pub position: [f64; 3],
    /// Fit quality.
    #[serde(default)]
    pub chi2: f64,
    /// Degrees of freedom.
    #[serde(default)]
    pub ndof: f64,
}

/// Per-event bookkeeping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventInfo {
    /// Run number.
    #[serde(default)]
    pub run: u64,
    /// Event number.
    #[serde(default)]
    pub event: u64,
    /// Number of good reconstructed vertices.
    #[serde(default)]
    pub good_vertices: u32,
    /// Named weights with an enabled flag.
    #[serde(default)]
    pub weights: BTreeMap<String, (f64, bool)>,
}

impl EventInfo {
    /// Product of all enabled weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.values().filter(|(_, on)| *on).map(|(w, _)| *w).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lep(id: u64, pt: f64, charge: i32) -> Lepton {
        Lepton::Muon(Muon {
            candidate: Candidate::new(id, LorentzVector::massless(pt, 0.0, 0.0), charge),
            ..Default::default()
        })
    }

    #[test]
    fn test_pair_sign() {
        let os = CompositeCandidate::new(lep(1, 20.0, 1), lep(2, 30.0, -1));
        assert!(os.opposite_sign());
        assert!(!os.same_sign());
        assert_eq!(os.charge(), 0);
        assert_eq!(os.scalar_pt_sum(), 50.0);

        let ss = CompositeCandidate::new(lep(1, 20.0, -1), lep(2, 30.0, -1));
        assert!(ss.same_sign());
        assert!(!ss.opposite_sign());

        let big = CompositeCandidate::new(lep(1, 20.0, i32::MAX), lep(2, 30.0, i32::MIN));
        assert!(big.opposite_sign());
        assert!(!big.same_sign());
        let big = CompositeCandidate::new(lep(1, 20.0, i32::MIN), lep(2, 30.0, -3));
        assert!(big.same_sign());

        let neutral = CompositeCandidate::new(lep(1, 20.0, 0), lep(2, 30.0, i32::MAX));
        assert!(!neutral.same_sign());
        assert!(!neutral.opposite_sign());
    }

    #[test]
    fn test_total_weight_skips_disabled() {
        let mut info = EventInfo::default();
        assert_eq!(info.total_weight(), 1.0);
        info.weights.insert("pileup".into(), (0.5, true));
        info.weights.insert("trigger".into(), (0.9, false));
        info.weights.insert("lumi".into(), (2.0, true));
        assert_eq!(info.total_weight(), 1.0);
    }

    #[test]
    fn test_lepton_json_is_tagged() {
        let tau = Lepton::Tau(Tau { decay_mode: 10, ..Default::default() });
        let s = serde_json::to_string(&tau).unwrap();
        assert!(s.contains("\"kind\":\"tau\""));
        let back: Lepton = serde_json::from_str(&s).unwrap();
        assert_eq!(back.as_tau().map(|t| t.decay_mode), Some(10));
        assert!(back.as_electron().is_none());
    }

    #[test]
    fn test_met_set_transverse() {
        let mut met = Met::default();
        met.set_transverse(3.0, -4.0);
        assert!((met.vector.pt - 5.0).abs() < 1e-12);
        assert!((met.vector.energy - 5.0).abs() < 1e-12);
        assert_eq!(met.vector.pz(), 0.0);
    }
}
