//! Angular matching and generator-level tau reconstruction.

use std::collections::HashMap;

use htt_core::{GenJet, GenParticle, Lepton, LorentzVector, PFJet};

/// Anything with a four-momentum.
pub trait HasVector {
    /// Four-momentum.
    fn p4(&self) -> &LorentzVector;
}

impl HasVector for LorentzVector {
    fn p4(&self) -> &LorentzVector {
        self
    }
}

impl HasVector for Lepton {
    fn p4(&self) -> &LorentzVector {
        self.vector()
    }
}

impl HasVector for GenParticle {
    fn p4(&self) -> &LorentzVector {
        &self.vector
    }
}

impl HasVector for GenJet {
    fn p4(&self) -> &LorentzVector {
        &self.vector
    }
}

impl HasVector for PFJet {
    fn p4(&self) -> &LorentzVector {
        &self.candidate.vector
    }
}

impl<T: HasVector + ?Sized> HasVector for &T {
    fn p4(&self) -> &LorentzVector {
        (**self).p4()
    }
}

/// Match objects in `first` to objects in `second` within `max_dr`.
///
/// Returns `(i, j)` index pairs. With `best_match` each object of `first` keeps
/// only its closest partner (pairs are considered in increasing ΔR); with
/// `unique_match` each object of `second` is used at most once.
pub fn match_by_dr<A: HasVector, B: HasVector>(
    first: &[A],
    second: &[B],
    max_dr: f64,
    unique_match: bool,
    best_match: bool,
) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for (i, a) in first.iter().enumerate() {
        for (j, b) in second.iter().enumerate() {
            let dr = a.p4().delta_r(b.p4());
            if dr < max_dr {
                candidates.push((i, j, dr));
            }
        }
    }
    if !best_match && !unique_match {
        return candidates.into_iter().map(|(i, j, _)| (i, j)).collect();
    }
    if best_match {
        candidates.sort_by(|a, b| a.2.total_cmp(&b.2));
    }

    let mut used_first = vec![false; first.len()];
    let mut used_second = vec![false; second.len()];
    let mut out = Vec::new();
    for (i, j, _) in candidates {
        if best_match && used_first[i] {
            continue;
        }
        if unique_match && used_second[j] {
            continue;
        }
        used_first[i] = true;
        used_second[j] = true;
        out.push((i, j));
    }
    out
}

/// Index and ΔR of the object in `pool` closest to `target`, if within `max_dr`.
pub fn closest_within<T: HasVector>(
    target: &LorentzVector,
    pool: &[T],
    max_dr: f64,
) -> Option<(usize, f64)> {
    pool.iter()
        .enumerate()
        .map(|(j, p)| (j, target.delta_r(p.p4())))
        .filter(|(_, dr)| *dr < max_dr)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// `pt > min_pt && |eta| < max_eta`.
pub fn min_pt_max_eta(v: &LorentzVector, min_pt: f64, max_eta: f64) -> bool {
    v.pt > min_pt && v.eta.abs() < max_eta
}

fn is_neutrino(pdgid: i32) -> bool {
    matches!(pdgid.abs(), 12 | 14 | 16)
}

fn is_charged_hadron(pdgid: i32) -> bool {
    matches!(pdgid.abs(), 211 | 321)
}

/// Visible tau jets built from the stable decay products of generator taus.
///
/// Only taus whose decay does not contain another tau are used (the last copy
/// in a radiation chain). Neutrinos are excluded from the visible momentum.
/// Leptonic decays are dropped unless `include_leptonic` is set. The jet
/// flavour is `electron`, `muon`, or `hadronic_<n>prong`.
pub fn build_tau_jets(particles: &[GenParticle], include_leptonic: bool) -> Vec<GenJet> {
    let by_index: HashMap<usize, &GenParticle> = particles.iter().map(|p| (p.index, p)).collect();

    let mut jets = Vec::new();
    for tau in particles.iter().filter(|p| p.pdgid.abs() == 15) {
        let has_tau_daughter = tau
            .daughters
            .iter()
            .filter_map(|d| by_index.get(d))
            .any(|d| d.pdgid.abs() == 15);
        if has_tau_daughter {
            continue;
        }

        let mut stable = Vec::new();
        collect_stable(tau, &by_index, &mut stable, 0);

        let leptonic =
            stable.iter().find(|p| matches!(p.pdgid.abs(), 11 | 13)).map(|p| p.pdgid.abs());
        if leptonic.is_some() && !include_leptonic {
            continue;
        }

        let visible: Vec<&GenParticle> =
            stable.into_iter().filter(|p| !is_neutrino(p.pdgid)).collect();
        if visible.is_empty() {
            continue;
        }
        let vector = visible.iter().skip(1).fold(visible[0].vector, |acc, p| acc + p.vector);
        let flavour = match leptonic {
            Some(11) => "electron".to_string(),
            Some(_) => "muon".to_string(),
            None => {
                let prongs = visible.iter().filter(|p| is_charged_hadron(p.pdgid)).count();
                format!("hadronic_{prongs}prong")
            }
        };
        jets.push(GenJet {
            vector,
            constituents: visible.iter().map(|p| p.index).collect(),
            flavour,
        });
    }
    jets
}

const MAX_DECAY_DEPTH: usize = 32;

fn collect_stable<'a>(
    p: &'a GenParticle,
    by_index: &HashMap<usize, &'a GenParticle>,
    out: &mut Vec<&'a GenParticle>,
    depth: usize,
) {
    if depth > MAX_DECAY_DEPTH {
        return;
    }
    for d in p.daughters.iter().filter_map(|d| by_index.get(d).copied()) {
        if d.status == 1 {
            out.push(d);
        } else {
            collect_stable(d, by_index, out, depth + 1);
        }
    }
}
