//! Builds analysis muons from detector-level muon records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use htt_core::{
    AnalysisModule, Candidate, Muon, Product, RecoMuon, Result, Status, TreeEvent, hash_combine,
    label_hash,
};

/// Options of [`MuonProducer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MuonProducerConfig {
    /// Detector-level muons.
    pub input_label: String,
    /// Primary vertices; the first one is the reference for impact parameters.
    pub vertex_label: String,
    /// Output collection.
    pub branch_name: String,
    /// Keep only particle-flow muons.
    pub is_pf: bool,
    /// Suffix of the isolation sums to read (e.g. `_pfiso` variants).
    pub pfiso_postfix: String,
    /// Minimum pT.
    pub min_pt: f64,
    /// Maximum |eta|.
    pub max_eta: f64,
}

impl Default for MuonProducerConfig {
    fn default() -> Self {
        Self {
            input_label: "recoMuons".into(),
            vertex_label: "offlinePrimaryVertices".into(),
            branch_name: "muons".into(),
            is_pf: false,
            pfiso_postfix: String::new(),
            min_pt: 0.0,
            max_eta: 999.0,
        }
    }
}

/// Transverse and longitudinal impact parameters of a straight-line track.
pub fn impact_parameters(muon: &RecoMuon, vertex: [f64; 3]) -> (f64, f64) {
    let v = &muon.vector;
    let (px, py, pz, pt) = (v.px(), v.py(), v.pz(), v.pt);
    if pt <= 0.0 {
        return (0.0, 0.0);
    }
    let dx = muon.track_vertex[0] - vertex[0];
    let dy = muon.track_vertex[1] - vertex[1];
    let dz = muon.track_vertex[2] - vertex[2];
    let dxy = (-dx * py + dy * px) / pt;
    let dz = dz - (dx * px + dy * py) / pt * (pz / pt);
    (dxy, dz)
}

/// Converts [`RecoMuon`]s into analysis [`Muon`]s.
pub struct MuonProducer {
    name: String,
    config: MuonProducerConfig,
    observed_idiso: BTreeMap<String, u64>,
    produced: u64,
}

impl MuonProducer {
    /// New producer.
    pub fn new(name: impl Into<String>, config: MuonProducerConfig) -> Self {
        Self { name: name.into(), config, observed_idiso: BTreeMap::new(), produced: 0 }
    }

    /// Id and isolation names seen so far, with their hashes.
    pub fn observed_idiso(&self) -> &BTreeMap<String, u64> {
        &self.observed_idiso
    }

    fn iso(&self, reco: &RecoMuon, base: &str) -> f64 {
        let key = format!("{base}{}", self.config.pfiso_postfix);
        reco.isolation.get(&key).copied().unwrap_or(0.0)
    }
}

impl AnalysisModule for MuonProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_analysis(&mut self) -> Result<()> {
        let cfg = &self.config;
        tracing::info!(
            module = %self.name,
            input = %cfg.input_label,
            branch = %cfg.branch_name,
            is_pf = cfg.is_pf,
            pfiso_postfix = %cfg.pfiso_postfix,
            min_pt = cfg.min_pt,
            max_eta = cfg.max_eta,
            "muon producer configured"
        );
        Ok(())
    }

    fn execute(&mut self, event: &mut TreeEvent) -> Result<Status> {
        let cfg = &self.config;
        let vertex =
            event.vertices(&cfg.vertex_label)?.first().map(|v| v.position).unwrap_or_default();
        let input_hash = label_hash(&cfg.input_label);

        let mut muons = Vec::new();
        for (i, reco) in event.reco_muons(&cfg.input_label)?.iter().enumerate() {
            for name in reco.isolation.keys().chain(reco.ids.keys()) {
                if !self.observed_idiso.contains_key(name) {
                    self.observed_idiso.insert(name.clone(), label_hash(name));
                }
            }
            if reco.vector.pt <= cfg.min_pt || reco.vector.eta.abs() >= cfg.max_eta {
                continue;
            }
            if cfg.is_pf && !reco.is_pf {
                continue;
            }
            let (dxy, dz) = impact_parameters(reco, vertex);
            let id = hash_combine(input_hash, i as u64);
            muons.push(Muon {
                candidate: Candidate::new(id, reco.vector, reco.charge),
                is_global: reco.is_global,
                is_tracker: reco.is_tracker,
                is_pf: reco.is_pf,
                dr04_pfiso_charged: self.iso(reco, "charged_pfiso_04"),
                dr04_pfiso_neutral: self.iso(reco, "neutral_pfiso_04"),
                dr04_pfiso_gamma: self.iso(reco, "gamma_pfiso_04"),
                dr04_pfiso_pu: self.iso(reco, "pu_pfiso_04"),
                dxy_vertex: dxy,
                dz_vertex: dz,
            });
        }
        self.produced += muons.len() as u64;
        event.add(self.config.branch_name.clone(), Product::Muons(muons));
        Ok(Status::Accept)
    }

    fn post_analysis(&mut self) -> Result<()> {
        tracing::info!(module = %self.name, produced = self.produced, "muon producer summary");
        for (name, hash) in &self.observed_idiso {
            tracing::info!(module = %self.name, name = %name, hash = *hash, "observed id/iso");
        }
        Ok(())
    }
}
