//! Jet energy-scale and resolution variations, propagated to the MET.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use htt_core::{AnalysisModule, Error, GenJet, HistoSet, Result, Status, TreeEvent};

use crate::jec::JetCorrectionUncertainty;
use crate::matching::closest_within;

/// Upper |eta| edges of the resolution-factor bins.
pub const JER_ETA_EDGES: [f64; 5] = [0.5, 1.1, 1.7, 2.3, 5.0];
/// Data/MC jet resolution ratio, central values.
pub const JER_CENTRAL: [f64; 5] = [1.052, 1.057, 1.096, 1.134, 1.288];
/// Data/MC jet resolution ratio, downward (better resolution) variation.
pub const JER_DOWN: [f64; 5] = [0.990, 1.001, 1.032, 1.042, 1.089];
/// Data/MC jet resolution ratio, upward (worse resolution) variation.
pub const JER_UP: [f64; 5] = [1.115, 1.114, 1.161, 1.228, 1.488];

/// Cone for matching reconstructed to generator jets.
pub const GEN_JET_MATCH_DR: f64 = 0.5;

/// Options of [`JetMetModifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JetMetConfig {
    /// Jet collection, modified in place.
    pub input_label: String,
    /// MET object, corrected in place.
    pub met_label: String,
    /// Generator jets used for resolution smearing.
    pub gen_jets_label: String,
    /// Running on collision data.
    pub is_data: bool,
    /// Apply a JES shift on simulation.
    pub do_jes_syst: bool,
    /// Apply a JES shift on data.
    pub do_data_jes_syst: bool,
    /// Direction of the JES shift.
    pub jes_up: bool,
    /// Rescale simulated jets to the data resolution.
    pub do_smear: bool,
    /// Use the varied resolution factors instead of the central ones.
    pub do_jer_syst: bool,
    /// With `do_jer_syst`, pick the better-resolution variation.
    pub jer_better: bool,
    /// JES uncertainty table.
    pub jes_uncertainty_file: Option<PathBuf>,
}

impl Default for JetMetConfig {
    fn default() -> Self {
        Self {
            input_label: "pfJetsPFlow".into(),
            met_label: "pfMetType1".into(),
            gen_jets_label: "genJets".into(),
            is_data: false,
            do_jes_syst: false,
            do_data_jes_syst: false,
            jes_up: true,
            do_smear: false,
            do_jer_syst: false,
            jer_better: false,
            jes_uncertainty_file: None,
        }
    }
}

impl JetMetConfig {
    fn applies_jes(&self) -> bool {
        if self.is_data { self.do_data_jes_syst } else { self.do_jes_syst }
    }

    fn applies_smearing(&self) -> bool {
        self.do_smear && !self.is_data
    }

    /// Resolution factor for a jet at `eta`.
    pub fn jer_factor(&self, eta: f64) -> f64 {
        let table = match (self.do_jer_syst, self.jer_better) {
            (false, _) => &JER_CENTRAL,
            (true, true) => &JER_DOWN,
            (true, false) => &JER_UP,
        };
        let i = JER_ETA_EDGES.iter().position(|&edge| eta.abs() < edge).unwrap_or(table.len() - 1);
        table[i]
    }
}

/// Shifts jet energies and keeps the MET consistent with the shifted jets.
pub struct JetMetModifier {
    name: String,
    config: JetMetConfig,
    uncertainty: Option<JetCorrectionUncertainty>,
    histos: Option<HistoSet>,
}

impl JetMetModifier {
    /// New modifier.
    pub fn new(name: impl Into<String>, config: JetMetConfig) -> Self {
        Self { name: name.into(), config, uncertainty: None, histos: None }
    }

    /// Use an in-memory uncertainty table instead of `jes_uncertainty_file`.
    pub fn with_uncertainty(mut self, table: JetCorrectionUncertainty) -> Self {
        self.uncertainty = Some(table);
        self
    }

    /// Book diagnostic histograms in `pre_analysis`.
    ///
    /// The histogram directory is the instance name.
    pub fn with_histograms(mut self) -> Self {
        self.histos = Some(HistoSet::new(self.name.clone()));
        self
    }
}

impl AnalysisModule for JetMetModifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_analysis(&mut self) -> Result<()> {
        let cfg = &self.config;
        if cfg.applies_jes() && self.uncertainty.is_none() {
            let path = cfg.jes_uncertainty_file.as_ref().ok_or_else(|| {
                Error::Config("JES shift requested but no jes_uncertainty_file given".into())
            })?;
            self.uncertainty = Some(JetCorrectionUncertainty::from_file(path)?);
        }
        tracing::info!(
            module = %self.name,
            input_label = %cfg.input_label,
            met_label = %cfg.met_label,
            is_data = cfg.is_data,
            jes = cfg.applies_jes(),
            jes_up = cfg.jes_up,
            smear = cfg.applies_smearing(),
            jer_syst = cfg.do_jer_syst,
            jer_better = cfg.jer_better,
            "jet/MET modifier configured"
        );
        if let Some(h) = self.histos.as_mut() {
            h.create_1d("jes_met_diff", 100, -20.0, 20.0)?;
            h.create_1d("jes_is_order_same", 2, -0.5, 1.5)?;
            h.create_1d("smear_pt_diff", 100, -50.0, 50.0)?;
            h.create_1d("smear_gen_min_dr", 50, 0.0, 0.5)?;
        }
        Ok(())
    }

    fn execute(&mut self, event: &mut TreeEvent) -> Result<Status> {
        let cfg = &self.config;
        let apply_jes = cfg.applies_jes();
        let gen_jets: Option<Vec<GenJet>> = if cfg.applies_smearing() {
            Some(event.gen_jets(&cfg.gen_jets_label)?.clone())
        } else {
            None
        };
        if !apply_jes && gen_jets.is_none() {
            return Ok(Status::Accept);
        }

        let jets = event.jets_mut(&cfg.input_label)?;
        let order_before: Vec<u64> = jets.iter().map(|j| j.candidate.id).collect();
        let (mut dpx, mut dpy) = (0.0, 0.0);
        for jet in jets.iter_mut() {
            let old = jet.candidate.vector;

            if apply_jes && let Some(table) = self.uncertainty.as_ref() {
                let unc = table.uncertainty(old.pt, old.eta, cfg.jes_up);
                let factor = if cfg.jes_up { 1.0 + unc } else { 1.0 - unc };
                jet.candidate.vector = old.scaled(factor.max(0.0));
            }

            if let Some(truth) = gen_jets.as_deref()
                && let Some((j, dr)) =
                    closest_within(&jet.candidate.vector, truth, GEN_JET_MATCH_DR)
            {
                let pt = jet.candidate.vector.pt;
                let gen_pt = truth[j].vector.pt;
                let c = cfg.jer_factor(jet.candidate.vector.eta);
                let new_pt = (gen_pt + c * (pt - gen_pt)).max(0.0);
                let ratio = if pt > 0.0 { new_pt / pt } else { 0.0 };
                jet.candidate.vector = jet.candidate.vector.scaled(ratio);
                if let Some(h) = self.histos.as_mut() {
                    h.fill_1d("smear_pt_diff", new_pt - pt, 1.0)?;
                    h.fill_1d("smear_gen_min_dr", dr, 1.0)?;
                }
            }

            let new = jet.candidate.vector;
            dpx += new.px() - old.px();
            dpy += new.py() - old.py();
        }
        jets.sort_by(|a, b| b.candidate.vector.pt.total_cmp(&a.candidate.vector.pt));
        let order_same = jets.iter().map(|j| j.candidate.id).eq(order_before.iter().copied());

        let met = event.met_mut(&cfg.met_label)?;
        let old_pt = met.vector.pt;
        let (mx, my) = (met.vector.px() - dpx, met.vector.py() - dpy);
        met.set_transverse(mx, my);
        let new_pt = met.vector.pt;

        if let Some(h) = self.histos.as_mut() {
            h.fill_1d("jes_met_diff", new_pt - old_pt, 1.0)?;
            h.fill_1d("jes_is_order_same", if order_same { 1.0 } else { 0.0 }, 1.0)?;
        }
        Ok(Status::Accept)
    }

    fn histograms(&self) -> Option<&HistoSet> {
        self.histos.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use htt_core::{Candidate, LorentzVector, Met, PFJet, Product};

    fn jet(id: u64, pt: f64, eta: f64, phi: f64) -> PFJet {
        PFJet {
            candidate: Candidate::new(id, LorentzVector::massless(pt, eta, phi), 0),
            btag: 0.0,
            pu_id: true,
        }
    }

    fn flat_table(unc: f64) -> JetCorrectionUncertainty {
        JetCorrectionUncertainty::parse(&format!("-5 5 6 10 {unc} {unc} 1000 {unc} {unc}"))
            .unwrap()
    }

    fn event(jets: Vec<PFJet>) -> TreeEvent {
        let mut e = TreeEvent::new();
        e.add("pfJetsPFlow", Product::Jets(jets));
        let mut met = Met::default();
        met.set_transverse(30.0, 0.0);
        e.add("pfMetType1", Product::Met(met));
        e
    }

    #[test]
    fn test_jes_up_moves_met_against_jets() {
        let cfg = JetMetConfig { do_jes_syst: true, jes_up: true, ..Default::default() };
        let mut m =
            JetMetModifier::new("jes", cfg).with_uncertainty(flat_table(0.1)).with_histograms();
        m.pre_analysis().unwrap();

        let jets = vec![jet(1, 100.0, 0.0, 0.0), jet(2, 50.0, 1.0, std::f64::consts::FRAC_PI_2)];
        let mut e = event(jets);
        assert_eq!(m.execute(&mut e).unwrap(), Status::Accept);

        let jets = e.jets("pfJetsPFlow").unwrap();
        assert_relative_eq!(jets[0].candidate.pt(), 110.0, epsilon = 1e-9);
        assert_relative_eq!(jets[1].candidate.pt(), 55.0, epsilon = 1e-9);
        let met = e.met("pfMetType1").unwrap();
        assert_relative_eq!(met.vector.px(), 30.0 - 10.0, epsilon = 1e-9);
        assert_relative_eq!(met.vector.py(), -5.0, epsilon = 1e-9);
        let order = m.histograms().unwrap().get_1d("jes_is_order_same").unwrap();
        assert_eq!(order.bin_content(1), 1.0);
    }

    #[test]
    fn test_jes_down() {
        let cfg = JetMetConfig { do_jes_syst: true, jes_up: false, ..Default::default() };
        let mut m = JetMetModifier::new("jes", cfg).with_uncertainty(flat_table(0.1));
        m.pre_analysis().unwrap();
        let mut e = event(vec![jet(1, 100.0, 0.0, 0.0)]);
        m.execute(&mut e).unwrap();
        assert_relative_eq!(e.jets("pfJetsPFlow").unwrap()[0].candidate.pt(), 90.0, epsilon = 1e-9);
        assert_relative_eq!(e.met("pfMetType1").unwrap().vector.px(), 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_data_untouched_without_data_syst() {
        let cfg =
            JetMetConfig { is_data: true, do_jes_syst: true, do_smear: true, ..Default::default() };
        let mut m = JetMetModifier::new("jes", cfg);
        m.pre_analysis().unwrap();
        let mut e = event(vec![jet(1, 100.0, 0.0, 0.0)]);
        let before = e.clone();
        m.execute(&mut e).unwrap();
        assert_eq!(e, before);
    }

    #[test]
    fn test_missing_uncertainty_file_is_config_error() {
        let cfg = JetMetConfig { do_jes_syst: true, ..Default::default() };
        let mut m = JetMetModifier::new("jes", cfg);
        assert!(matches!(m.pre_analysis(), Err(Error::Config(_))));
    }

    #[test]
    fn test_resolution_scaling_with_gen_match() {
        let cfg = JetMetConfig { do_smear: true, ..Default::default() };
        let mut m = JetMetModifier::new("jer", cfg.clone());
        m.pre_analysis().unwrap();
        let mut e = event(vec![jet(1, 60.0, 0.2, 0.0), jet(2, 40.0, 3.0, 2.0)]);
        e.add(
            "genJets",
            Product::GenJets(vec![GenJet {
                vector: LorentzVector::massless(50.0, 0.25, 0.0),
                ..Default::default()
            }]),
        );
        m.execute(&mut e).unwrap();
        let jets = e.jets("pfJetsPFlow").unwrap();
        // 50 + 1.052 * (60 - 50)
        assert_relative_eq!(jets[0].candidate.pt(), 60.52, epsilon = 1e-9);
        // unmatched jet is untouched
        assert_relative_eq!(jets[1].candidate.pt(), 40.0, epsilon = 1e-12);
        assert_relative_eq!(e.met("pfMetType1").unwrap().vector.px(), 30.0 - 0.52, epsilon = 1e-9);
    }

    #[test]
    fn test_jer_factor_tables() {
        let central = JetMetConfig::default();
        assert_eq!(central.jer_factor(0.2), 1.052);
        assert_eq!(central.jer_factor(-2.0), 1.134);
        assert_eq!(central.jer_factor(6.0), 1.288);
        let better = JetMetConfig { do_jer_syst: true, jer_better: true, ..Default::default() };
        assert_eq!(better.jer_factor(1.5), 1.032);
        let worse = JetMetConfig { do_jer_syst: true, ..Default::default() };
        assert_eq!(worse.jer_factor(1.5), 1.161);
    }
}
