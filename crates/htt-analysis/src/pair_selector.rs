//! Dilepton pair disambiguation.
//!
//! Reduces the event's list of candidate pairs to the single pair used by the
//! rest of the analysis. Opposite-sign pairs are preferred over same-sign
//! ones; within a sign class the pair with the largest scalar pT sum wins (or
//! the most isolated tau, when requested). The chosen pair can then drive the
//! pair-wise MET lookup, the MET energy-scale correction, generator-level
//! fake selection and a decay-mode restriction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use htt_core::{
    AnalysisModule, CompositeCandidate, Error, GenJet, HistoSet, LorentzVector, Met, Product,
    Result, Status, TreeEvent, pair_id,
};

use crate::channel::Channel;
use crate::matching::{build_tau_jets, match_by_dr, min_pt_max_eta};

/// Cone used for generator-level truth matching.
pub const TRUTH_MATCH_DR: f64 = 0.5;
/// Minimum pT of generator electrons/muons considered as the source of a fake tau.
pub const FAKE_LEPTON_MIN_PT: f64 = 8.0;
/// Minimum visible pT of generator hadronic taus.
pub const GEN_TAU_MIN_PT: f64 = 18.0;

/// Generator-level requirement on the selected tau.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruthSelection {
    /// No requirement.
    #[default]
    Off,
    /// Keep the event only if the tau is matched (e.g. ZL).
    RequireMatch,
    /// Keep the event only if the tau is not matched (e.g. ZJ).
    VetoMatch,
}

impl TruthSelection {
    /// Whether an event with the given match outcome is rejected.
    pub fn rejects(self, matched: bool) -> bool {
        match self {
            TruthSelection::Off => false,
            TruthSelection::RequireMatch => !matched,
            TruthSelection::VetoMatch => matched,
        }
    }
}

/// Options of [`PairSelector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PairSelectorConfig {
    /// Collection of candidate pairs; replaced by the selected pair.
    pub pair_label: String,
    /// MET product used (and written) by the module.
    pub met_label: String,
    /// Take the MET from a per-pair MET map.
    pub mva_met_from_vector: bool,
    /// Label of the per-pair MET map.
    pub met_vector_label: String,
    /// Rank by tau isolation instead of scalar pT sum (ignored in `em`).
    pub use_most_isolated: bool,
    /// Tau discriminator used for isolation ranking (lower is more isolated).
    pub isolation_discriminator: String,
    /// Correct the MET for a tau (or electron, in `em`) energy-scale shift.
    pub scale_met_for_tau: bool,
    /// Energy-scale factor applied to the shifted leg.
    pub tau_scale: f64,
    /// Optional per-tau scale factors, overriding `tau_scale`.
    pub tau_scales_label: String,
    /// Comma-separated allowed tau decay modes; empty allows all.
    pub allowed_tau_modes: String,
    /// Lepton-faking-tau selection.
    pub faked_tau_selector: TruthSelection,
    /// Hadronic tau selection.
    pub hadronic_tau_selector: TruthSelection,
    /// Generator particles used for the fake-tau selection.
    pub gen_particles_label: String,
    /// Generator particles used to build visible hadronic taus.
    pub gen_taus_label: String,
    /// Event bookkeeping product (for histogram weights).
    pub event_info_label: String,
}

impl Default for PairSelectorConfig {
    fn default() -> Self {
        Self {
            pair_label: "emtauCandidates".into(),
            met_label: "pfMVAMet".into(),
            mva_met_from_vector: true,
            met_vector_label: "pfMVAMetVector".into(),
            use_most_isolated: false,
            isolation_discriminator: "byCombinedIsolationDeltaBetaCorrRaw3Hits".into(),
            scale_met_for_tau: false,
            tau_scale: 1.0,
            tau_scales_label: "tau_scales".into(),
            allowed_tau_modes: String::new(),
            faked_tau_selector: TruthSelection::Off,
            hadronic_tau_selector: TruthSelection::Off,
            gen_particles_label: "genParticles".into(),
            gen_taus_label: "genParticlesTaus".into(),
            event_info_label: "eventInfo".into(),
        }
    }
}

/// Parse a comma-separated list of decay modes.
pub fn parse_tau_modes(s: &str) -> Result<BTreeSet<i32>> {
    if s.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    s.split(',')
        .map(|tok| {
            tok.trim()
                .parse::<i32>()
                .map_err(|e| Error::Config(format!("invalid tau decay mode '{tok}': {e}")))
        })
        .collect()
}

/// Shift the MET for a rescaled leg.
///
/// The leg's transverse momentum is divided by `scale` and the difference is
/// added to the MET; the result has pz = 0 and E = sqrt(px^2 + py^2).
pub fn shift_met_for_scale(met: &mut Met, leg: &LorentzVector, scale: f64) -> Result<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::Validation(format!("energy scale must be positive, got {scale}")));
    }
    let dx = leg.px() * (1.0 / scale - 1.0);
    let dy = leg.py() * (1.0 / scale - 1.0);
    let metx = met.vector.px() + dx;
    let mety = met.vector.py() + dy;
    met.set_transverse(metx, mety);
    Ok(())
}

/// Order pairs by descending scalar pT sum, keeping input order on ties.
pub fn rank_by_pt(pairs: &mut [&CompositeCandidate]) {
    pairs.sort_by(|a, b| b.scalar_pt_sum().total_cmp(&a.scalar_pt_sum()));
}

/// Order pairs by ascending value of the second leg's isolation discriminator.
///
/// The sort is stable, so the incoming order breaks ties.
pub fn rank_by_isolation(
    pairs: &mut Vec<&CompositeCandidate>,
    discriminator: &str,
    pair_label: &str,
) -> Result<()> {
    let mut keyed = Vec::with_capacity(pairs.len());
    for &p in pairs.iter() {
        let tau = p.lepton2.as_tau().ok_or_else(|| Error::ProductType {
            label: pair_label.to_string(),
            expected: "tau",
            found: p.lepton2.kind(),
        })?;
        let iso = tau.tau_id(discriminator).ok_or_else(|| {
            Error::Validation(format!(
                "tau {} has no discriminator '{discriminator}'",
                tau.candidate.id
            ))
        })?;
        keyed.push((iso, p));
    }
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    *pairs = keyed.into_iter().map(|(_, p)| p).collect();
    Ok(())
}

/// Selects one dilepton pair per event.
pub struct PairSelector {
    name: String,
    channel: Channel,
    config: PairSelectorConfig,
    tau_modes: BTreeSet<i32>,
    histos: Option<HistoSet>,
}

impl PairSelector {
    /// New selector for `channel`.
    pub fn new(name: impl Into<String>, channel: Channel, config: PairSelectorConfig) -> Self {
        Self { name: name.into(), channel, config, tau_modes: BTreeSet::new(), histos: None }
    }

    /// Book diagnostic histograms in `pre_analysis`.
    ///
    /// The histogram directory is the instance name.
    pub fn with_histograms(mut self) -> Self {
        self.histos = Some(HistoSet::new(self.name.clone()));
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &PairSelectorConfig {
        &self.config
    }

    /// Parsed allowed decay modes (empty before `pre_analysis` or when unrestricted).
    pub fn tau_modes(&self) -> &BTreeSet<i32> {
        &self.tau_modes
    }

    fn choose(&mut self, event: &TreeEvent) -> Result<Option<CompositeCandidate>> {
        let cfg = &self.config;
        let pairs = event.pairs(&cfg.pair_label)?;

        let mut os: Vec<&CompositeCandidate> = pairs.iter().filter(|p| p.opposite_sign()).collect();
        let mut ss: Vec<&CompositeCandidate> = pairs.iter().filter(|p| p.same_sign()).collect();

        if let Some(h) = self.histos.as_mut() {
            let wt = event.event_info(&cfg.event_info_label)?.total_weight();
            h.fill_2d("n_pairs", os.len() as f64, ss.len() as f64, wt)?;
        }

        rank_by_pt(&mut os);
        rank_by_pt(&mut ss);
        if cfg.use_most_isolated && self.channel != Channel::Em {
            rank_by_isolation(&mut os, &cfg.isolation_discriminator, &cfg.pair_label)?;
            rank_by_isolation(&mut ss, &cfg.isolation_discriminator, &cfg.pair_label)?;
        }

        Ok(os.first().or(ss.first()).map(|p| (*p).clone()))
    }

    fn take_pair_met(&self, event: &mut TreeEvent, pair: &CompositeCandidate) -> Result<()> {
        let cfg = &self.config;
        let id = pair_id(pair.lepton1.id(), pair.lepton2.id());
        let met = event
            .met_map(&cfg.met_vector_label)?
            .get(&id)
            .cloned()
            .ok_or(Error::MissingMet { id })?;
        event.add(cfg.met_label.clone(), Product::Met(met));
        Ok(())
    }

    fn scale_met(&self, event: &mut TreeEvent, pair: &CompositeCandidate) -> Result<()> {
        let cfg = &self.config;
        let (leg, scale) = if self.channel.has_hadronic_tau() {
            let tau = pair.lepton2.as_tau().ok_or_else(|| Error::ProductType {
                label: cfg.pair_label.clone(),
                expected: "tau",
                found: pair.lepton2.kind(),
            })?;
            let mut scale = cfg.tau_scale;
            if event.exists(&cfg.tau_scales_label) {
                let id = tau.candidate.id;
                scale = *event
                    .scales(&cfg.tau_scales_label)?
                    .get(&id)
                    .ok_or(Error::MissingScale { id })?;
            }
            (tau.candidate.vector, scale)
        } else {
            let elec = pair.lepton1.as_electron().ok_or_else(|| Error::ProductType {
                label: cfg.pair_label.clone(),
                expected: "electron",
                found: pair.lepton1.kind(),
            })?;
            (elec.candidate.vector, cfg.tau_scale)
        };
        let met = event.met_mut(&cfg.met_label)?;
        shift_met_for_scale(met, &leg, scale)
    }

    fn fake_tau_rejects(&self, event: &TreeEvent, pair: &CompositeCandidate) -> Result<bool> {
        let cfg = &self.config;
        let sel: Vec<&htt_core::GenParticle> = event
            .gen_particles(&cfg.gen_particles_label)?
            .iter()
            .filter(|p| matches!(p.pdgid.abs(), 11 | 13) && p.pt() > FAKE_LEPTON_MIN_PT)
            .collect();
        let reco = std::slice::from_ref(pair.lepton2.vector());
        let matches = match_by_dr(reco, &sel, TRUTH_MATCH_DR, true, true);
        Ok(cfg.faked_tau_selector.rejects(!matches.is_empty()))
    }

    fn hadronic_tau_rejects(
        &mut self,
        event: &TreeEvent,
        pair: &CompositeCandidate,
    ) -> Result<bool> {
        let particles = event.gen_particles(&self.config.gen_taus_label)?;
        let gen_taus: Vec<GenJet> = build_tau_jets(particles, false)
            .into_iter()
            .filter(|j| min_pt_max_eta(&j.vector, GEN_TAU_MIN_PT, 999.0))
            .collect();
        let reco = pair.lepton2.vector();
        let best = match_by_dr(std::slice::from_ref(reco), &gen_taus, TRUTH_MATCH_DR, true, true)
            .first()
            .map(|&(_, j)| j);
        if let (Some(h), Some(j)) = (self.histos.as_mut(), best) {
            h.fill_2d("pt_gen_reco", gen_taus[j].vector.pt, reco.pt, 1.0)?;
        }
        Ok(self.config.hadronic_tau_selector.rejects(best.is_some()))
    }
}

impl AnalysisModule for PairSelector {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_analysis(&mut self) -> Result<()> {
        let cfg = &self.config;
        if !cfg.tau_scale.is_finite() || cfg.tau_scale <= 0.0 {
            return Err(Error::Config(format!("tau_scale must be positive, got {}", cfg.tau_scale)));
        }
        self.tau_modes = parse_tau_modes(&cfg.allowed_tau_modes)?;
        let allowed = if self.tau_modes.is_empty() {
            "all modes".to_string()
        } else {
            self.tau_modes.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" ")
        };

        tracing::info!(
            module = %self.name,
            channel = %self.channel,
            pair_label = %cfg.pair_label,
            met_label = %cfg.met_label,
            mva_met_from_vector = cfg.mva_met_from_vector,
            use_most_isolated = cfg.use_most_isolated,
            scale_met_for_tau = cfg.scale_met_for_tau,
            tau_scale = cfg.tau_scale,
            allowed_tau_modes = %allowed,
            faked_tau_selector = ?cfg.faked_tau_selector,
            hadronic_tau_selector = ?cfg.hadronic_tau_selector,
            gen_taus_label = %cfg.gen_taus_label,
            "pair selector configured"
        );

        if let Some(h) = self.histos.as_mut() {
            h.create_2d("n_pairs", 4, -0.5, 3.5, 4, -0.5, 3.5)?;
            h.create_2d("pt_gen_reco", 50, 0.0, 100.0, 50, 0.0, 100.0)?;
        }
        Ok(())
    }

    fn execute(&mut self, event: &mut TreeEvent) -> Result<Status> {
        let Some(pair) = self.choose(event)? else {
            return Ok(Status::Reject);
        };

        if self.config.mva_met_from_vector {
            self.take_pair_met(event, &pair)?;
        }
        if self.config.scale_met_for_tau {
            self.scale_met(event, &pair)?;
        }

        if self.channel.has_hadronic_tau() {
            if self.config.faked_tau_selector != TruthSelection::Off
                && self.fake_tau_rejects(event, &pair)?
            {
                return Ok(Status::Reject);
            }
            if self.config.hadronic_tau_selector != TruthSelection::Off
                && self.hadronic_tau_rejects(event, &pair)?
            {
                return Ok(Status::Reject);
            }
        }

        if let Some(tau) = pair.lepton2.as_tau()
            && !self.tau_modes.is_empty()
            && !self.tau_modes.contains(&tau.decay_mode)
        {
            return Ok(Status::Reject);
        }

        *event.pairs_mut(&self.config.pair_label)? = vec![pair];
        Ok(Status::Accept)
    }

    fn histograms(&self) -> Option<&HistoSet> {
        self.histos.as_ref()
    }
}
