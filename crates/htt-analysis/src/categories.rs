//! Event categorisation for the di-tau analysis.
//!
//! Computes the standard event properties from the selected pair, the MET
//! and the jets, decides which selections and categories the event falls
//! into, and accumulates weighted yields plus mass and control plots per
//! (selection, category).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use htt_core::{
    AnalysisModule, Error, HistoSet, LorentzVector, PFJet, Result, Status, TreeEvent, delta_phi,
};

use crate::channel::Channel;

/// Selections evaluated for every event.
pub const SELECTIONS: [&str; 6] = ["os", "ss", "os_sel", "ss_sel", "os_con", "ss_con"];
/// Categories evaluated for every event.
pub const CATEGORIES: [&str; 7] =
    ["inclusive", "vbf", "1jet_high", "1jet_low", "0jet_high", "0jet_low", "btag"];

/// Options of [`Categories`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoriesConfig {
    /// Selected pair collection (one entry).
    pub ditau_label: String,
    /// MET object.
    pub met_label: String,
    /// Jet collection.
    pub jets_label: String,
    /// Event bookkeeping product.
    pub event_info_label: String,
    /// Optional scalar product holding the SVfit mass.
    pub svfit_label: String,
    /// Coefficient of the visible term in `pzeta`.
    pub pzeta_alpha: f64,
    /// Upper transverse-mass cut of the signal selection.
    pub mt_max_selection: f64,
    /// Lower transverse-mass cut of the control selection.
    pub mt_min_control: f64,
    /// Lower `pzeta` cut of the signal selection in the em channel.
    pub pzeta_min_selection: f64,
    /// Upper `pzeta` cut of the control selection in the em channel.
    pub pzeta_max_control: f64,
    /// b-tag discriminant threshold.
    pub bjet_discriminant: f64,
    /// Second-leg pT separating the high and low categories.
    pub high_pt_2: f64,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            ditau_label: "emtauCandidates".into(),
            met_label: "pfMVAMet".into(),
            jets_label: "pfJetsPFlow".into(),
            event_info_label: "eventInfo".into(),
            svfit_label: "svfitMass".into(),
            pzeta_alpha: 0.85,
            mt_max_selection: 20.0,
            mt_min_control: 70.0,
            pzeta_min_selection: -20.0,
            pzeta_max_control: -40.0,
            bjet_discriminant: 0.679,
            high_pt_2: 40.0,
        }
    }
}

/// Per-event quantities used for categorisation and plotting.
///
/// Jet quantities that need more jets than the event has are `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventProperties {
    /// Opposite-sign pair.
    pub os: bool,
    /// Total event weight.
    pub wt: f64,
    /// Good reconstructed vertices.
    pub n_vtx: u32,
    /// SVfit di-tau mass, when available.
    pub m_sv: Option<f64>,
    /// Visible di-tau mass.
    pub m_vis: f64,
    /// Transverse mass of the first leg and the MET.
    pub mt_1: f64,
    /// Bisector-projected MET balance.
    pub pzeta: f64,
    /// First-leg pT.
    pub pt_1: f64,
    /// Second-leg pT.
    pub pt_2: f64,
    /// First-leg eta.
    pub eta_1: f64,
    /// Second-leg eta.
    pub eta_2: f64,
    /// MET magnitude.
    pub met: f64,
    /// MET azimuth.
    pub met_phi: f64,
    /// Jets with pT > 30.
    pub n_jets: usize,
    /// Jets with 20 < pT <= 30.
    pub n_lowpt_jets: usize,
    /// b-tagged jets.
    pub n_bjets: usize,
    /// Jets between the two leading jets in eta.
    pub n_jetsingap: Option<usize>,
    /// Leading jet pT.
    pub jpt_1: Option<f64>,
    /// Subleading jet pT.
    pub jpt_2: Option<f64>,
    /// Leading jet eta.
    pub jeta_1: Option<f64>,
    /// Subleading jet eta.
    pub jeta_2: Option<f64>,
    /// Leading b-jet pT.
    pub bpt_1: Option<f64>,
    /// Leading b-jet eta.
    pub beta_1: Option<f64>,
    /// Dijet mass of the two leading jets.
    pub mjj: Option<f64>,
    /// Eta separation of the two leading jets.
    pub jdeta: Option<f64>,
}

/// Transverse mass of a leg and the MET.
pub fn transverse_mass(leg: &LorentzVector, met: &LorentzVector) -> f64 {
    let dphi = delta_phi(leg.phi, met.phi);
    (2.0 * leg.pt * met.pt * (1.0 - dphi.cos())).max(0.0).sqrt()
}

/// `pzeta_miss - alpha * pzeta_vis` along the bisector of the two legs.
///
/// Back-to-back legs have no bisector; the result is then 0.
pub fn pzeta(l1: &LorentzVector, l2: &LorentzVector, met: &LorentzVector, alpha: f64) -> f64 {
    let zx = l1.phi.cos() + l2.phi.cos();
    let zy = l1.phi.sin() + l2.phi.sin();
    let norm = zx.hypot(zy);
    if norm <= f64::EPSILON {
        return 0.0;
    }
    let (zx, zy) = (zx / norm, zy / norm);
    let vis = (l1.px() + l2.px()) * zx + (l1.py() + l2.py()) * zy;
    let miss = met.px() * zx + met.py() * zy;
    miss - alpha * vis
}

/// Categorises events and fills yields and plots.
pub struct Categories {
    name: String,
    channel: Channel,
    config: CategoriesConfig,
    props: EventProperties,
    selections: BTreeMap<&'static str, bool>,
    categories: BTreeMap<&'static str, bool>,
    yields: BTreeMap<String, f64>,
    histos: Option<HistoSet>,
}

impl Categories {
    /// New categoriser.
    pub fn new(name: impl Into<String>, channel: Channel, config: CategoriesConfig) -> Self {
        Self {
            name: name.into(),
            channel,
            config,
            props: EventProperties::default(),
            selections: SELECTIONS.iter().map(|s| (*s, false)).collect(),
            categories: CATEGORIES.iter().map(|c| (*c, false)).collect(),
            yields: BTreeMap::new(),
            histos: None,
        }
    }

    /// Book mass and control plots in `pre_analysis`.
    ///
    /// The histogram directory is the instance name.
    pub fn with_histograms(mut self) -> Self {
        self.histos = Some(HistoSet::new(self.name.clone()));
        self
    }

    /// Properties of the last processed event.
    pub fn properties(&self) -> &EventProperties {
        &self.props
    }

    /// Whether the last event passed `category`.
    pub fn passes_category(&self, category: &str) -> bool {
        self.categories.get(category).copied().unwrap_or(false)
    }

    /// Whether the last event passed `selection`.
    pub fn passes_selection(&self, selection: &str) -> bool {
        self.selections.get(selection).copied().unwrap_or(false)
    }

    /// Weighted yields keyed by `selection/category`.
    pub fn yields(&self) -> &BTreeMap<String, f64> {
        &self.yields
    }

    fn reset(&mut self) {
        self.props = EventProperties::default();
        self.selections.values_mut().for_each(|v| *v = false);
        self.categories.values_mut().for_each(|v| *v = false);
    }

    fn compute_properties(&mut self, event: &TreeEvent) -> Result<()> {
        let cfg = &self.config;
        let pair = event
            .pairs(&cfg.ditau_label)?
            .first()
            .ok_or_else(|| Error::Validation(format!("no pair in '{}'", cfg.ditau_label)))?;
        let met = event.met(&cfg.met_label)?.vector;
        let info = event.event_info(&cfg.event_info_label)?;
        let l1 = *pair.lepton1.vector();
        let l2 = *pair.lepton2.vector();

        let p = &mut self.props;
        p.os = pair.opposite_sign();
        p.wt = info.total_weight();
        p.n_vtx = info.good_vertices;
        p.m_sv = if event.exists(&cfg.svfit_label) {
            Some(*event.scalar(&cfg.svfit_label)?)
        } else {
            None
        };
        p.m_vis = pair.vector().mass();
        p.mt_1 = transverse_mass(&l1, &met);
        p.pzeta = pzeta(&l1, &l2, &met, cfg.pzeta_alpha);
        p.pt_1 = l1.pt;
        p.pt_2 = l2.pt;
        p.eta_1 = l1.eta;
        p.eta_2 = l2.eta;
        p.met = met.pt;
        p.met_phi = met.phi;

        let clean = |j: &&PFJet| {
            j.pu_id
                && j.candidate.vector.delta_r(&l1) > 0.5
                && j.candidate.vector.delta_r(&l2) > 0.5
        };
        let mut all: Vec<&PFJet> = event.jets(&cfg.jets_label)?.iter().filter(clean).collect();
        all.sort_by(|a, b| b.candidate.pt().total_cmp(&a.candidate.pt()));

        let central = |j: &&PFJet| j.candidate.eta().abs() < 4.7;
        let jets: Vec<&PFJet> =
            all.iter().copied().filter(central).filter(|j| j.candidate.pt() > 30.0).collect();
        let lowpt = all
            .iter()
            .copied()
            .filter(central)
            .filter(|j| j.candidate.pt() > 20.0 && j.candidate.pt() <= 30.0)
            .count();
        let bjets: Vec<&PFJet> = all
            .iter()
            .copied()
            .filter(|j| {
                j.candidate.pt() > 20.0
                    && j.candidate.eta().abs() < 2.4
                    && j.btag > cfg.bjet_discriminant
            })
            .collect();

        p.n_jets = jets.len();
        p.n_lowpt_jets = lowpt;
        p.n_bjets = bjets.len();
        p.jpt_1 = jets.first().map(|j| j.candidate.pt());
        p.jeta_1 = jets.first().map(|j| j.candidate.eta());
        p.jpt_2 = jets.get(1).map(|j| j.candidate.pt());
        p.jeta_2 = jets.get(1).map(|j| j.candidate.eta());
        p.bpt_1 = bjets.first().map(|j| j.candidate.pt());
        p.beta_1 = bjets.first().map(|j| j.candidate.eta());
        if let [j1, j2, rest @ ..] = jets.as_slice() {
            let (e1, e2) = (j1.candidate.eta(), j2.candidate.eta());
            let (lo, hi) = if e1 < e2 { (e1, e2) } else { (e2, e1) };
            p.mjj = Some((j1.candidate.vector + j2.candidate.vector).mass());
            p.jdeta = Some(hi - lo);
            let in_gap = |j: &&&PFJet| j.candidate.eta() > lo && j.candidate.eta() < hi;
            p.n_jetsingap = Some(rest.iter().filter(in_gap).count());
        }
        Ok(())
    }

    fn decide(&mut self) {
        let p = &self.props;
        let cfg = &self.config;
        let sel = |os: bool| p.os == os;
        // em has no tau leg; its regions are defined in pzeta
        let (signal, control) = if self.channel == Channel::Em {
            (p.pzeta > cfg.pzeta_min_selection, p.pzeta < cfg.pzeta_max_control)
        } else {
            (p.mt_1 < cfg.mt_max_selection, p.mt_1 > cfg.mt_min_control)
        };
        let decisions = [
            ("os", sel(true)),
            ("ss", sel(false)),
            ("os_sel", sel(true) && signal),
            ("ss_sel", sel(false) && signal),
            ("os_con", sel(true) && control),
            ("ss_con", sel(false) && control),
        ];
        for (name, pass) in decisions {
            self.selections.insert(name, pass);
        }

        let vbf = p.n_jets >= 2
            && p.mjj.unwrap_or(0.0) > 500.0
            && p.jdeta.unwrap_or(0.0) > 3.5
            && p.n_jetsingap == Some(0);
        let high = p.pt_2 > cfg.high_pt_2;
        let categories = [
            ("inclusive", true),
            ("vbf", vbf),
            ("1jet_high", p.n_jets >= 1 && !vbf && p.n_bjets == 0 && high),
            ("1jet_low", p.n_jets >= 1 && !vbf && p.n_bjets == 0 && !high),
            ("0jet_high", p.n_jets == 0 && p.n_bjets == 0 && high),
            ("0jet_low", p.n_jets == 0 && p.n_bjets == 0 && !high),
            ("btag", p.n_jets <= 1 && p.n_bjets >= 1),
        ];
        for (name, pass) in categories {
            self.categories.insert(name, pass);
        }
    }

    fn fill(&mut self) -> Result<()> {
        let p = &self.props;
        for (sel, _) in self.selections.iter().filter(|(_, pass)| **pass) {
            for (cat, _) in self.categories.iter().filter(|(_, pass)| **pass) {
                *self.yields.entry(format!("{sel}/{cat}")).or_insert(0.0) += p.wt;
                if let Some(h) = self.histos.as_mut() {
                    let key = |v: &str| format!("{sel}/{cat}/{v}");
                    h.fill_1d(&key("m_vis"), p.m_vis, p.wt)?;
                    if let Some(m_sv) = p.m_sv {
                        h.fill_1d(&key("m_sv"), m_sv, p.wt)?;
                    }
                    h.fill_1d(&key("pt_1"), p.pt_1, p.wt)?;
                    h.fill_1d(&key("pt_2"), p.pt_2, p.wt)?;
                    h.fill_1d(&key("eta_1"), p.eta_1, p.wt)?;
                    h.fill_1d(&key("eta_2"), p.eta_2, p.wt)?;
                    h.fill_1d(&key("met"), p.met, p.wt)?;
                    h.fill_1d(&key("n_jets"), p.n_jets as f64, p.wt)?;
                    h.fill_1d(&key("n_vtx"), p.n_vtx as f64, p.wt)?;
                }
            }
        }
        Ok(())
    }
}

impl AnalysisModule for Categories {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_analysis(&mut self) -> Result<()> {
        let cfg = &self.config;
        tracing::info!(
            module = %self.name,
            channel = %self.channel,
            ditau_label = %cfg.ditau_label,
            met_label = %cfg.met_label,
            jets_label = %cfg.jets_label,
            pzeta_alpha = cfg.pzeta_alpha,
            mt_max_selection = cfg.mt_max_selection,
            mt_min_control = cfg.mt_min_control,
            pzeta_min_selection = cfg.pzeta_min_selection,
            pzeta_max_control = cfg.pzeta_max_control,
            "categories configured"
        );
        if let Some(h) = self.histos.as_mut() {
            for sel in SELECTIONS {
                for cat in CATEGORIES {
                    let key = |v: &str| format!("{sel}/{cat}/{v}");
                    h.create_1d(&key("m_vis"), 100, 0.0, 500.0)?;
                    h.create_1d(&key("m_sv"), 100, 0.0, 500.0)?;
                    h.create_1d(&key("pt_1"), 50, 0.0, 100.0)?;
                    h.create_1d(&key("pt_2"), 50, 0.0, 100.0)?;
                    h.create_1d(&key("eta_1"), 30, -3.0, 3.0)?;
                    h.create_1d(&key("eta_2"), 30, -3.0, 3.0)?;
                    h.create_1d(&key("met"), 50, 0.0, 100.0)?;
                    h.create_1d(&key("n_jets"), 10, -0.5, 9.5)?;
                    h.create_1d(&key("n_vtx"), 50, -0.5, 49.5)?;
                }
            }
        }
        Ok(())
    }

    fn execute(&mut self, event: &mut TreeEvent) -> Result<Status> {
        self.reset();
        self.compute_properties(event)?;
        self.decide();
        self.fill()?;
        Ok(Status::Accept)
    }

    fn post_analysis(&mut self) -> Result<()> {
        for (key, y) in &self.yields {
            tracing::info!(module = %self.name, region = %key, yield_ = *y, "category yield");
        }
        Ok(())
    }

    fn histograms(&self) -> Option<&HistoSet> {
        self.histos.as_ref()
    }
}
