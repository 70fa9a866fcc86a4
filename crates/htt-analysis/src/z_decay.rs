//! Generator-level Z decay-flavour filter.

use serde::{Deserialize, Serialize};

use htt_core::{AnalysisModule, Error, Result, Status, TreeEvent};

/// Options of [`ZDecayFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZDecayConfig {
    /// |PDG id| of the decay products to select (11-16).
    pub flavour: u32,
    /// Lower edge of the dilepton mass window (GeV).
    pub min_mll: f64,
    /// Upper edge of the dilepton mass window (GeV).
    pub max_mll: f64,
    /// Generator particle collection.
    pub gen_particles_label: String,
}

impl Default for ZDecayConfig {
    fn default() -> Self {
        Self {
            flavour: 13,
            min_mll: 60.0,
            max_mll: 120.0,
            gen_particles_label: "genParticles".into(),
        }
    }
}

/// Keeps events where the hard-process Z decays to the configured flavour
/// with a dilepton mass inside the window.
pub struct ZDecayFilter {
    name: String,
    config: ZDecayConfig,
    count_status3: u64,
    passed: u64,
}

impl ZDecayFilter {
    /// New filter.
    pub fn new(name: impl Into<String>, config: ZDecayConfig) -> Self {
        Self { name: name.into(), config, count_status3: 0, passed: 0 }
    }

    /// Events that contained a status-3 pair of the requested flavour.
    pub fn count_status3(&self) -> u64 {
        self.count_status3
    }

    /// Events inside the mass window.
    pub fn passed(&self) -> u64 {
        self.passed
    }
}

impl AnalysisModule for ZDecayFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_analysis(&mut self) -> Result<()> {
        let cfg = &self.config;
        if !(11..=16).contains(&cfg.flavour) {
            return Err(Error::Config(format!(
                "flavour must be a lepton PDG id (11-16), got {}",
                cfg.flavour
            )));
        }
        if cfg.min_mll >= cfg.max_mll {
            return Err(Error::Config(format!(
                "empty mass window [{}, {}]",
                cfg.min_mll, cfg.max_mll
            )));
        }
        tracing::info!(
            module = %self.name,
            flavour = cfg.flavour,
            min_mll = cfg.min_mll,
            max_mll = cfg.max_mll,
            "Z decay filter configured"
        );
        Ok(())
    }

    fn execute(&mut self, event: &mut TreeEvent) -> Result<Status> {
        let flavour = self.config.flavour as i32;
        let particles = event.gen_particles(&self.config.gen_particles_label)?;
        let leptons: Vec<_> =
            particles.iter().filter(|p| p.status == 3 && p.pdgid.abs() == flavour).collect();

        let particle = leptons.iter().filter(|p| p.pdgid > 0).collect::<Vec<_>>();
        let anti = leptons.iter().filter(|p| p.pdgid < 0).collect::<Vec<_>>();
        let (&[p1], &[p2]) = (particle.as_slice(), anti.as_slice()) else {
            return Ok(Status::Reject);
        };
        self.count_status3 += 1;

        let mll = (p1.vector + p2.vector).mass();
        if mll < self.config.min_mll || mll > self.config.max_mll {
            return Ok(Status::Reject);
        }
        self.passed += 1;
        Ok(Status::Accept)
    }

    fn post_analysis(&mut self) -> Result<()> {
        tracing::info!(
            module = %self.name,
            count_status3 = self.count_status3,
            passed = self.passed,
            "Z decay filter summary"
        );
        Ok(())
    }
}
