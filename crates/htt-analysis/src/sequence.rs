//! Ordered module sequences and their configuration file.
//!
//! A sequence file is YAML (JSON is accepted as well):
//!
//! ```yaml
//! channel: et
//! histograms: true
//! modules:
//!   - type: pair_selector
//!     options:
//!       use_most_isolated: true
//!   - type: categories
//!     name: cats
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use htt_core::{AnalysisModule, Error, HistoSet, Result, Status, TreeEvent};

use crate::categories::{Categories, CategoriesConfig};
use crate::channel::Channel;
use crate::jet_met::{JetMetConfig, JetMetModifier};
use crate::muon_producer::{MuonProducer, MuonProducerConfig};
use crate::pair_selector::{PairSelector, PairSelectorConfig};
use crate::z_decay::{ZDecayConfig, ZDecayFilter};

/// Top-level sequence file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequenceConfig {
    /// Final state analysed.
    pub channel: Channel,
    /// Book diagnostic histograms in the modules that have them.
    pub histograms: bool,
    /// Modules in execution order.
    pub modules: Vec<ModuleConfig>,
}

/// One module entry, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleConfig {
    /// [`PairSelector`].
    PairSelector {
        /// Instance name.
        #[serde(default)]
        name: Option<String>,
        /// Module options.
        #[serde(default)]
        options: PairSelectorConfig,
    },
    /// [`ZDecayFilter`].
    ZDecay {
        /// Instance name.
        #[serde(default)]
        name: Option<String>,
        /// Module options.
        #[serde(default)]
        options: ZDecayConfig,
    },
    /// [`JetMetModifier`].
    JetMet {
        /// Instance name.
        #[serde(default)]
        name: Option<String>,
        /// Module options.
        #[serde(default)]
        options: JetMetConfig,
    },
    /// [`Categories`].
    Categories {
        /// Instance name.
        #[serde(default)]
        name: Option<String>,
        /// Module options.
        #[serde(default)]
        options: CategoriesConfig,
    },
    /// [`MuonProducer`].
    MuonProducer {
        /// Instance name.
        #[serde(default)]
        name: Option<String>,
        /// Module options.
        #[serde(default)]
        options: MuonProducerConfig,
    },
}

impl ModuleConfig {
    /// Instantiate the module.
    pub fn build(&self, channel: Channel, histograms: bool) -> Box<dyn AnalysisModule> {
        fn pick(name: &Option<String>, default: &str) -> String {
            name.clone().unwrap_or_else(|| default.to_string())
        }
        match self {
            ModuleConfig::PairSelector { name, options } => {
                let m = PairSelector::new(pick(name, "httpairselector"), channel, options.clone());
                if histograms { Box::new(m.with_histograms()) } else { Box::new(m) }
            }
            ModuleConfig::ZDecay { name, options } => {
                Box::new(ZDecayFilter::new(pick(name, "zdecayfilter"), options.clone()))
            }
            ModuleConfig::JetMet { name, options } => {
                let m = JetMetModifier::new(pick(name, "jetmetmodifier"), options.clone());
                if histograms { Box::new(m.with_histograms()) } else { Box::new(m) }
            }
            ModuleConfig::Categories { name, options } => {
                let m = Categories::new(pick(name, "httcategories"), channel, options.clone());
                if histograms { Box::new(m.with_histograms()) } else { Box::new(m) }
            }
            ModuleConfig::MuonProducer { name, options } => {
                Box::new(MuonProducer::new(pick(name, "muonproducer"), options.clone()))
            }
        }
    }
}

impl SequenceConfig {
    /// Parse a YAML or JSON document.
    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml_ng::from_str(text).map_err(|e| Error::Config(format!("sequence file: {e}")))
    }

    /// Read and parse a sequence file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// Per-module event counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleCounts {
    /// Events the module accepted.
    pub accepted: u64,
    /// Events the module rejected.
    pub rejected: u64,
}

/// Runs modules in order, stopping at the first rejection.
pub struct Sequence {
    modules: Vec<Box<dyn AnalysisModule>>,
    counts: Vec<ModuleCounts>,
    processed: u64,
}

impl Sequence {
    /// Sequence over already-built modules.
    pub fn new(modules: Vec<Box<dyn AnalysisModule>>) -> Self {
        let counts = vec![ModuleCounts::default(); modules.len()];
        Self { modules, counts, processed: 0 }
    }

    /// Build every module listed in `config`.
    pub fn from_config(config: &SequenceConfig) -> Self {
        Self::new(
            config.modules.iter().map(|m| m.build(config.channel, config.histograms)).collect(),
        )
    }

    /// Module names in execution order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Counters, aligned with [`Sequence::module_names`].
    pub fn counts(&self) -> &[ModuleCounts] {
        &self.counts
    }

    /// Events passed to [`Sequence::process`].
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Run `pre_analysis` on every module.
    ///
    /// Module names must be unique; they label counters and histogram directories.
    pub fn pre_analysis(&mut self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for name in self.module_names() {
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate module name '{name}'")));
            }
        }
        for m in &mut self.modules {
            m.pre_analysis()?;
            m.print_info();
        }
        tracing::debug!(modules = self.modules.len(), "sequence ready");
        Ok(())
    }

    /// Process one event.
    pub fn process(&mut self, event: &mut TreeEvent) -> Result<Status> {
        self.processed += 1;
        for (m, counts) in self.modules.iter_mut().zip(&mut self.counts) {
            match m.execute(event)? {
                Status::Accept => counts.accepted += 1,
                Status::Reject => {
                    counts.rejected += 1;
                    return Ok(Status::Reject);
                }
            }
        }
        Ok(Status::Accept)
    }

    /// Run `post_analysis` on every module and log the counters.
    pub fn post_analysis(&mut self) -> Result<()> {
        for (m, counts) in self.modules.iter_mut().zip(&self.counts) {
            m.post_analysis()?;
            tracing::info!(
                module = %m.name(),
                accepted = counts.accepted,
                rejected = counts.rejected,
                "module counts"
            );
        }
        tracing::info!(processed = self.processed, "sequence finished");
        Ok(())
    }

    /// Histogram sets of all modules that booked any.
    pub fn histograms(&self) -> Vec<&HistoSet> {
        self.modules.iter().filter_map(|m| m.histograms()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        status: Status,
        calls: usize,
    }

    impl AnalysisModule for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn execute(&mut self, _event: &mut TreeEvent) -> Result<Status> {
            self.calls += 1;
            Ok(self.status)
        }
    }

    #[test]
    fn test_stops_at_first_reject() {
        let mut seq = Sequence::new(vec![
            Box::new(Fixed { name: "a", status: Status::Accept, calls: 0 }),
            Box::new(Fixed { name: "b", status: Status::Reject, calls: 0 }),
            Box::new(Fixed { name: "c", status: Status::Accept, calls: 0 }),
        ]);
        seq.pre_analysis().unwrap();
        let mut event = TreeEvent::new();
        assert_eq!(seq.process(&mut event).unwrap(), Status::Reject);
        assert_eq!(seq.process(&mut event).unwrap(), Status::Reject);
        seq.post_analysis().unwrap();

        assert_eq!(seq.module_names(), vec!["a", "b", "c"]);
        assert_eq!(seq.counts()[0], ModuleCounts { accepted: 2, rejected: 0 });
        assert_eq!(seq.counts()[1], ModuleCounts { accepted: 0, rejected: 2 });
        assert_eq!(seq.counts()[2], ModuleCounts::default());
        assert_eq!(seq.processed(), 2);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let cfg = SequenceConfig::parse(
            "histograms: true\nmodules:\n  - type: pair_selector\n  - type: pair_selector\n",
        )
        .unwrap();
        let mut seq = Sequence::from_config(&cfg);
        assert!(matches!(seq.pre_analysis(), Err(Error::Config(_))));

        let cfg = SequenceConfig::parse(
            "histograms: true\nmodules:\n  - type: pair_selector\n    name: sel_a\n  \
             - type: pair_selector\n    name: sel_b\n",
        )
        .unwrap();
        let mut seq = Sequence::from_config(&cfg);
        seq.pre_analysis().unwrap();
        let dirs: Vec<&str> = seq.histograms().into_iter().map(|h| h.directory.as_str()).collect();
        assert_eq!(dirs, vec!["sel_a", "sel_b"]);
    }

    #[test]
    fn test_parse_yaml() {
        let cfg = SequenceConfig::parse(
            r#"
channel: mt
histograms: true
modules:
  - type: pair_selector
    options:
      use_most_isolated: true
      allowed_tau_modes: "0,1,10"
  - type: z_decay
    name: zmm
  - type: categories
"#,
        )
        .unwrap();
        assert_eq!(cfg.channel, Channel::Mt);
        assert!(cfg.histograms);
        assert_eq!(cfg.modules.len(), 3);
        match &cfg.modules[0] {
            ModuleConfig::PairSelector { name, options } => {
                assert!(name.is_none());
                assert!(options.use_most_isolated);
                assert_eq!(options.allowed_tau_modes, "0,1,10");
            }
            other => panic!("unexpected module {other:?}"),
        }

        let seq = Sequence::from_config(&cfg);
        assert_eq!(seq.module_names(), vec!["httpairselector", "zmm", "httcategories"]);
    }

    #[test]
    fn test_defaults_survive_json_round_trip() {
        let cfg = SequenceConfig::parse("modules:\n  - type: jet_met\n").unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"type\":\"jet_met\""));
        assert!(json.contains("\"input_label\":\"pfJetsPFlow\""));
        assert_eq!(SequenceConfig::parse(&json).unwrap(), cfg);
    }

    #[test]
    fn test_parse_json_and_rejects_unknown_keys() {
        let cfg = SequenceConfig::parse(r#"{"modules": [{"type": "muon_producer"}]}"#).unwrap();
        assert_eq!(cfg.channel, Channel::Et);
        assert_eq!(cfg.modules.len(), 1);

        let err = SequenceConfig::parse(
            "modules:\n  - type: pair_selector\n    options:\n      bogus: 1\n",
        );
        assert!(matches!(err, Err(Error::Config(_))));
        let err = SequenceConfig::parse("modules:\n  - type: nope\n");
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
