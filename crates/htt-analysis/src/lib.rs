//! # htt-analysis
//!
//! Per-event modules of the H→ττ analysis: dilepton pair disambiguation,
//! generator-level Z filtering, jet energy corrections propagated to MET,
//! event categorisation and muon production, plus the [`Sequence`] runner
//! that chains them.
//!
//! ## Example
//!
//! ```
//! use htt_analysis::{Channel, PairSelector, PairSelectorConfig};
//! use htt_core::{AnalysisModule, Status, TreeEvent};
//!
//! let mut selector = PairSelector::new("pairs", Channel::Et, PairSelectorConfig::default());
//! selector.pre_analysis().unwrap();
//! // no pair collection in the event
//! assert!(selector.execute(&mut TreeEvent::new()).is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod categories;
pub mod channel;
pub mod jec;
pub mod jet_met;
pub mod matching;
pub mod muon_producer;
pub mod pair_selector;
pub mod sequence;
pub mod z_decay;

pub use categories::{Categories, CategoriesConfig, EventProperties};
pub use channel::Channel;
pub use jec::JetCorrectionUncertainty;
pub use jet_met::{JetMetConfig, JetMetModifier};
pub use muon_producer::{MuonProducer, MuonProducerConfig};
pub use pair_selector::{PairSelector, PairSelectorConfig, TruthSelection};
pub use sequence::{ModuleConfig, ModuleCounts, Sequence, SequenceConfig};
pub use z_decay::{ZDecayConfig, ZDecayFilter};
