//! # htt-core
//!
//! Event record, physics object model and histogram sink shared by the HTT
//! analysis modules.
//!
//! ## Example
//!
//! ```
//! use htt_core::{LorentzVector, Met, Product, TreeEvent};
//!
//! let mut event = TreeEvent::new();
//! event.add("pfMet", Product::Met(Met {
//!     id: 0,
//!     vector: LorentzVector::massless(35.0, 0.0, 1.2),
//!     sum_et: 400.0,
//! }));
//! assert_eq!(event.met("pfMet").unwrap().vector.pt, 35.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod hash;
pub mod histo;
pub mod objects;
pub mod traits;
pub mod vector;

pub use error::{Error, Result};
pub use event::{Product, TreeEvent};
pub use hash::{hash_combine, label_hash, pair_id};
pub use histo::{Axis, Hist1D, Hist2D, Histo, HistoSet};
pub use objects::{
    Candidate, CompositeCandidate, Electron, EventInfo, GenJet, GenParticle, Lepton, Met, Muon,
    PFJet, RecoMuon, Tau, Vertex,
};
pub use traits::{AnalysisModule, Status};
pub use vector::{LorentzVector, delta_phi, delta_r};
