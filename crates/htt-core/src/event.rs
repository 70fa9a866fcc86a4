//! Per-event store of named, typed products.
//!
//! Upstream producers populate a [`TreeEvent`] once per event; downstream
//! modules read products by label and may overwrite them. Every product is
//! one variant of [`Product`], so typed access is a variant check rather than
//! a runtime cast.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::objects::{
    CompositeCandidate, Electron, EventInfo, GenJet, GenParticle, Met, Muon, PFJet, RecoMuon, Tau,
    Vertex,
};

/// A single named entry in the event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    /// Dilepton candidates.
    Pairs(Vec<CompositeCandidate>),
    /// Electrons.
    Electrons(Vec<Electron>),
    /// Analysis muons.
    Muons(Vec<Muon>),
    /// Taus.
    Taus(Vec<Tau>),
    /// Particle-flow jets.
    Jets(Vec<PFJet>),
    /// Generator particles.
    GenParticles(Vec<GenParticle>),
    /// Generator jets.
    GenJets(Vec<GenJet>),
    /// Detector-level muons.
    RecoMuons(Vec<RecoMuon>),
    /// Primary vertices.
    Vertices(Vec<Vertex>),
    /// A single MET object.
    Met(Met),
    /// MET objects keyed by the id of the object (or pair) they were built for.
    MetMap(HashMap<u64, Met>),
    /// Per-object scale factors keyed by object id.
    Scales(HashMap<u64, f64>),
    /// Event bookkeeping.
    EventInfo(EventInfo),
    /// A single number.
    Scalar(f64),
}

impl Product {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Product::Pairs(_) => "pairs",
            Product::Electrons(_) => "electrons",
            Product::Muons(_) => "muons",
            Product::Taus(_) => "taus",
            Product::Jets(_) => "jets",
            Product::GenParticles(_) => "gen_particles",
            Product::GenJets(_) => "gen_jets",
            Product::RecoMuons(_) => "reco_muons",
            Product::Vertices(_) => "vertices",
            Product::Met(_) => "met",
            Product::MetMap(_) => "met_map",
            Product::Scales(_) => "scales",
            Product::EventInfo(_) => "event_info",
            Product::Scalar(_) => "scalar",
        }
    }
}

/// The mutable event record handed to every module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeEvent {
    #[serde(default)]
    products: BTreeMap<String, Product>,
}

macro_rules! product_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $kind:literal) => {
        #[doc = concat!("Borrow the `", $kind, "` product stored under `label`.")]
        pub fn $get(&self, label: &str) -> Result<&$ty> {
            match self.product(label)? {
                Product::$variant(v) => Ok(v),
                other => Err(Error::ProductType {
                    label: label.to_string(),
                    expected: $kind,
                    found: other.kind(),
                }),
            }
        }

        #[doc = concat!("Mutably borrow the `", $kind, "` product stored under `label`.")]
        pub fn $get_mut(&mut self, label: &str) -> Result<&mut $ty> {
            let product = self
                .products
                .get_mut(label)
                .ok_or_else(|| Error::MissingProduct { label: label.to_string() })?;
            match product {
                Product::$variant(v) => Ok(v),
                other => Err(Error::ProductType {
                    label: label.to_string(),
                    expected: $kind,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl TreeEvent {
    /// Empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `product` under `label`, replacing any previous entry.
    pub fn add(&mut self, label: impl Into<String>, product: Product) {
        self.products.insert(label.into(), product);
    }

    /// Whether a product named `label` exists.
    pub fn exists(&self, label: &str) -> bool {
        self.products.contains_key(label)
    }

    /// Remove and return the product under `label`.
    pub fn remove(&mut self, label: &str) -> Option<Product> {
        self.products.remove(label)
    }

    /// Untyped access.
    pub fn product(&self, label: &str) -> Result<&Product> {
        self.products.get(label).ok_or_else(|| Error::MissingProduct { label: label.to_string() })
    }

    /// Labels currently stored, in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.products.keys().map(String::as_str)
    }

    product_accessors!(pairs, pairs_mut, Pairs, Vec<CompositeCandidate>, "pairs");
    product_accessors!(electrons, electrons_mut, Electrons, Vec<Electron>, "electrons");
    product_accessors!(muons, muons_mut, Muons, Vec<Muon>, "muons");
    product_accessors!(taus, taus_mut, Taus, Vec<Tau>, "taus");
    product_accessors!(jets, jets_mut, Jets, Vec<PFJet>, "jets");
    product_accessors!(
        gen_particles,
        gen_particles_mut,
        GenParticles,
        Vec<GenParticle>,
        "gen_particles"
    );
    product_accessors!(gen_jets, gen_jets_mut, GenJets, Vec<GenJet>, "gen_jets");
    product_accessors!(reco_muons, reco_muons_mut, RecoMuons, Vec<RecoMuon>, "reco_muons");
    product_accessors!(vertices, vertices_mut, Vertices, Vec<Vertex>, "vertices");
    product_accessors!(met, met_mut, Met, Met, "met");
    product_accessors!(met_map, met_map_mut, MetMap, HashMap<u64, Met>, "met_map");
    product_accessors!(scales, scales_mut, Scales, HashMap<u64, f64>, "scales");
    product_accessors!(event_info, event_info_mut, EventInfo, EventInfo, "event_info");
    product_accessors!(scalar, scalar_mut, Scalar, f64, "scalar");
}
