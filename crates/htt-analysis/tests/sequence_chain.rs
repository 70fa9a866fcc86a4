use approx::assert_relative_eq;
use std::collections::HashMap;

use htt_analysis::{Sequence, SequenceConfig};
use htt_core::{
    Candidate, CompositeCandidate, EventInfo, Lepton, LorentzVector, Met, Muon, PFJet, Product,
    Status, Tau, TreeEvent, pair_id,
};

fn muon(id: u64, pt: f64, charge: i32) -> Lepton {
    Lepton::Muon(Muon {
        candidate: Candidate::new(id, LorentzVector::massless(pt, 0.1, 0.0), charge),
        ..Default::default()
    })
}

fn tau(id: u64, pt: f64, charge: i32, decay_mode: i32) -> Lepton {
    Lepton::Tau(Tau {
        candidate: Candidate::new(id, LorentzVector::massless(pt, -0.3, 2.8), charge),
        decay_mode,
        ..Default::default()
    })
}

/// Two opposite-sign pairs with scalar pT sums 120 and 95 GeV, plus one
/// harder same-sign pair that must be ignored.
fn event(decay_mode: i32) -> TreeEvent {
    let pairs = vec![
        CompositeCandidate::new(muon(1, 50.0, 1), tau(2, 45.0, -1, decay_mode)),
        CompositeCandidate::new(muon(3, 70.0, -1), tau(4, 50.0, 1, decay_mode)),
        CompositeCandidate::new(muon(5, 90.0, 1), tau(6, 60.0, 1, decay_mode)),
    ];
    let mut mets = HashMap::new();
    for (k, (a, b)) in [(1, 2), (3, 4), (5, 6)].into_iter().enumerate() {
        let met = Met {
            id: k as u64,
            vector: LorentzVector::massless(10.0 * (k + 1) as f64, 0.0, 1.0),
            sum_et: 300.0,
        };
        mets.insert(pair_id(a, b), met);
    }

    let mut e = TreeEvent::new();
    e.add("emtauCandidates", Product::Pairs(pairs));
    e.add("pfMVAMetVector", Product::MetMap(mets));
    e.add(
        "pfJetsPFlow",
        Product::Jets(vec![PFJet {
            candidate: Candidate::new(10, LorentzVector::massless(45.0, 2.0, -1.5), 0),
            btag: 0.1,
            pu_id: true,
        }]),
    );
    e.add("eventInfo", Product::EventInfo(EventInfo { good_vertices: 15, ..Default::default() }));
    e
}

const CONFIG: &str = r#"
channel: mt
histograms: true
modules:
  - type: pair_selector
    options:
      allowed_tau_modes: "0,1,10"
  - type: categories
"#;

#[test]
fn selector_then_categories() {
    let cfg = SequenceConfig::parse(CONFIG).unwrap();
    let mut seq = Sequence::from_config(&cfg);
    seq.pre_analysis().unwrap();

    let mut accepted = event(1);
    assert_eq!(seq.process(&mut accepted).unwrap(), Status::Accept);
    let kept = accepted.pairs("emtauCandidates").unwrap();
    assert_eq!(kept.len(), 1);
    assert_relative_eq!(kept[0].scalar_pt_sum(), 120.0);
    // MET of the (3, 4) pair
    assert_relative_eq!(accepted.met("pfMVAMet").unwrap().vector.pt, 20.0);

    let mut rejected = event(5);
    assert_eq!(seq.process(&mut rejected).unwrap(), Status::Reject);
    assert_eq!(rejected.pairs("emtauCandidates").unwrap().len(), 3);

    seq.post_analysis().unwrap();
    assert_eq!(seq.processed(), 2);
    assert_eq!(seq.counts()[0].accepted, 1);
    assert_eq!(seq.counts()[0].rejected, 1);
    assert_eq!(seq.counts()[1].accepted, 1);

    let histos = seq.histograms();
    assert_eq!(histos.len(), 2);
    let n_pairs = histos[0].get_2d("n_pairs").unwrap();
    // two OS and one SS pair in both events
    assert_relative_eq!(n_pairs.bin_content(2, 1), 2.0);
}

#[test]
fn missing_pair_met_aborts_the_run() {
    let cfg = SequenceConfig::parse(CONFIG).unwrap();
    let mut seq = Sequence::from_config(&cfg);
    seq.pre_analysis().unwrap();

    let mut e = event(0);
    e.remove("pfMVAMetVector");
    assert!(seq.process(&mut e).is_err());
}
