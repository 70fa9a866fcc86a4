use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use htt_core::{
    Candidate, CompositeCandidate, EventInfo, Lepton, LorentzVector, Met, Muon, Product, Tau,
    TreeEvent,
};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_htt"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("htt_cli_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn pair(id: u64, pt1: f64, q1: i32, pt2: f64, q2: i32) -> CompositeCandidate {
    let mu = Lepton::Muon(Muon {
        candidate: Candidate::new(id, LorentzVector::massless(pt1, 0.2, 0.0), q1),
        ..Default::default()
    });
    let tau = Lepton::Tau(Tau {
        candidate: Candidate::new(id + 1, LorentzVector::massless(pt2, -0.6, 2.9), q2),
        decay_mode: 1,
        ..Default::default()
    });
    CompositeCandidate::new(mu, tau)
}

fn event(pairs: Vec<CompositeCandidate>) -> TreeEvent {
    let mut e = TreeEvent::new();
    e.add("emtauCandidates", Product::Pairs(pairs));
    e.add(
        "pfMVAMet",
        Product::Met(Met { vector: LorentzVector::massless(15.0, 0.0, 1.0), ..Default::default() }),
    );
    e.add("pfJetsPFlow", Product::Jets(vec![]));
    e.add("eventInfo", Product::EventInfo(EventInfo { good_vertices: 9, ..Default::default() }));
    e
}

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let config = dir.join("sequence.yaml");
    std::fs::write(
        &config,
        r#"channel: mt
histograms: true
modules:
  - type: pair_selector
    options:
      mva_met_from_vector: false
  - type: categories
"#,
    )
    .unwrap();

    let events = [
        event(vec![pair(1, 50.0, 1, 45.0, -1), pair(3, 70.0, -1, 50.0, 1)]),
        event(vec![]),
    ];
    let mut text = String::new();
    for e in &events {
        text.push_str(&serde_json::to_string(e).unwrap());
        text.push_str("\n\n");
    }
    let input = dir.join("events.jsonl");
    std::fs::write(&input, text).unwrap();
    (config, input)
}

#[test]
fn run_writes_accepted_events_histograms_and_summary() {
    let dir = tmp_dir("run");
    let (config, input) = write_inputs(&dir);
    let output = dir.join("accepted.jsonl");
    let histos = dir.join("histos.json");
    let summary = dir.join("summary.json");

    let out = run(&[
        "run",
        "--config",
        config.to_str().unwrap(),
        "--input",
        input.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
        "--histos",
        histos.to_str().unwrap(),
        "--summary",
        summary.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let accepted = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = accepted.lines().collect();
    assert_eq!(lines.len(), 1);
    let kept: TreeEvent = serde_json::from_str(lines[0]).unwrap();
    let pairs = kept.pairs("emtauCandidates").unwrap();
    assert_eq!(pairs.len(), 1);
    assert!((pairs[0].scalar_pt_sum() - 120.0).abs() < 1e-9);

    let h: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&histos).unwrap()).unwrap();
    assert!(h.get("httpairselector").is_some());
    assert!(h.get("httcategories").is_some());

    let s: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(s["processed"], 2);
    assert_eq!(s["accepted"], 1);
    assert_eq!(s["modules"][0]["name"], "httpairselector");
    assert_eq!(s["modules"][0]["rejected"], 1);
    assert_eq!(s["modules"][1]["accepted"], 1);
}

#[test]
fn run_writes_one_histogram_set_per_named_instance() {
    let dir = tmp_dir("named");
    let (_, input) = write_inputs(&dir);
    let config = dir.join("two_selectors.yaml");
    std::fs::write(
        &config,
        r#"channel: mt
histograms: true
modules:
  - type: pair_selector
    name: sel_a
    options:
      mva_met_from_vector: false
  - type: pair_selector
    name: sel_b
    options:
      mva_met_from_vector: false
"#,
    )
    .unwrap();
    let histos = dir.join("histos.json");

    let out = run(&[
        "run",
        "-c",
        config.to_str().unwrap(),
        "-i",
        input.to_str().unwrap(),
        "-o",
        dir.join("accepted.jsonl").to_str().unwrap(),
        "--histos",
        histos.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let h: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&histos).unwrap()).unwrap();
    let sets = h.as_object().unwrap();
    assert_eq!(sets.len(), 2);
    assert!(sets.contains_key("sel_a"));
    assert!(sets.contains_key("sel_b"));
}

#[test]
fn run_rejects_duplicate_module_names() {
    let dir = tmp_dir("duplicate");
    let (_, input) = write_inputs(&dir);
    let config = dir.join("duplicate.yaml");
    std::fs::write(&config, "modules:\n  - type: categories\n  - type: categories\n").unwrap();

    let out = run(&["run", "-c", config.to_str().unwrap(), "-i", input.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("duplicate module name"), "stderr={stderr}");
}

#[test]
fn run_streams_to_stdout_by_default() {
    let dir = tmp_dir("stdout");
    let (config, input) = write_inputs(&dir);

    let out = run(&[
        "--log-level",
        "info",
        "run",
        "-c",
        config.to_str().unwrap(),
        "-i",
        input.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1);
    let _: TreeEvent = serde_json::from_str(stdout.trim()).unwrap();
}

#[test]
fn run_fails_on_malformed_event() {
    let dir = tmp_dir("malformed");
    let (config, _) = write_inputs(&dir);
    let input = dir.join("bad.jsonl");
    std::fs::write(&input, "{\"products\": 3}\n").unwrap();

    let out = run(&["run", "-c", config.to_str().unwrap(), "-i", input.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid event"), "stderr={stderr}");
}

#[test]
fn show_config_fills_defaults() {
    let dir = tmp_dir("show_config");
    let (config, _) = write_inputs(&dir);

    let out = run(&["show-config", "--config", config.to_str().unwrap()]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["channel"], "mt");
    assert_eq!(v["modules"][0]["type"], "pair_selector");
    assert_eq!(v["modules"][0]["options"]["pair_label"], "emtauCandidates");
    assert_eq!(v["modules"][0]["options"]["mva_met_from_vector"], false);
    assert_eq!(v["modules"][1]["options"]["pzeta_alpha"], 0.85);
}

#[test]
fn show_config_rejects_unknown_option() {
    let dir = tmp_dir("bad_config");
    let config = dir.join("bad.yaml");
    std::fs::write(&config, "modules:\n  - type: z_decay\n    options:\n      flavor: 11\n")
        .unwrap();

    let out = run(&["show-config", "-c", config.to_str().unwrap()]);
    assert!(!out.status.success());
}
