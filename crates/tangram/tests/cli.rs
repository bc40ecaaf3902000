use assert_cmd::Command;
use predicates::str::contains;
use serde_json::{json, Value};
use std::path::Path;

fn cmd() -> Command {
    Command::cargo_bin("tangram").expect("tangram binary")
}

fn square_at(x: f64, y: f64) -> Value {
    json!({
        "label": "tangram_square",
        "translation": [x, y],
        "rotation_deg": 0.0,
        "vertices": [
            [x - 50.0, y - 50.0],
            [x + 50.0, y - 50.0],
            [x + 50.0, y + 50.0],
            [x - 50.0, y + 50.0]
        ],
        "stable_id": "sq",
        "confidence": 0.9
    })
}

fn write_inputs(dir: &Path) {
    let config = json!({
        "targets": [{
            "id": "target-square",
            "piece_type": "square",
            "pose": { "position": [3.0, 2.0], "rotation": 0.0 }
        }]
    });
    std::fs::write(dir.join("config.json"), config.to_string()).expect("config");

    let mut frames = vec![json!({ "timestamp": 0.0, "objects": [square_at(100.0, 200.0)] })];
    for t in [0.25, 0.5, 0.75, 1.0] {
        frames.push(json!({ "timestamp": t, "objects": [square_at(300.0, 200.0)] }));
    }
    std::fs::write(dir.join("frames.json"), Value::from(frames).to_string()).expect("frames");
}

#[test]
fn run_validates_a_placed_square() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_inputs(dir.path());
    let out = dir.path().join("report.json");

    cmd()
        .arg("run")
        .arg("--config")
        .arg(dir.path().join("config.json"))
        .arg("--frames")
        .arg(dir.path().join("frames.json"))
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("complete=true validated=1/1"));

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&out).expect("report")).expect("json");
    assert_eq!(report["complete"], true);
    assert_eq!(report["frames"].as_array().map(Vec::len), Some(5));
    assert_eq!(report["frames"][0]["state"]["scale"], 100.0);
}

#[test]
fn run_reports_incomplete_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_inputs(dir.path());
    std::fs::write(
        dir.path().join("frames.json"),
        json!([{ "timestamp": 0.0, "objects": [square_at(100.0, 200.0)] }]).to_string(),
    )
    .expect("frames");

    cmd()
        .args(["run", "--config"])
        .arg(dir.path().join("config.json"))
        .arg("--frames")
        .arg(dir.path().join("frames.json"))
        .assert()
        .success()
        .stdout(contains("complete=false validated=0/1"));
}

#[test]
fn run_fails_on_missing_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    cmd()
        .args(["run", "--config"])
        .arg(dir.path().join("missing.json"))
        .arg("--frames")
        .arg(dir.path().join("frames.json"))
        .assert()
        .failure();
}

#[test]
fn labels_writes_a_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let labels = dir.path().join("labels.txt");
    std::fs::write(&labels, "# one square\n5 0.1 0.1 0.3 0.1 0.3 0.3 0.1 0.3\n").expect("labels");
    let out = dir.path().join("frame.json");

    cmd()
        .arg("labels")
        .arg("--labels")
        .arg(&labels)
        .args(["--width", "1000", "--height", "500", "--out"])
        .arg(&out)
        .assert()
        .success();

    let frame: Value =
        serde_json::from_str(&std::fs::read_to_string(&out).expect("frame")).expect("json");
    let object = &frame["objects"][0];
    assert_eq!(object["label"], "tangram_square");
    assert_eq!(object["translation"], json!([200.0, 100.0]));
}

#[test]
fn labels_prints_to_stdout_without_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let labels = dir.path().join("labels.txt");
    std::fs::write(&labels, "5 0.1 0.1 0.3 0.1 0.3 0.3 0.1 0.3\n").expect("labels");

    cmd()
        .arg("labels")
        .arg("--labels")
        .arg(&labels)
        .args(["--width", "640", "--height", "480"])
        .assert()
        .success()
        .stdout(contains("tangram_square"));
}

#[test]
fn labels_reports_the_bad_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let labels = dir.path().join("labels.txt");
    std::fs::write(
        &labels,
        "5 0.1 0.1 0.3 0.1 0.3 0.3 0.1 0.3\n5 0.1 0.1 1.5 0.1 0.3 0.3\n",
    )
    .expect("labels");

    cmd()
        .arg("labels")
        .arg("--labels")
        .arg(&labels)
        .args(["--width", "640", "--height", "480"])
        .assert()
        .failure()
        .stderr(contains("line: 2"));
}
