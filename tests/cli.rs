use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

const MODEL: &str = r#"
n_features = 2
unique_times = [1.0, 5.0, 10.0]

[[trees]]
nodes = [
    { kind = "split", feature = 0, threshold = 50.0, left = 1, right = 2 },
    { kind = "leaf", survival = [0.99, 0.95, 0.90] },
    { kind = "leaf", survival = [0.95, 0.80, 0.70] },
]

[[trees]]
nodes = [
    { kind = "split", feature = 1, threshold = 0.5, left = 1, right = 2 },
    { kind = "leaf", survival = [0.99, 0.96, 0.90] },
    { kind = "leaf", survival = [0.90, 0.70, 0.60] },
]
"#;

const FEATURES: &str = "features = [\"Age\", \"AIDS_Yes\"]\n";

fn write_artifacts(dir: &Path) {
    fs::write(dir.join("rsf_model.toml"), MODEL).expect("write model");
    fs::write(dir.join("model_features.toml"), FEATURES).expect("write features");
}

fn cardiorisk(dir: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_cardiorisk");
    Command::new(exe)
        .current_dir(dir)
        .env_remove("CARDIORISK_ARTIFACT_DIR")
        .env_remove("CARDIORISK_MODEL_URL")
        .env_remove("CARDIORISK_FEATURES_URL")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("run cardiorisk cli")
}

#[test]
fn predict_reports_risk_and_writes_outputs() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path());

    let output = cardiorisk(
        tmp.path(),
        &[
            "predict",
            "--age",
            "60",
            "--select",
            "AIDS=Yes",
            "--curve-table",
            "curve.tsv",
        ],
    );
    assert!(output.status.success(), "CLI exited with {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Estimated 5-year cardiovascular event risk: 25.00%"),
        "unexpected output: {stdout}"
    );

    let svg = fs::read_to_string(tmp.path().join("survival_curve.svg")).expect("plot written");
    assert!(svg.contains("<svg"));
    let table = fs::read_to_string(tmp.path().join("curve.tsv")).expect("table written");
    assert!(table.starts_with("time_years\tsurvival\n"));
}

#[test]
fn predict_reads_patient_file_and_flags_override_it() {
    let tmp = tempdir().expect("temporary directory");
    let artifacts = tmp.path().join("artifacts");
    fs::create_dir(&artifacts).expect("artifact directory");
    write_artifacts(&artifacts);
    fs::write(tmp.path().join("patient.toml"), "Age = 30\nAIDS = \"Yes\"\n").expect("patient");

    let output = cardiorisk(
        tmp.path(),
        &[
            "--artifact-dir",
            artifacts.to_str().expect("path str"),
            "predict",
            "--patient",
            "patient.toml",
            "--select",
            "AIDS=No",
            "--no-plot",
        ],
    );
    assert!(output.status.success(), "CLI exited with {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Age 30 without AIDS: S(5) = (0.95 + 0.96) / 2.
    assert!(stdout.contains("risk: 4.50%"), "unexpected output: {stdout}");
    assert!(!tmp.path().join("survival_curve.svg").exists());
}

#[test]
fn out_of_range_age_is_rejected() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path());

    let output = cardiorisk(tmp.path(), &["predict", "--age", "130", "--no-plot"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn unknown_option_is_rejected_before_loading_artifacts() {
    let tmp = tempdir().expect("temporary directory");

    let output = cardiorisk(tmp.path(), &["predict", "--select", "AIDS=Maybe", "--no-plot"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'Maybe' is not an option for 'AIDS'"), "unexpected stderr: {stderr}");
}

#[test]
fn missing_artifacts_without_remote_fail_cleanly() {
    let tmp = tempdir().expect("temporary directory");

    let output = cardiorisk(tmp.path(), &["predict", "--no-plot"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unavailable"), "unexpected stderr: {stderr}");
    assert!(stderr.contains("CARDIORISK_MODEL_URL"), "unexpected stderr: {stderr}");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("risk"));
}

#[test]
fn fields_lists_every_variable() {
    let tmp = tempdir().expect("temporary directory");

    let output = cardiorisk(tmp.path(), &["fields"]);
    assert!(output.status.success(), "CLI exited with {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["Age", "Triglyceride_HDL_Ratio", "Viral_Load", "≥ 100.000 copies/ml", "Diabetes"] {
        assert!(stdout.contains(name), "{name} missing from: {stdout}");
    }
}

#[test]
fn help_explains_how_to_configure_artifact_remotes() {
    let tmp = tempdir().expect("temporary directory");

    for command in ["fetch", "predict"] {
        let output = cardiorisk(tmp.path(), &[command, "--help"]);
        assert!(output.status.success(), "CLI exited with {output:?}");
        let stdout = String::from_utf8_lossy(&output.stdout);
        for needle in ["model_url", "CARDIORISK_MODEL_URL", "CARDIORISK_FEATURES_URL"] {
            assert!(stdout.contains(needle), "{needle} missing from {command} help: {stdout}");
        }
    }
}
