use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use assert_cmd::Command;
use tempfile::tempdir;

// Fast sim config: the item lands 50 ms after each zero and settles 100 ms later.
fn write_config(dir: &Path, label: &str) -> PathBuf {
    let images = dir.join("images");
    let toml = format!(
        r#"
[scale]
place_threshold_g = 4.0
settle_ms = 100

[lights]
flash_interval_ms = 20
wave_interval_ms = 20
indication_ms = 50

[camera]
image_dir = "{}"

[shutdown]
join_timeout_ms = 200

[simulation]
item_g = 42.0
place_after_ms = 50
label = "{label}"
"#,
        images.display().to_string().replace('\\', "/")
    );
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn sorter(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sorter").unwrap();
    cmd.arg("--config").arg(cfg).env_remove("RUST_LOG");
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK", "stdout")]
#[case(&["run", "--cycles", "1", "--no-prompt"], 0, "Waste belongs in recycling.", "stdout")]
#[case(&["run", "--cycles", "x"], 2, "invalid value", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "plastic");

    let assert = sorter(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case("paper", "Waste belongs in compost.")]
#[case("trash", "Waste belongs in trash.")]
fn run_reports_the_bin_for_the_label(#[case] label: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), label);

    sorter(&cfg)
        .args(["run", "--cycles", "1", "--no-prompt"])
        .assert()
        .success()
        .stdout(predicate::str::contains(needle))
        .stdout(predicate::str::contains("probability"));
    assert!(dir.path().join("images").join("pi_image_001.jpg").exists());
}

#[rstest]
fn run_ends_on_stdin_eof() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "plastic");

    sorter(&cfg)
        .arg("run")
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Waste belongs in recycling.").count(1));
}

#[rstest]
fn unmapped_label_exits_with_its_own_code() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "styrofoam");

    sorter(&cfg)
        .args(["run", "--cycles", "1", "--no-prompt"])
        .assert()
        .code(6)
        .stdout(predicate::str::contains("Cycle failed"))
        .stderr(predicate::str::contains("[categories]"));
}

#[rstest]
fn missing_config_is_a_config_error() {
    let dir = tempdir().unwrap();
    sorter(&dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration is invalid or unreadable"));
}

#[rstest]
fn invalid_config_value_is_a_config_error() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[scale]\nplace_threshold_g = 0.0\n").unwrap();

    sorter(&cfg)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("place_threshold_g"));
}

#[rstest]
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "plastic");

    let bad_csv = dir.path().join("calib.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "raw,value").unwrap();
    writeln!(f, "122930,0.0").unwrap();
    writeln!(f, "120530,100.0").unwrap();

    sorter(&cfg)
        .arg("--calibration")
        .arg(&bad_csv)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn classify_maps_an_existing_image() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "glass");
    let image = dir.path().join("bottle.jpg");
    fs::write(&image, b"not really a jpeg").unwrap();

    sorter(&cfg)
        .arg("classify")
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("Waste belongs in recycling."));
}

#[rstest]
fn classify_missing_image_is_a_classifier_error() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "glass");

    sorter(&cfg)
        .arg("classify")
        .arg(dir.path().join("missing.jpg"))
        .assert()
        .code(5);
}

#[rstest]
fn capture_saves_one_photo_per_enter() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "plastic");

    sorter(&cfg)
        .arg("capture")
        .write_stdin("\n\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved").count(2))
        .stdout(predicate::str::contains("pi_image_002.jpg"));
    assert!(!dir.path().join("images").join("pi_image_003.jpg").exists());
}
