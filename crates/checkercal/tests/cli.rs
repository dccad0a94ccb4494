mod common;

use assert_cmd::Command;
use checkercal::store;
use common::{rendered_frame, within};
use predicates::prelude::*;

fn checkercal() -> Command {
    Command::cargo_bin("checkercal").unwrap()
}

#[test]
fn pattern_prints_row_major_points() {
    let out = checkercal()
        .args(["pattern", "--cols", "3", "--rows", "2", "--square", "0.5"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let points: Vec<[f64; 3]> = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(points.len(), 6);
    assert_eq!(points[1], [0.5, 0.0, 0.0]);
    assert_eq!(points[4], [0.5, 0.5, 0.0]);
}

#[test]
fn pattern_rejects_degenerate_grid() {
    checkercal()
        .args(["pattern", "--cols", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 2x2"));
}

#[test]
fn log_level_flag_accepts_level_names() {
    checkercal()
        .args(["--log-level", "debug", "pattern", "--cols", "3", "--rows", "2"])
        .assert()
        .success();
    checkercal()
        .args(["pattern", "--log-level", "OFF"])
        .assert()
        .success();
    checkercal()
        .args(["--log-level", "loud", "pattern"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'loud'"));
}

#[test]
fn show_prints_stored_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam.yml");
    let cal = store::StoredCalibration {
        camera_matrix: nalgebra::Matrix3::new(700.0, 0.0, 330.0, 0.0, 701.0, 250.0, 0.0, 0.0, 1.0),
        distortion_coefficients: vec![-0.2, 0.05, 0.0, 0.0, 0.0],
    };
    std::fs::write(&path, store::to_document(&cal).unwrap()).unwrap();

    checkercal()
        .arg("show")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("camera_matrix"))
        .stdout(predicate::str::contains("700.000000"))
        .stdout(predicate::str::contains("distortion_coefficients: [-0.2, 0.05"));
}

#[test]
fn missing_source_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    checkercal()
        .arg("run")
        .arg(dir.path().join("nope"))
        .arg("--auto-confirm")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unavailable"));
}

#[test]
fn directory_replay_needs_a_signal_source() {
    let dir = tempfile::tempdir().unwrap();
    rendered_frame(0).save(dir.path().join("000.png")).unwrap();
    checkercal()
        .arg("run")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--auto-confirm"));
}

#[cfg(not(feature = "opencv"))]
#[test]
fn camera_source_needs_opencv_feature() {
    checkercal()
        .args(["run", "camera:0", "--auto-confirm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("opencv"));
}

#[test]
fn run_calibrates_image_directory() {
    let frames = tempfile::tempdir().unwrap();
    for k in 0..6 {
        rendered_frame(k)
            .save(frames.path().join(format!("view_{k:02}.png")))
            .unwrap();
    }
    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("camera_calibration.yml");
    let overlay = out_dir.path().join("overlay");

    checkercal()
        .arg("run")
        .arg(frames.path())
        .args(["--auto-confirm", "--min-frames", "6", "--log-level", "warn"])
        .arg("--output")
        .arg(&output)
        .arg("--overlay-dir")
        .arg(&overlay)
        .assert()
        .success()
        .stdout(predicate::str::contains("captured: 6"))
        .stdout(predicate::str::contains("Calibrated"));

    let cal = store::load(&output).unwrap();
    assert!(within(cal.camera_matrix[(0, 0)], 600.0, 0.03));
    assert!(within(cal.camera_matrix[(1, 1)], 600.0, 0.03));
    assert_eq!(cal.distortion_coefficients.len(), 5);
    assert!(overlay.join("frame_00000.png").exists());
}

#[test]
fn config_file_is_overridden_by_flags() {
    let frames = tempfile::tempdir().unwrap();
    for k in 0..3 {
        rendered_frame(k)
            .save(frames.path().join(format!("view_{k:02}.png")))
            .unwrap();
    }
    let out_dir = tempfile::tempdir().unwrap();
    let config = out_dir.path().join("config.json");
    let output = out_dir.path().join("calib.yml");
    // 11x8 in the file would never match; the flags restore 9x6
    std::fs::write(
        &config,
        r#"{ "grid": { "cols": 11, "rows": 8 }, "session": { "min_required": 3 } }"#,
    )
    .unwrap();
    let signals = out_dir.path().join("signals.txt");
    std::fs::write(&signals, "confirm\nconfirm\nconfirm\n").unwrap();

    checkercal()
        .arg("run")
        .arg(frames.path())
        .arg("--config")
        .arg(&config)
        .args(["--cols", "9", "--rows", "6"])
        .arg("--signals")
        .arg(&signals)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("captured: 3"));

    assert!(output.exists());
}
