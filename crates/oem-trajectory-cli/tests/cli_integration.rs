use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

const SAT_A: &str = "\
CCSDS_OEM_VERS = 2.0
META_START
OBJECT_NAME = SAT-A
META_STOP
2024-01-01T00:00:00 5950.9 3729.9 662.9 1.0 2.0 3.0
2024-01-01T00:01:00 6000.0 3700.0 700.0 1.1 2.1 3.1
COVARIANCE_START
2024-01-01T00:00:00 9 9 9 9 9 9
";

const SAT_B: &str = "\
bad line
2024-01-01T00:02:00 6050.0 3650.0 710.0 1.2 2.2 3.2
2024-01-01T00:03:00 1 2 NaN 4 5 6
";

const HEADER_ONLY: &str = "META_START\nOBJECT_NAME = SAT-C\nMETA_STOP\n";

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{now}", std::process::id()));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn fixture_dir(prefix: &str) -> PathBuf {
    let dir = unique_temp_dir(prefix);
    for (name, body) in [("a.oem", SAT_A), ("b.oem", SAT_B), ("c.oem", HEADER_ONLY)] {
        fs::write(dir.join(name), body)
            .unwrap_or_else(|err| panic!("failed to write fixture {name}: {err}"));
    }
    fs::write(dir.join("readme.txt"), "not an ephemeris")
        .unwrap_or_else(|err| panic!("failed to write readme fixture: {err}"));
    dir
}

fn run_oemtraj<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_oemtraj"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute oemtraj binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_oemtraj(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "oemtraj command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_array<'a>(value: &'a Value, key: &str) -> &'a Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing array field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

#[test]
fn list_reports_sorted_oem_files() {
    let dir = fixture_dir("oemtraj-list");
    let value = run_json(["--dir", path_str(&dir), "list"]);

    assert_eq!(value.get("contract_version").and_then(Value::as_str), Some("cli.v1"));
    assert_eq!(value.get("files"), Some(&serde_json::json!(["a.oem", "b.oem", "c.oem"])));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn load_directory_combines_sources_in_listing_order() {
    let dir = fixture_dir("oemtraj-load");
    let value = run_json(["--dir", path_str(&dir), "load"]);

    assert_eq!(value.get("contract_version").and_then(Value::as_str), Some("cli.v1"));
    assert_eq!(as_u64(&value, "sources_processed"), 3);
    assert_eq!(as_u64(&value, "total_records"), 3);
    assert_eq!(as_u64(&value, "empty_sources"), 1);
    assert_eq!(as_u64(&value, "failed_sources"), 0);

    let statuses = as_array(&value, "outcomes")
        .iter()
        .map(|outcome| outcome.get("status").and_then(Value::as_str).unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(statuses, vec!["loaded", "loaded", "empty"]);

    let epochs = as_array(&value, "trajectory")
        .iter()
        .map(|record| record.get("epoch").and_then(Value::as_str).unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(
        epochs,
        vec!["2024-01-01T00:00:00", "2024-01-01T00:01:00", "2024-01-01T00:02:00"]
    );
    assert_eq!(as_array(&value, "preview").len(), 3);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn load_explicit_files_records_missing_file_and_continues() {
    let dir = fixture_dir("oemtraj-files");
    let missing = dir.join("missing.oem");
    let value = run_json([
        "load",
        "--positions-only",
        "--preview",
        "1",
        "--file",
        path_str(&missing),
        "--file",
        path_str(&dir.join("b.oem")),
    ]);

    assert_eq!(as_u64(&value, "failed_sources"), 1);
    assert_eq!(as_u64(&value, "total_records"), 1);
    let outcomes = as_array(&value, "outcomes");
    assert_eq!(outcomes[0].get("status").and_then(Value::as_str), Some("failed"));
    assert!(outcomes[0].get("error").and_then(Value::as_str).is_some());
    assert_eq!(value.get("positions"), Some(&serde_json::json!([[6050.0, 3650.0, 710.0]])));
    assert_eq!(value.get("preview"), Some(&serde_json::json!([[6050.0, 3650.0, 710.0]])));
    assert!(value.get("trajectory").is_none());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn load_writes_combined_trajectory_file() {
    let dir = fixture_dir("oemtraj-out");
    let out = dir.join("processed_telemetry.json");
    let value = run_json(["--dir", path_str(&dir), "load", "--out", path_str(&out)]);
    assert_eq!(value.get("written_to").and_then(Value::as_str), Some(path_str(&out)));

    let body = fs::read_to_string(&out)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", out.display()));
    let written: Value = serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("written trajectory is not JSON: {err}"));
    assert_eq!(value.get("trajectory"), Some(&written));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn parse_reports_skipped_lines_and_covariance_marker() {
    let dir = fixture_dir("oemtraj-parse");
    let value = run_json(["parse", "--file", path_str(&dir.join("b.oem"))]);

    assert_eq!(value.get("contract_version").and_then(Value::as_str), Some("cli.v1"));
    assert_eq!(as_u64(&value, "record_count"), 1);
    assert_eq!(value.get("covariance_line"), Some(&Value::Null));
    assert_eq!(
        value.get("skipped"),
        Some(&serde_json::json!([
            { "line_number": 1, "reason": { "kind": "too_few_fields", "found": 2 } },
            { "line_number": 3, "reason": { "kind": "non_finite", "field": "z" } }
        ]))
    );

    let value = run_json(["parse", "--file", path_str(&dir.join("a.oem"))]);
    assert_eq!(as_u64(&value, "record_count"), 2);
    assert_eq!(as_u64(&value, "covariance_line"), 7);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn load_fails_loudly_when_directory_is_missing() {
    let dir = unique_temp_dir("oemtraj-missing");
    let output = run_oemtraj(["--dir", path_str(&dir.join("nope")), "load"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to list"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn load_rejects_file_paths_that_are_not_utf8() {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStrExt;

    let dir = fixture_dir("oemtraj-non-utf8");
    let bad = dir.join(OsStr::from_bytes(b"bad\xff.oem"));
    let args: Vec<OsString> = vec!["load".into(), "--file".into(), bad.into_os_string()];
    let output = run_oemtraj(args);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty(), "nothing should be emitted on stdout");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not valid UTF-8"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}
