#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TIMELINE: &str = r#"[
  {"startTime": "2024-03-01T10:00:00.000-05:00",
   "timelinePath": [
     {"point": "geo:40.7580,-73.9855", "durationMinutesOffsetFromStartTime": "0"},
     {"point": "geo:39.9526,-75.1652", "durationMinutesOffsetFromStartTime": "120"}
   ]},
  {"startTime": "2024-03-02T09:00:00.000-05:00",
   "timelinePath": [
     {"point": "geo:40.7580,-73.9855", "durationMinutesOffsetFromStartTime": "15"}
   ]},
  {"startTime": "2024-03-02T12:00:00.000-05:00", "endTime": "2024-03-02T13:00:00.000-05:00"}
]"#;

const REFERENCES: &str = "\
- state: NY
  lat: 40.75
  lon: -73.99
- state: PA
  lat: 39.95
  lon: -75.16
";

fn geostate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("geostate").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("GEOSTATE_CONFIG")
        .env_remove("GEOSTATE_EMAIL");
    cmd
}

/// A project directory with one raw export and a config pointing the local
/// backend at a two-state reference table.
fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("timeline.json"), TIMELINE).unwrap();
    std::fs::write(dir.path().join("refs.yaml"), REFERENCES).unwrap();
    let refs = dir.path().join("refs.yaml");
    std::fs::write(
        dir.path().join("geostate.yaml"),
        format!(
            "geocoder:\n  type: local\n  reference: {}\n  max_distance_km: 100\n",
            refs.display()
        ),
    )
    .unwrap();
    dir
}

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("annotated.json")
}

fn annotate_json(dir: &TempDir, extra: &[&str]) -> serde_json::Value {
    let out = geostate(dir)
        .args(["--json", "annotate", "-r", "timeline.json", "-a", "annotated.json"])
        .args(extra)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// ---------------------------------------------------------------------------
// geostate annotate
// ---------------------------------------------------------------------------

#[test]
fn annotate_creates_store() {
    let dir = setup();
    let stats = annotate_json(&dir, &[]);
    assert_eq!(stats["total_raw"], 3);
    assert_eq!(stats["newly_resolved"], 3);
    assert_eq!(stats["backend_calls"], 3);
    assert_eq!(stats["remaining_unresolved"], 0);

    let store: serde_json::Value = serde_json::from_str(&read(&store_path(&dir))).unwrap();
    assert_eq!(store["geocoder"], "local");
    let states: Vec<&str> = store["locations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["state"].as_str().unwrap())
        .collect();
    assert_eq!(states, vec!["NY", "PA", "NY"]);
    assert_eq!(store["locations"][0]["timestamp"], "2024-03-01T15:00:00Z");
}

#[test]
fn annotate_second_run_is_noop() {
    let dir = setup();
    annotate_json(&dir, &[]);
    let first = read(&store_path(&dir));

    let stats = annotate_json(&dir, &[]);
    assert_eq!(stats["already_annotated"], 3);
    assert_eq!(stats["backend_calls"], 0);
    assert_eq!(read(&store_path(&dir)), first);
}

#[test]
fn annotate_limit_resumes() {
    let dir = setup();
    let stats = annotate_json(&dir, &["--limit", "2"]);
    assert_eq!(stats["newly_resolved"], 2);
    assert_eq!(stats["remaining_unresolved"], 1);
    assert_eq!(stats["limit_reached"], true);

    let stats = annotate_json(&dir, &[]);
    assert_eq!(stats["already_annotated"], 2);
    assert_eq!(stats["newly_resolved"], 1);
}

#[test]
fn annotate_human_output() {
    let dir = setup();
    geostate(&dir)
        .args(["annotate", "-r", "timeline.json", "-a", "annotated.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("newly resolved"))
        .stdout(predicate::str::contains("remaining"));
}

#[test]
fn annotate_uses_cache() {
    let dir = setup();
    annotate_json(&dir, &[]);
    std::fs::rename(store_path(&dir), dir.path().join("prior.json")).unwrap();

    let stats = annotate_json(&dir, &["-c", "prior.json"]);
    assert_eq!(stats["cache_resolved"], 3);
    assert_eq!(stats["backend_calls"], 0);
}

#[test]
fn annotate_dry_run_writes_nothing() {
    let dir = setup();
    let stats = annotate_json(&dir, &["--dry-run"]);
    assert_eq!(stats["needs_resolution"], 3);
    assert!(!store_path(&dir).exists());
}

#[test]
fn annotate_osm_without_email_fails() {
    let dir = setup();
    geostate(&dir)
        .args([
            "annotate",
            "-r",
            "timeline.json",
            "-a",
            "annotated.json",
            "--geocoder",
            "osm",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("email"));
    assert!(!store_path(&dir).exists());
}

#[test]
fn annotate_geocoder_mismatch_fails() {
    let dir = setup();
    annotate_json(&dir, &[]);
    let before = read(&store_path(&dir));
    geostate(&dir)
        .args([
            "annotate",
            "-r",
            "timeline.json",
            "-a",
            "annotated.json",
            "--geocoder",
            "osm",
            "--email",
            "me@example.com",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot switch"));
    assert_eq!(read(&store_path(&dir)), before);
}

#[test]
fn annotate_reuses_store_geocoder() {
    let dir = setup();
    let stats = annotate_json(&dir, &["--limit", "1"]);
    assert_eq!(stats["remaining_unresolved"], 2);

    // Config now names a backend this store was not built with.
    std::fs::write(dir.path().join("geostate.yaml"), "geocoder:\n  type: osm\n").unwrap();
    let stats = annotate_json(&dir, &[]);
    assert_eq!(stats["already_annotated"], 1);
    assert_eq!(stats["newly_resolved"], 2);

    let store: serde_json::Value = serde_json::from_str(&read(&store_path(&dir))).unwrap();
    assert_eq!(store["geocoder"], "local");
}

#[test]
fn annotate_malformed_raw_fails() {
    let dir = setup();
    std::fs::write(dir.path().join("broken.json"), "[{\"startTime\": ").unwrap();
    geostate(&dir)
        .args(["annotate", "-r", "broken.json", "-a", "annotated.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed input"));
    assert!(!store_path(&dir).exists());
}

#[test]
fn annotate_require_existing_fails_without_store() {
    let dir = setup();
    geostate(&dir)
        .args([
            "annotate",
            "-r",
            "timeline.json",
            "-a",
            "annotated.json",
            "--require-existing",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn annotate_strict_rejects_stale_entries() {
    let dir = setup();
    annotate_json(&dir, &[]);
    std::fs::write(
        dir.path().join("shorter.json"),
        r#"[{"startTime": "2024-03-01T10:00:00.000-05:00",
             "timelinePath": [{"point": "geo:40.7580,-73.9855", "durationMinutesOffsetFromStartTime": "0"}]}]"#,
    )
    .unwrap();
    geostate(&dir)
        .args(["annotate", "-r", "shorter.json", "-a", "annotated.json", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 missing"));

    let out = geostate(&dir)
        .args([
            "--json",
            "annotate",
            "-r",
            "shorter.json",
            "-a",
            "annotated.json",
            "--invalidate",
            "missing",
        ])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(stats["removed_missing"], 2);
}

// ---------------------------------------------------------------------------
// geostate convert / archive / summary
// ---------------------------------------------------------------------------

#[test]
fn convert_legacy_store() {
    let dir = setup();
    std::fs::write(
        dir.path().join("legacy.json"),
        r#"{"geocoder": "osm", "days": {"2024-03-01": {
            "1709305200000": {"latitudeE7": 407580000, "longitudeE7": -739855000, "state": "NY"}
        }}}"#,
    )
    .unwrap();
    geostate(&dir)
        .args(["convert", "-a", "legacy.json", "-o", "current.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Converted 1 entries"));

    let store: serde_json::Value = serde_json::from_str(&read(&dir.path().join("current.json"))).unwrap();
    assert_eq!(store["geocoder"], "osm");
    assert_eq!(store["locations"][0]["latitude"], 40.758);
    assert_eq!(store["locations"][0]["timestamp"], "2024-03-01T15:00:00Z");

    geostate(&dir)
        .args(["convert", "-a", "legacy.json", "-o", "current.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn archive_writes_year_once() {
    let dir = setup();
    annotate_json(&dir, &[]);
    let args = [
        "archive", "-r", "timeline.json", "-a", "annotated.json", "-y", "2024", "-n", "alice", "-o",
        "out",
    ];
    geostate(&dir)
        .args(args)
        .assert()
        .success()
        .stdout(predicate::str::contains("Archived 3 raw points"))
        .stdout(predicate::str::contains("Archived 3 entries"));
    let raw_path = dir.path().join("out/geo-location-alice-2024-raw.json");
    let annotated_path = dir.path().join("out/geo-location-alice-2024-annotated.json");
    assert!(annotated_path.exists());
    let raw: serde_json::Value = serde_json::from_str(&read(&raw_path)).unwrap();
    assert_eq!(raw["locations"].as_array().unwrap().len(), 3);
    assert_eq!(raw["locations"][0]["latitudeE7"], 407580000);
    assert_eq!(raw["locations"][0]["timestamp"], "2024-03-01T15:00:00Z");

    geostate(&dir)
        .args(args)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    // A leftover raw archive alone is enough to refuse.
    std::fs::remove_file(&annotated_path).unwrap();
    geostate(&dir)
        .args(args)
        .assert()
        .failure()
        .stderr(predicate::str::contains("raw.json"));
    assert!(!annotated_path.exists());
}

#[test]
fn archive_other_year_is_empty() {
    let dir = setup();
    annotate_json(&dir, &[]);
    let out = geostate(&dir)
        .args([
            "--json", "archive", "-r", "timeline.json", "-a", "annotated.json", "-y", "2023", "-n",
            "alice",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["raw"]["entries"], 0);
    assert_eq!(report["annotated"]["entries"], 0);
}

#[test]
fn archive_rejects_bad_name() {
    let dir = setup();
    annotate_json(&dir, &[]);
    geostate(&dir)
        .args([
            "archive", "-r", "timeline.json", "-a", "annotated.json", "-y", "2024", "-n", "Bad Name",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid archive name"));
}

#[test]
fn summary_counts_states() {
    let dir = setup();
    annotate_json(&dir, &[]);
    let out = geostate(&dir)
        .args(["--json", "summary", "-a", "annotated.json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(rows[0]["state"], "NY");
    assert_eq!(rows[0]["points"], 2);
    assert_eq!(rows[0]["days"], 2);
    assert_eq!(rows[1]["state"], "PA");

    geostate(&dir)
        .args(["summary", "-a", "annotated.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("STATE"));
}

// ---------------------------------------------------------------------------
// geostate config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_ok() {
    let dir = setup();
    geostate(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("geostate.yaml"), "geocoder:\n  type: osm\n").unwrap();
    geostate(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_show_defaults() {
    let dir = TempDir::new().unwrap();
    geostate(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("type: local"));
}
