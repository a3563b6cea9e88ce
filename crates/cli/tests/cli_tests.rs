//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};

const EXPORT: &str = "\
100|jdh4|tiger|cses|cpu|50000|50000|billing=8,cpu=1,mem=16G,node=1|1651492800|JS1:None
101|jdh4|tiger2|cses|cpu|20000|10000|billing=8,cpu=2,mem=16G,node=1|Unknown|
102|gbwright|tiger|cses|gpu|80000|20000|billing=8,cpu=4,gres/gpu=4,mem=16G,node=1|1651492800|JS1:None
103|gbwright|tiger|cses|gpu|0|0||Unknown|
";

const LDIF: &str = "\
dn: uid=jdh4,cn=users,dc=rc,dc=princeton,dc=edu
uid: jdh4
uidNumber: 150340
displayName: Jonathan D. Halverson
manager: uid=curt,cn=users,dc=rc,dc=princeton,dc=edu

dn: uid=gbwright,cn=users,dc=rc,dc=princeton,dc=edu
uid: gbwright
uidNumber: 150341
displayName: Garrett Wright
manager: uid=curt,cn=users,dc=rc,dc=princeton,dc=edu

dn: uid=curt,cn=users,dc=rc,dc=princeton,dc=edu
uid: curt
displayName: Curtis W. Hillegas
";

const QUOTA: &str = r#"{"status": "success", "data": {"resultType": "vector", "result": [
  {"metric": {"__name__": "gpfs_quota_block_usage_bytes", "fs": "projects.storage", "filesetname": "CSES", "uid": "150340"}, "value": [1651492800.0, "3221225472"]},
  {"metric": {"__name__": "gpfs_quota_block_usage_bytes", "fs": "projects.storage", "filesetname": "CSES", "uid": "999"}, "value": [1651492800.0, "1073741824"]}
]}}"#;

fn sponsor_usage(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sponsor-usage"))
        .args(args)
        .env_remove("SPONSOR_USAGE_CONFIG")
        .output()
        .expect("Failed to execute command")
}

/// Snapshot inputs plus a config file pointing at them
fn write_fixture(dir: &Path, engine: &str) -> String {
    std::fs::write(dir.join("cache_sacct.psv"), EXPORT).unwrap();
    std::fs::write(dir.join("directory.ldif"), LDIF).unwrap();
    std::fs::create_dir(dir.join("metrics")).unwrap();
    std::fs::write(dir.join("metrics").join("gpfs_quota_block_usage_bytes.json"), QUOTA).unwrap();

    let config = format!(
        "accounting_export = '{dir}/cache_sacct.psv'\n\
         directory_ldif = '{dir}/directory.ldif'\n\
         metrics_dir = '{dir}/metrics'\n\
         archive_path = '{dir}/sponsor_usage.csv'\n\
         metrics_textfile = '{dir}/sponsor_usage.prom'\n\
         \n[engine]\n{engine}\n\
         \n[engine.sponsor_filesets]\ncurt = ['projects.storage.CSES']\n",
        dir = dir.display(),
        engine = engine,
    );
    let path = dir.join("config.toml");
    std::fs::write(&path, config).unwrap();
    path.display().to_string()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = sponsor_usage(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("sponsor usage"), "Should show about text");
    assert!(stdout.contains("run"), "Should show run command");
    assert!(stdout.contains("storage"), "Should show storage command");
    assert!(stdout.contains("period"), "Should show period command");
    assert!(stdout.contains("--config"), "Should show config option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = sponsor_usage(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("sponsor-usage"), "Should show binary name");
}

/// Test storage subcommand help
#[test]
fn test_storage_help() {
    let output = sponsor_usage(&["storage", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Storage help should succeed");
    assert!(stdout.contains("--sponsor"), "Should show sponsor option");
}

/// Test run subcommand help
#[test]
fn test_run_help() {
    let output = sponsor_usage(&["run", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Run help should succeed");
    assert!(stdout.contains("--months"), "Should show months option");
    assert!(stdout.contains("--no-archive"), "Should show no-archive option");
}

/// Test period computation
#[test]
fn test_period() {
    let output = sponsor_usage(&[
        "--format",
        "json",
        "period",
        "--months",
        "3",
        "--kind",
        "sponsors",
        "--today",
        "2022-05-01",
    ]);
    assert!(output.status.success(), "Period should succeed");

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["start"], "2022-02-01");
    assert_eq!(value["end"], "2022-04-30");
    assert_eq!(value["days"], 89);
}

/// Test that an unknown report kind is rejected
#[test]
fn test_period_invalid_kind() {
    let output = sponsor_usage(&["period", "--kind", "weekly"]);
    assert!(!output.status.success(), "Unknown kind should fail");
}

/// Test a full run from snapshot files
#[test]
fn test_run_writes_archive_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(dir.path(), "min_aggregate_rows = 1");

    let output = sponsor_usage(&[
        "--config", &config, "--format", "json", "run", "--months", "1", "--today", "2022-05-01",
    ]);
    assert!(
        output.status.success(),
        "Run should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["sponsors"][0]["sponsor"], "curt");
    assert_eq!(value["sponsors"][0]["sponsor_name"], "Curtis W. Hillegas");
    assert_eq!(value["stats"]["jobs_ingested"], 3);
    assert_eq!(value["storage"][0]["filesets"][0]["contributors"][1]["netid"], "UNKNOWN");

    let archive = std::fs::read_to_string(dir.path().join("sponsor_usage.csv")).unwrap();
    let lines: Vec<&str> = archive.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("tiger,curt,gbwright,Garrett Wright,22,"));
    assert!(lines[2].starts_with("tiger,curt,jdh4,Jonathan Halverson,19,"));

    let metrics = std::fs::read_to_string(dir.path().join("sponsor_usage.prom")).unwrap();
    assert!(metrics.contains("sponsor_usage_jobs_ingested 3"));
}

/// Test that a failed directory probe aborts without writing anything
#[test]
fn test_run_probe_failure_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(
        dir.path(),
        "[engine.probe]\nnetid = 'gbwright'\nexpected_sponsor = 'wtang'",
    );

    let output = sponsor_usage(&["--config", &config, "run"]);
    assert!(!output.status.success(), "Run should fail");
    assert!(String::from_utf8_lossy(&output.stderr).contains("directory service unavailable"));
    assert!(!dir.path().join("sponsor_usage.csv").exists());
    assert!(!dir.path().join("sponsor_usage.prom").exists());
}

/// Test the storage join for one sponsor
#[test]
fn test_storage_for_sponsor() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(dir.path(), "");

    let output = sponsor_usage(&[
        "--config", &config, "--format", "json", "storage", "--sponsor", "curt",
    ]);
    assert!(output.status.success(), "Storage should succeed");

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let contributors = &value["filesets"][0]["contributors"];
    assert_eq!(contributors[0]["netid"], "jdh4");
    assert_eq!(contributors[0]["cell"], "3 GB (75%)");
    assert_eq!(contributors[1]["cell"], "1 GB (25%)");
}
