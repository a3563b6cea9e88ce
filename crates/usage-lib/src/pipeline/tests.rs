//! Pipeline-level tests over in-memory collaborators

use super::*;
use crate::accounting::encode_jobstats;
use crate::config::ProbeConfig;
use crate::identity::LdifDirectory;
use crate::models::JobRecord;
use crate::storage::MetricSample;
use std::cell::Cell;

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
description: tiger:wtang

dn: uid=curt,cn=users,dc=rc,dc=princeton,dc=edu
uid: curt
displayName: Curtis W. Hillegas

dn: uid=wtang,cn=users,dc=rc,dc=princeton,dc=edu
uid: wtang
displayName: Wei Tang
";

struct FixedAccounting {
    records: Vec<JobRecord>,
    fetches: Cell<usize>,
}

impl FixedAccounting {
    fn new(records: Vec<JobRecord>) -> Self {
        Self {
            records,
            fetches: Cell::new(0),
        }
    }
}

impl AccountingSource for FixedAccounting {
    fn fetch(&self, _diagnostics: &mut Diagnostics) -> Result<Vec<JobRecord>> {
        self.fetches.set(self.fetches.get() + 1);
        Ok(self.records.clone())
    }
}

struct FixedMetrics(Vec<MetricSample>);

impl MetricsSource for FixedMetrics {
    fn query(&self, _metric: &str) -> Result<Vec<MetricSample>> {
        Ok(self.0.clone())
    }
}

/// `cses` job with a known start and no telemetry
fn record(jobid: &str, netid: &str, pool: (&str, &str), seconds: (u64, u64)) -> JobRecord {
    JobRecord {
        start_time: Some(234567890),
        ..JobRecord::for_test(jobid, netid, pool)
            .with_seconds(seconds.0, seconds.1)
            .with_telemetry("JS1:None")
    }
}

fn cpu_telemetry(cpus: u32, used: f64) -> String {
    encode_jobstats(&format!(
        r#"{{"nodes": {{"tiger-i23g11": {{"cpus": {}, "total_time": {}}}}}, "total_time": 0}}"#,
        cpus, used
    ))
}

fn records() -> Vec<JobRecord> {
    vec![
        record("100", "jdh4", ("tiger", "cpu"), (50000, 50000))
            .with_tres("billing=8,cpu=1,mem=16G,node=1")
            .with_telemetry(cpu_telemetry(1, 40000.0)),
        record("101", "jdh4", ("tiger2", "cpu"), (20000, 10000))
            .with_tres("billing=8,cpu=2,mem=16G,node=1"),
        record("102", "jdh4", ("tiger", "gpu"), (20000, 10000))
            .with_tres("billing=8,cpu=2,gres/gpu=1,mem=16G,node=1"),
        record("103", "gbwright", ("tiger", "gpu"), (80000, 20000))
            .with_tres("billing=8,cpu=4,gres/gpu=4,mem=16G,node=1"),
        record("104", "bill", ("della", "cpu"), (30000, 10000))
            .with_tres("billing=8,cpu=3,mem=16G,node=1")
            .with_telemetry(cpu_telemetry(3, 40000.0)),
        record("104", "bill", ("della", "cpu"), (30000, 10000))
            .with_tres("billing=8,cpu=3,mem=16G,node=1"),
        record("105", "bill", ("della", "gpu"), (100, 100))
            .with_tres("billing=8,cpu=3,gres/gpu=0,node=1"),
    ]
}

fn pipeline(config: EngineConfig) -> Pipeline {
    Pipeline::new(config, StructuredLogger::new("test"))
}

fn directory() -> LdifDirectory {
    LdifDirectory::parse(LDIF, "ldif", &mut Diagnostics::new())
}

fn inputs<'a>(accounting: &'a FixedAccounting, directory: &'a LdifDirectory) -> RunInputs<'a> {
    RunInputs {
        accounting,
        directory,
        departed_users: None,
        uids: UidResolution::new(),
        metrics: None,
    }
}

#[test]
fn test_full_run() {
    let accounting = FixedAccounting::new(records());
    let directory = directory();
    let output = pipeline(EngineConfig::default())
        .run(inputs(&accounting, &directory))
        .unwrap();

    let rows: Vec<(String, &str, u64, u64, u64, Option<&str>, Option<&str>)> = output
        .usage
        .iter()
        .map(|r| {
            let u = &r.ranked.usage;
            (
                u.pool.as_key(),
                u.netid.as_str(),
                u.cpu_hours,
                u.gpu_hours,
                u.jobs,
                r.sponsor.as_deref(),
                r.name.as_deref(),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("della__cpu".to_string(), "bill", 8, 0, 1, None, None),
            ("tiger__cpu".to_string(), "jdh4", 19, 0, 2, Some("curt"), Some("Jonathan Halverson")),
            (
                "tiger__gpu".to_string(),
                "gbwright",
                22,
                22,
                1,
                Some("wtang"),
                Some("Garrett Wright"),
            ),
            ("tiger__gpu".to_string(), "jdh4", 6, 3, 1, Some("curt"), Some("Jonathan Halverson")),
        ]
    );

    // bill's only telemetry claims more CPU time than was allocated
    let bill = &output.usage[0].ranked;
    assert_eq!(bill.efficiency.cpu_eff.to_string(), "--");
    let jdh4_cpu = &output.usage[1].ranked;
    assert_eq!(jdh4_cpu.efficiency.cpu_eff.to_string(), "80%");
    assert_eq!(jdh4_cpu.cpu_rank.to_string(), "1/1");
    assert_eq!(jdh4_cpu.gpu_rank.to_string(), "N/A");
    let gbwright = &output.usage[2].ranked;
    assert_eq!(gbwright.cpu_rank.to_string(), "1/2");
    assert_eq!(gbwright.gpu_rank.to_string(), "1/2");
    assert_eq!(gbwright.efficiency.gpu_eff.to_string(), "--");

    assert_eq!(output.sponsors.len(), 2);
    let curt = &output.sponsors[0];
    assert_eq!((curt.cluster.as_str(), curt.sponsor.as_str()), ("tiger", "curt"));
    assert_eq!(curt.sponsor_name.as_deref(), Some("Curtis W. Hillegas"));
    assert_eq!(curt.cpu_hours, 25);
    assert_eq!(curt.members[0].partitions_joined(), "cpu,gpu");
    assert_eq!(output.sponsors[1].sponsor_name.as_deref(), Some("Wei Tang"));

    assert_eq!(output.diagnostics.count("duplicate_record"), 1);
    assert_eq!(output.diagnostics.count("malformed_resource_spec"), 1);
    assert_eq!(output.diagnostics.count("corrupt_telemetry"), 1);
    assert_eq!(output.diagnostics.count("missing_identity"), 1);

    assert_eq!(output.stats.jobs_ingested, 7);
    assert_eq!(output.stats.jobs_rejected, 2);
    assert_eq!(output.stats.aggregate_rows, 4);
    assert_eq!(output.stats.corrupt_telemetry_rows, 1);
    assert_eq!(output.stats.unresolved_identities, 1);
    // three users plus two sponsor names
    assert_eq!(output.stats.directory_lookups, 5);

    assert_eq!(output.archive.len(), 4);
    assert_eq!(output.archive[0].netid, "bill");
    assert_eq!(output.archive[0].sponsor, None);
}

#[test]
fn test_repeated_runs_are_identical() {
    let directory = directory();
    let write = |records: Vec<JobRecord>| {
        let accounting = FixedAccounting::new(records);
        let output = pipeline(EngineConfig::default())
            .run(inputs(&accounting, &directory))
            .unwrap();
        let mut buffer = Vec::new();
        write_archive(&output.archive, &mut buffer).unwrap();
        buffer
    };

    let first = write(records());
    assert_eq!(first, write(records()));

    // a different duplicate survives, but neither carries usable telemetry
    let mut reversed = records();
    reversed.reverse();
    assert_eq!(first, write(reversed));
}

#[test]
fn test_failed_probe_aborts_before_fetch() {
    let config = EngineConfig {
        probe: Some(ProbeConfig {
            netid: "gbwright".into(),
            expected_sponsor: "curt".into(),
        }),
        ..EngineConfig::default()
    };
    let accounting = FixedAccounting::new(records());
    let directory = directory();
    let err = pipeline(config).run(inputs(&accounting, &directory)).unwrap_err();

    assert!(matches!(err, UsageError::DirectoryServiceUnavailable { .. }));
    assert_eq!(accounting.fetches.get(), 0);
}

#[test]
fn test_passing_probe() {
    let config = EngineConfig {
        probe: Some(ProbeConfig {
            netid: "jdh4".into(),
            expected_sponsor: "curt".into(),
        }),
        ..EngineConfig::default()
    };
    let accounting = FixedAccounting::new(records());
    let directory = directory();
    assert!(pipeline(config).run(inputs(&accounting, &directory)).is_ok());
    assert_eq!(accounting.fetches.get(), 1);
}

#[test]
fn test_insufficient_data() {
    let config = EngineConfig {
        min_aggregate_rows: 50,
        ..EngineConfig::default()
    };
    let accounting = FixedAccounting::new(records());
    let directory = directory();
    let err = pipeline(config).run(inputs(&accounting, &directory)).unwrap_err();
    assert!(matches!(err, UsageError::InsufficientData { rows: 4, minimum: 50 }));
    assert!(err.is_fatal_precondition());
}

#[test]
fn test_storage_join_in_run() {
    let config = EngineConfig {
        sponsor_filesets: BTreeMap::from([(
            "curt".to_string(),
            vec!["projects.storage.CSES".to_string()],
        )]),
        ..EngineConfig::default()
    };
    let sample = |uid: &str, value: &str| MetricSample {
        labels: BTreeMap::from([
            ("fs".to_string(), "projects.storage".to_string()),
            ("filesetname".to_string(), "CSES".to_string()),
            ("uid".to_string(), uid.to_string()),
        ]),
        value: value.to_string(),
    };
    let metrics = FixedMetrics(vec![sample("150340", "3221225472"), sample("777", "1073741824")]);
    let accounting = FixedAccounting::new(records());
    let directory = directory();
    let output = pipeline(config)
        .run(RunInputs {
            metrics: Some(&metrics),
            ..inputs(&accounting, &directory)
        })
        .unwrap();

    assert_eq!(output.storage.len(), 1);
    let cells: Vec<(&str, &str)> = output.storage[0].filesets[0]
        .contributors
        .iter()
        .map(|c| (c.netid.as_str(), c.cell.as_str()))
        .collect();
    assert_eq!(cells, vec![("jdh4", "3 GB (75%)"), ("UNKNOWN", "1 GB (25%)")]);
    assert_eq!(output.stats.unresolved_storage_ids, 1);
}

#[test]
fn test_storage_for_sponsor() {
    let config = EngineConfig {
        sponsor_filesets: BTreeMap::from([(
            "curt".to_string(),
            vec!["projects.storage.CSES".to_string()],
        )]),
        ..EngineConfig::default()
    };
    let metrics = FixedMetrics(vec![MetricSample {
        labels: BTreeMap::from([
            ("fs".to_string(), "projects.storage".to_string()),
            ("filesetname".to_string(), "CSES".to_string()),
            ("uid".to_string(), "424242".to_string()),
        ]),
        value: "500".to_string(),
    }]);
    let mut uids = UidResolution::new();
    uids.insert("424242", "olduser");

    let directory = directory();
    let (report, diagnostics) = pipeline(config)
        .storage_for_sponsor("curt", &directory, uids, &metrics)
        .unwrap();
    assert_eq!(report.filesets[0].contributors[0].netid, "olduser");
    assert_eq!(report.filesets[0].contributors[0].cell, "500 B (100%)");
    assert!(diagnostics.is_empty());
}
