// SHOREBENCH FILE-LEVEL TESTS
// CATALOG AND TEMPLATE LOADING, OUTPUT LOG ACCUMULATION ACROSS RUNS.

use std::fs;

use shorebench::catalog::Catalog;
use shorebench::config::Template;
use shorebench::results::{parse_log, ResultLog};
use shorebench::BenchError;

#[test]
fn catalog_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    fs::write(
        &path,
        r#"{
            "configurations": { "tpcc-8": { "sf": 8, "bufpoolsize": 4194304, "design": "plp" } },
            "runs": { "tpcc-8-8": { "configuration": "tpcc-8", "affinity": [[0, 1, 2, 3, 4, 5, 6, 7], [8, 9, 10, 11, 12, 13, 14, 15]], "commands": ["measure 8 1 8 30 1 3"] } }
        }"#,
    )
    .unwrap();

    let catalog = Catalog::load(&path).unwrap();
    let cfg = catalog.configuration("tpcc-8").unwrap();
    assert_eq!(cfg.scale_factor, 8);
    assert_eq!(cfg.buffer_pool_size, 4194304);
    assert_eq!(cfg.design, "plp");
    let (name, run) = catalog.runs().next().unwrap();
    assert_eq!(name, "tpcc-8-8");
    assert_eq!(run.affinity[1].to_string(), "8,9,10,11,12,13,14,15");
}

#[test]
fn catalog_rejects_unknown_fields_and_missing_file() {
    let text = r#"{ "configurations": { "c": { "sf": 1, "threads": 4 } }, "runs": {} }"#;
    let err = Catalog::from_json(text).unwrap_err();
    assert!(matches!(err, BenchError::Catalog(ref m) if m.contains("threads")));

    let dir = tempfile::tempdir().unwrap();
    let err = Catalog::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, BenchError::Io { .. }));
}

#[test]
fn template_missing_is_provision_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Template::load(&dir.path().join("shore.conf.template")).unwrap_err();
    assert!(matches!(err, BenchError::Provision(ref m) if m.contains("Cannot find template file")));

    let path = dir.path().join("shore.conf.template");
    fs::write(&path, b"db-threads = 1\n\xff\n").unwrap();
    let t = Template::load(&path).unwrap();
    assert_eq!(t.bytes(), b"db-threads = 1\n\xff\n");
}

#[test]
fn output_log_accumulates_runs() {
    let dir = tempfile::tempdir().unwrap();
    let log = ResultLog::new(dir.path().join("output.log"));

    log.begin_run("tpcc-1-1").unwrap();
    log.append_results(&parse_log(&["MQTh/s: (10.5)", "TPS: (11.0)"])).unwrap();
    log.append_results(&parse_log(&["nothing here"])).unwrap();
    log.append_results(&parse_log(&["TPS: (12.25)"])).unwrap();
    log.begin_run("tpcc-2-2").unwrap();

    let text = fs::read_to_string(log.path()).unwrap();
    assert_eq!(text, "Run\ttpcc-1-1\nTPS\t10.5\t11.0\nTPS\t12.25\nRun\ttpcc-2-2\n");
}
