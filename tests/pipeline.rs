use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lab_core::{WorkerBackend, WorkerOptions};
use lab_workers::standard_registry;
use labflow_rust::config::AppConfig;
use labflow_rust::pipeline::build_runner;
use labflow_rust::{FieldDecl, FieldType, Task, TaskContext, TaskFailure};
use serde_json::json;

fn config(lookup: &[(&str, String)]) -> AppConfig {
    AppConfig::from_lookup(|k| lookup.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone())).unwrap()
}

fn counted_add(calls: Arc<AtomicUsize>) -> Task {
    Task::builder("add").input(FieldDecl::required("a", FieldType::Int))
                        .input(FieldDecl::with_default("b", FieldType::Float, json!(0.1)))
                        .body(move |ctx: &TaskContext<'_>| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(json!(ctx.input::<i64>("a")? as f64 + ctx.input::<f64>("b")?))
                        })
                        .build()
                        .unwrap()
}

#[test]
fn configured_pipeline_runs_on_threads_and_writes_audit_files() {
    let dir = tempfile::tempdir().unwrap();
    let audit = dir.path().join("audit");
    let cfg = config(&[("LABFLOW_CACHE_DIR", dir.path().join("cache").display().to_string()),
                       ("LABFLOW_WORKER", "threads".to_string()),
                       ("LABFLOW_AUDIT", "prov,resource".to_string()),
                       ("LABFLOW_AUDIT_DIR", audit.display().to_string())]);
    let runner = build_runner(&cfg).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut task = counted_add(calls.clone());
    task.set_input("a", 1).unwrap();

    let report = runner.run(&task, &[]).unwrap();
    assert_eq!(report.backend.as_deref(), Some("threads"));
    assert_eq!(report.result.get_as::<f64>("out").unwrap(), 1.1);
    // start, end y recursos
    assert_eq!(std::fs::read_dir(&audit).unwrap().count(), 3);

    assert!(runner.run(&task, &[]).unwrap().cache_hit);
    assert_eq!(std::fs::read_dir(&audit).unwrap().count(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    if let Some(backend) = runner.backend() {
        backend.shutdown();
    }
}

#[test]
fn unknown_worker_in_environment_fails_fast() {
    let cfg = config(&[("LABFLOW_WORKER", "quantum".to_string())]);
    let err = build_runner(&cfg).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("available: serial, pool, cluster"));
}

#[test]
fn environment_identity_partitions_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().display().to_string();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut task = counted_add(calls.clone());
    task.set_input("a", 4).unwrap();

    let plain = build_runner(&config(&[("LABFLOW_CACHE_DIR", root.clone())])).unwrap();
    let boxed = build_runner(&config(&[("LABFLOW_CACHE_DIR", root.clone()),
                                       ("LABFLOW_ENVIRONMENT", "docker:sha256:abc".to_string())])).unwrap();
    let a = plain.run(&task, &[]).unwrap();
    let b = boxed.run(&task, &[]).unwrap();
    assert_ne!(a.fingerprint, b.fingerprint);
    assert!(!b.cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let sha = build_runner(&config(&[("LABFLOW_CACHE_DIR", root), ("LABFLOW_HASH", "sha256".to_string())])).unwrap();
    assert_ne!(sha.fingerprint(&task).unwrap(), a.fingerprint);
}

#[test]
fn handles_from_any_backend_can_be_awaited() {
    for name in ["serial", "threads", "futures", "cluster"] {
        let backend: Arc<dyn WorkerBackend> = standard_registry().create(name, &WorkerOptions::default()).unwrap();
        let ok = backend.submit(Box::new(move || Ok(json!(name)))).unwrap();
        let bad = backend.submit(Box::new(|| Err(TaskFailure::new("bad")))).unwrap();
        assert_eq!(tokio_test::block_on(ok.wait()), Ok(json!(name)));
        assert!(tokio_test::block_on(bad.wait()).is_err());
        backend.shutdown();
    }
}

#[test]
fn result_written_by_one_process_layout_is_readable_by_another_runner() {
    let dir = tempfile::tempdir().unwrap();
    let shared: PathBuf = dir.path().join("shared");
    let calls = Arc::new(AtomicUsize::new(0));
    let mut task = counted_add(calls.clone());
    task.set_input("a", 9).unwrap();

    let writer = build_runner(&config(&[("LABFLOW_CACHE_DIR", shared.display().to_string()),
                                        ("LABFLOW_WORKER", "cluster".to_string())])).unwrap();
    writer.run(&task, &[]).unwrap();
    if let Some(backend) = writer.backend() {
        backend.shutdown();
    }

    let reader = build_runner(&config(&[("LABFLOW_CACHE_DIR", dir.path().join("own").display().to_string())])).unwrap();
    let report = reader.run(&task, &[shared]).unwrap();
    assert!(report.cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
