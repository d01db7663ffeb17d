use std::sync::Arc;
use std::time::Duration;

use lab_core::constants::RESULT_FILE;
use lab_core::{FieldDecl, FieldType, Task, TaskContext, TaskRunner, WorkerBackend, WorkerOptions};
use lab_workers::{standard_registry, ClusterBackend, LocalCluster, ProcessPoolBackend};
use serde_json::json;

fn add() -> Task {
    let mut task = Task::builder("add").input(FieldDecl::required("a", FieldType::Int))
                                       .input(FieldDecl::with_default("b", FieldType::Float, json!(0.1)))
                                       .output(FieldDecl::required("out", FieldType::Float))
                                       .body(|ctx: &TaskContext<'_>| {
                                           let a: i64 = ctx.input("a")?;
                                           let b: f64 = ctx.input("b")?;
                                           Ok(json!(a as f64 + b))
                                       })
                                       .build()
                                       .unwrap();
    task.set_input("a", 1).unwrap();
    task
}

#[test]
fn every_backend_produces_the_same_result_and_cache_bytes() {
    let registry = standard_registry();
    let options = WorkerOptions::default().with_max_workers(2);
    let mut contents = Vec::new();
    // el pool de procesos necesita un binario con catálogo; se prueba en lab-cli
    for name in registry.names().into_iter().filter(|n| n != ProcessPoolBackend::NAME) {
        let dir = tempfile::tempdir().unwrap();
        let runner = TaskRunner::builder(dir.path()).backend_from(&registry, name.as_str(), &options)
                                                    .unwrap()
                                                    .build();
        let report = runner.run(&add(), &[]).unwrap();
        assert_eq!(report.backend.as_deref(), Some(name.as_str()));
        assert_eq!(report.result.get_as::<f64>("out").unwrap(), 1.1, "backend {name}");
        contents.push((name.clone(), report.fingerprint.clone(), std::fs::read(report.output_dir.join(RESULT_FILE)).unwrap()));
        if let Some(backend) = runner.backend() {
            backend.shutdown();
        }
    }
    let (_, first_fp, first_bytes) = &contents[0];
    for (name, fp, bytes) in &contents[1..] {
        assert_eq!(fp, first_fp, "fingerprint differs for {name}");
        assert_eq!(bytes, first_bytes, "cache content differs for {name}");
    }
}

#[test]
fn one_backend_shared_by_concurrent_runs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = TaskRunner::builder(dir.path()).backend_from(&standard_registry(), "threads", &WorkerOptions::default())
                                                .unwrap()
                                                .build();
    let results: Vec<f64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|a| {
                                        let runner = &runner;
                                        s.spawn(move || {
                                            let mut task = add();
                                            task.set_input("a", a).unwrap();
                                            runner.run(&task, &[]).unwrap().result.get_as::<f64>("out").unwrap()
                                        })
                                    })
                                    .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results.len(), 8);
    for (a, got) in results.iter().enumerate() {
        assert!((got - (a as f64 + 0.1)).abs() < 1e-12);
    }
}

#[test]
fn shutdown_waits_for_in_flight_work() {
    for name in ["threads", "futures", "cluster"] {
        let backend = standard_registry().create(name, &WorkerOptions::default().with_max_workers(2))
                                         .unwrap();
        let mut handles: Vec<_> = (0..4).map(|i| {
                                            backend.submit(Box::new(move || {
                                                       std::thread::sleep(Duration::from_millis(30));
                                                       Ok(json!(i))
                                                   }))
                                                   .unwrap()
                                        })
                                        .collect();
        backend.shutdown();
        assert_eq!(backend.in_flight(), 0, "backend {name}");
        for (i, h) in handles.iter_mut().enumerate() {
            assert_eq!(h.try_result(), Some(Ok(json!(i))), "backend {name}");
        }
        assert!(backend.submit(Box::new(|| Ok(json!(0)))).is_err());
    }
}

#[test]
fn cluster_failure_reaches_runner_as_task_error() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(LocalCluster::start("inproc://flaky", 1).unwrap());
    let backend: Arc<dyn WorkerBackend> = Arc::new(ClusterBackend::new(cluster.clone()).unwrap());
    let runner = TaskRunner::builder(dir.path()).backend(backend).build();

    cluster.reject_next(1);
    let err = runner.run(&add(), &[]).unwrap_err();
    assert!(err.is_task_failure());
    assert!(err.to_string().contains("cluster error"), "{err}");
    assert_eq!(runner.cached_result(&add(), &[]).unwrap(), None);

    // reintento: el scheduler vuelve a responder
    let report = runner.run(&add(), &[]).unwrap();
    assert!(!report.cache_hit);
    assert_eq!(report.result.get_as::<f64>("out").unwrap(), 1.1);
}
