//! Demo del motor: la tarea `add(a: int, b: float = 0.1)` ejecutada con cache,
//! re-ejecutada tras cambiar un input y luego sobre cada backend registrado.
//!
//! `main-core worker` atiende el pool de procesos (`pool`) con la misma tarea.

use std::io;
use std::process;

use labflow_rust::config::AppConfig;
use labflow_rust::errors::CoreError;
use labflow_rust::pipeline::build_runner;
use labflow_rust::{FieldDecl, FieldType, Task, TaskContext};
use lab_core::{WorkerOptions, WorkerRegistry};
use lab_workers::{serve, standard_registry, WorkerCommand};
use log::info;
use serde_json::json;

fn add_task() -> Result<Task, CoreError> {
    Ok(Task::builder("add").version("1")
                           .input(FieldDecl::required("a", FieldType::Int))
                           .input(FieldDecl::with_default("b", FieldType::Float, json!(0.1)))
                           .output(FieldDecl::required("out", FieldType::Float))
                           .body(|ctx: &TaskContext<'_>| {
                               let a: i64 = ctx.input("a")?;
                               let b: f64 = ctx.input("b")?;
                               Ok(json!(a as f64 + b))
                           })
                           .build()?)
}

fn run_demo(config: &AppConfig) -> Result<(), CoreError> {
    let runner = build_runner(config)?;
    let mut task = add_task()?;

    task.set_input("a", 1)?;
    let first = runner.run(&task, &[])?;
    println!("add(a=1) = {} [{}] cache_hit={}",
             first.result.get_as::<f64>("out")?,
             first.fingerprint.short(),
             first.cache_hit);

    let again = runner.run(&task, &[])?;
    println!("add(a=1) = {} [{}] cache_hit={}",
             again.result.get_as::<f64>("out")?,
             again.fingerprint.short(),
             again.cache_hit);

    task.set_input("a", 2)?;
    let second = runner.run(&task, &[])?;
    println!("add(a=2) = {} [{}] cache_hit={}",
             second.result.get_as::<f64>("out")?,
             second.fingerprint.short(),
             second.cache_hit);
    if let Some(backend) = runner.backend() {
        backend.shutdown();
    }

    // mismo cuerpo sobre cada backend, cada uno con su propia raíz de cache
    let registry: WorkerRegistry = standard_registry();
    let options = WorkerOptions::default().with_max_workers(config.runner.max_workers);
    for name in registry.names() {
        let root = config.runner.cache_dir.join("backends").join(&name);
        let runner = lab_core::TaskRunner::builder(root).backend_from(&registry, name.as_str(), &options)?
                                                        .build();
        let report = runner.run(&task, &[])?;
        println!("  {name:<8} -> {} [{}]", report.result.get_as::<f64>("out")?, report.fingerprint.short());
        if let Some(backend) = runner.backend() {
            backend.shutdown();
        }
    }

    // nombre inválido: falla al construir
    if let Err(e) = registry.create("quantum", &options) {
        println!("{e}");
    }
    Ok(())
}

fn serve_worker() -> i32 {
    let served = serve(io::stdin().lock(), io::stdout().lock(), |name| {
        (name == "add").then(add_task).and_then(Result::ok)
    });
    match served {
        Ok(n) => {
            info!("worker served {n} request(s)");
            0
        }
        Err(e) => {
            eprintln!("[main-core] worker error: {e}");
            1
        }
    }
}

fn main() {
    if std::env::args().nth(1).as_deref() == Some(WorkerCommand::SUBCOMMAND) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
        process::exit(serve_worker());
    }
    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[main-core] {e}");
            process::exit(2);
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter.as_str())).init();
    info!("cache root: {}", config.runner.cache_dir.display());

    if let Err(e) = run_demo(&config) {
        eprintln!("[main-core] error: {e}");
        process::exit(e.exit_code());
    }
}
