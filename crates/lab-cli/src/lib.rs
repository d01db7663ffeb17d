//! Línea de comandos `lab`: ejecutar tareas del catálogo, inspeccionar la
//! cache y listar backends.

pub mod catalog;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use lab_audit::{configured_auditor, AuditTargets, RemoteAuth};
use lab_core::runner::TaskRunnerBuilder;
use lab_core::{AuditDeliveryError, ConfigError, EngineError, Fingerprint, FsResultStore, ResultStore, RunnerConfig};
use lab_workers::{serve, standard_registry};
use log::{debug, info, warn};
use serde_json::{json, Value};
use thiserror::Error;

use crate::catalog::TASK_NAMES;

#[derive(Debug, Parser)]
#[command(name = "lab", version, about = "Ejecuta tareas con cache direccionada por contenido")]
pub struct Cli {
    /// Raíz de la cache (por defecto LABFLOW_CACHE_DIR).
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ejecuta una tarea del catálogo (o devuelve su resultado en cache).
    Run(RunArgs),
    /// Muestra inputs, defaults y outputs de una tarea.
    Describe { task: String },
    /// Lista las tareas del catálogo.
    Tasks,
    /// Lista los backends registrados.
    Workers,
    /// Inspecciona la cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Atiende solicitudes del pool de procesos por stdin/stdout.
    #[command(hide = true)]
    Worker,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    pub task: String,
    /// Asignación de input `campo=valor`; el valor se interpreta como JSON y
    /// si no lo es, como texto.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub set: Vec<String>,
    /// Archivo JSON con un objeto `{campo: valor}`.
    #[arg(long)]
    pub inputs: Option<PathBuf>,
    #[arg(long, short)]
    pub worker: Option<String>,
    #[arg(long)]
    pub max_workers: Option<usize>,
    /// Ubicación de cache adicional, consultada antes que la raíz propia.
    #[arg(long = "location")]
    pub locations: Vec<PathBuf>,
    /// Escribe los mensajes de auditoría en este directorio.
    #[arg(long)]
    pub audit_dir: Option<PathBuf>,
    /// Envía los mensajes de auditoría por POST a esta URL.
    #[arg(long)]
    pub audit_url: Option<String>,
    #[arg(long, env = "LABFLOW_AUDIT_TOKEN", hide_env_values = true)]
    pub audit_token: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Fingerprints con resultado guardado.
    List,
    /// Resultado guardado de un fingerprint.
    Show { fingerprint: String },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Audit(#[from] AuditDeliveryError),
    #[error("unknown task '{0}'; available: {available}", available = TASK_NAMES.join(", "))]
    UnknownTask(String),
    #[error("invalid assignment '{0}': expected FIELD=VALUE")]
    Assignment(String),
    #[error("'{0}' is not a fingerprint")]
    InvalidFingerprint(String),
    #[error("no cached result for {0}")]
    NotFound(String),
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Engine(e) if e.is_task_failure() => 3,
            Self::Engine(EngineError::UnknownBackend { .. }) => 2,
            Self::UnknownTask(_) | Self::Assignment(_) | Self::Config(_) | Self::InvalidFingerprint(_) => 2,
            Self::NotFound(_) => 4,
            _ => 5,
        }
    }
}

pub fn execute(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    let mut config = RunnerConfig::from_env()?;
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    match cli.command {
        Command::Run(args) => run(config, args, out),
        Command::Describe { task } => {
            write!(out, "{}", build_task(&task)?.describe())?;
            Ok(())
        }
        Command::Tasks => {
            for name in TASK_NAMES {
                writeln!(out, "{name}")?;
            }
            Ok(())
        }
        Command::Workers => {
            for name in standard_registry().names() {
                writeln!(out, "{name}")?;
            }
            Ok(())
        }
        Command::Cache { action: CacheAction::List } => {
            let store = FsResultStore::new();
            for fp in store.entries(&config.cache_dir)? {
                match store.load(&fp, std::slice::from_ref(&config.cache_dir)) {
                    Ok(Some(result)) => writeln!(out, "{fp}  {}", json!(result.output))?,
                    Ok(None) => writeln!(out, "{fp}")?,
                    Err(e) => {
                        warn!("skipping cache entry {fp}: {e}");
                        writeln!(out, "{fp}  <corrupt: {e}>")?
                    }
                }
            }
            Ok(())
        }
        Command::Cache { action: CacheAction::Show { fingerprint } } => {
            let fp = Fingerprint::parse(&fingerprint).ok_or_else(|| CliError::InvalidFingerprint(fingerprint.clone()))?;
            let result = FsResultStore::new().load(&fp, std::slice::from_ref(&config.cache_dir))?
                                             .ok_or(CliError::NotFound(fingerprint))?;
            writeln!(out, "{}", pretty(&json!(result)))?;
            Ok(())
        }
        Command::Worker => {
            let served = serve(io::stdin().lock(), out, |name| catalog::task(name).and_then(Result::ok))?;
            debug!("worker {} served {served} request(s)", std::process::id());
            Ok(())
        }
    }
}

fn run(mut config: RunnerConfig, args: RunArgs, out: &mut impl Write) -> Result<(), CliError> {
    if let Some(worker) = args.worker {
        config.worker = worker;
    }
    if let Some(n) = args.max_workers {
        config.max_workers = n.max(1);
    }
    let mut task = build_task(&args.task)?;
    if let Some(path) = &args.inputs {
        task.load_inputs_file(path)?;
    }
    task.set_inputs(parse_assignments(&args.set)?)?;

    let targets = AuditTargets { dir: args.audit_dir,
                                 url: args.audit_url,
                                 auth: args.audit_token.map(RemoteAuth::Bearer).unwrap_or_default() };
    let auditor = configured_auditor(&config, targets)?;

    let runner = TaskRunnerBuilder::from_config(&config, &standard_registry())?.auditor(auditor)
                                                                              .build();
    info!("running '{}' with worker '{}'", task.name(), config.worker);
    let outcome = runner.run(&task, &args.locations);
    if let Some(backend) = runner.backend() {
        backend.shutdown();
    }
    let report = outcome?;
    let summary = json!({
        "task": task.name(),
        "fingerprint": report.fingerprint,
        "cache_hit": report.cache_hit,
        "backend": report.backend,
        "output_dir": report.output_dir,
        "output": report.result.output,
    });
    writeln!(out, "{}", pretty(&summary))?;
    Ok(())
}

fn build_task(name: &str) -> Result<lab_core::Task, CliError> {
    Ok(catalog::task(name).ok_or_else(|| CliError::UnknownTask(name.to_string()))??)
}

/// `campo=valor` → (campo, valor JSON). Un valor que no es JSON válido se toma
/// como string.
pub fn parse_assignments(raw: &[String]) -> Result<IndexMap<String, Value>, CliError> {
    raw.iter()
       .map(|item| {
           let (field, value) = item.split_once('=')
                                    .filter(|(f, _)| !f.trim().is_empty())
                                    .ok_or_else(|| CliError::Assignment(item.clone()))?;
           let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
           Ok((field.trim().to_string(), value))
       })
       .collect()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
