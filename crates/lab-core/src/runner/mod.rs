//! Orquestación de una ejecución: fingerprint, cache, auditoría, backend y
//! persistencia.
//!
//! ```text
//! Pending -> CacheCheck -> Done            (hit: sin auditoría ni backend)
//!                       -> Running -> Done   (resultado persistido)
//!                                  -> Failed (nada persistido)
//! ```

mod builder;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde_json::Value;

pub use builder::TaskRunnerBuilder;

use crate::audit::{new_audit_id, now_timestamp, AuditContext, AuditFlags, Auditor};
use crate::errors::{EngineError, EngineResult, WorkerError};
use crate::hashing::{fingerprint_inputs, HashScope};
use crate::model::{Fingerprint, InputSet, RunState, Task, TaskContext, TaskResult};
use crate::store::{with_location, FingerprintLock, ResultStore};
use crate::worker::{execute_job, Job, TaskRequest, WorkerBackend};

/// Resultado de `TaskRunner::run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub result: TaskResult,
    pub fingerprint: Fingerprint,
    /// `true` si el resultado vino de la cache y el cuerpo no se ejecutó.
    pub cache_hit: bool,
    pub state: RunState,
    pub output_dir: PathBuf,
    /// Backend que ejecutó el cuerpo; `None` en hits y ejecución directa.
    pub backend: Option<String>,
}

/// Ejecutor de tareas. Inmutable tras construirse, se puede compartir entre
/// hilos: la concurrencia se obtiene con varias llamadas a `run` en paralelo.
#[derive(Debug)]
pub struct TaskRunner {
    cache_root: PathBuf,
    backend: Option<Arc<dyn WorkerBackend>>,
    store: Arc<dyn ResultStore>,
    auditor: Auditor,
    scope: HashScope,
    exclusive: bool,
}

impl TaskRunner {
    pub fn builder(cache_root: impl Into<PathBuf>) -> TaskRunnerBuilder {
        TaskRunnerBuilder::new(cache_root.into())
    }

    /// Runner con valores por defecto sobre `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self::builder(cache_root).build()
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn backend(&self) -> Option<&Arc<dyn WorkerBackend>> {
        self.backend.as_ref()
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Fingerprint de los inputs actuales de la tarea bajo el scope del runner.
    pub fn fingerprint(&self, task: &Task) -> EngineResult<Fingerprint> {
        task.inputs().ensure_complete()?;
        fingerprint_inputs(task.inputs(), &self.scope.bind_task(task.identity()))
    }

    /// Busca un resultado guardado sin ejecutar nada.
    pub fn cached_result(&self, task: &Task, cache_locations: &[PathBuf]) -> EngineResult<Option<TaskResult>> {
        let fingerprint = self.fingerprint(task)?;
        self.store.load(&fingerprint, &self.locations(task, cache_locations))
    }

    /// Ejecuta la tarea (o recupera su resultado de la cache).
    ///
    /// `cache_locations` se recorre en orden antes que la raíz propia de la
    /// tarea. Errores de hashing, corrupción de cache y de inputs abortan antes
    /// de ejecutar; un fallo del cuerpo se devuelve como `TaskExecution` sin
    /// persistir nada.
    pub fn run(&self, task: &Task, cache_locations: &[PathBuf]) -> EngineResult<RunReport> {
        let pending = match self.begin(task, cache_locations)? {
            Started::Hit(report) => return Ok(report),
            Started::Miss(pending) => pending,
        };
        let job = pending.job(task);
        let outcome = match &self.backend {
            Some(backend) => backend.submit_task(pending.request(task), job)
                                    .map_err(EngineError::from)
                                    .and_then(|handle| handle.result().map_err(|e| execution_error(task, e))),
            None => execute_job(job).map_err(|e| execution_error(task, e)),
        };
        self.finish(task, pending, outcome)
    }

    /// Variante async de `run`: espera el handle con `wait()` en lugar de
    /// bloquear el hilo. La ejecución directa (sin backend) sigue corriendo
    /// en la tarea actual.
    pub async fn run_async(&self, task: &Task, cache_locations: &[PathBuf]) -> EngineResult<RunReport> {
        let pending = match self.begin(task, cache_locations)? {
            Started::Hit(report) => return Ok(report),
            Started::Miss(pending) => pending,
        };
        let job = pending.job(task);
        let outcome = match &self.backend {
            Some(backend) => match backend.submit_task(pending.request(task), job) {
                Ok(handle) => handle.wait().await.map_err(|e| execution_error(task, e)),
                Err(e) => Err(EngineError::from(e)),
            },
            None => execute_job(job).map_err(|e| execution_error(task, e)),
        };
        self.finish(task, pending, outcome)
    }

    /// Pending -> CacheCheck y, en un miss, -> Running con el inicio auditado.
    fn begin(&self, task: &Task, cache_locations: &[PathBuf]) -> EngineResult<Started> {
        let mut state = RunState::Pending;
        // snapshot: el cuerpo ve exactamente los inputs que se hashearon
        let inputs = task.inputs().clone();
        inputs.ensure_complete()?;
        let fingerprint = fingerprint_inputs(&inputs, &self.scope.bind_task(task.identity()))?;
        advance(&mut state, RunState::CacheCheck, task.name());

        let root = self.root_for(task).to_path_buf();
        let locations = self.locations(task, cache_locations);
        if let Some(hit) = self.store.locate(&fingerprint, &locations)? {
            advance(&mut state, RunState::Done, task.name());
            return Ok(Started::Hit(self.hit_report(hit, &fingerprint, state)));
        }

        let lock = if self.exclusive { self.store.lock(&root, &fingerprint)? } else { None };
        if lock.is_some() {
            // otro proceso pudo terminar mientras esperábamos el lock
            if let Some(hit) = self.store.locate(&fingerprint, &locations)? {
                advance(&mut state, RunState::Done, task.name());
                return Ok(Started::Hit(self.hit_report(hit, &fingerprint, state)));
            }
        }

        advance(&mut state, RunState::Running, task.name());
        let output_dir = root.join(fingerprint.as_str());
        fs::create_dir_all(&output_dir).map_err(|e| EngineError::io(&output_dir, e))?;
        let audit_id = new_audit_id();
        let context = AuditContext { task: task.name().to_string(),
                                     fingerprint: Some(fingerprint.clone()) };
        self.auditor.audit(&self.auditor
                               .message(&audit_id, AuditFlags::PROV)
                               .with("startedAtTime", now_timestamp())
                               .with("task", task.name())
                               .with("fingerprint", fingerprint.as_str()),
                           &context);

        info!("running task '{}' ({}) on {}",
              task.name(),
              fingerprint.short(),
              self.backend_name().unwrap_or("caller thread"));
        Ok(Started::Miss(Pending { state,
                                   inputs,
                                   fingerprint,
                                   root,
                                   output_dir,
                                   audit_id,
                                   context,
                                   started: Instant::now(),
                                   _lock: lock }))
    }

    /// Running -> Done | Failed: persiste y audita el fin.
    fn finish(&self, task: &Task, pending: Pending, outcome: EngineResult<Value>) -> EngineResult<RunReport> {
        let Pending { mut state,
                      fingerprint,
                      root,
                      output_dir,
                      audit_id,
                      context,
                      started,
                      _lock,
                      .. } = pending;
        let outcome = outcome.and_then(|value| task.shape_output(value))
                             .and_then(|output| {
                                 let result = TaskResult::new(fingerprint.clone(), output);
                                 self.store.save(&root, &fingerprint, &result)?;
                                 Ok(result)
                             });
        let elapsed = started.elapsed().as_secs_f64();

        let mut end = self.auditor.message(&audit_id, AuditFlags::PROV).with("endedAtTime", now_timestamp());
        match outcome {
            Ok(result) => {
                end = end.with("status", "completed");
                self.auditor.audit(&end, &context);
                self.audit_resources(&audit_id, elapsed, &context);
                advance(&mut state, RunState::Done, task.name());
                let backend = self.backend_name().map(str::to_string);
                Ok(self.report(result, state, false, output_dir, backend))
            }
            Err(err) => {
                warn!("task '{}' ({}) failed: {err}", task.name(), fingerprint.short());
                // sólo se borra si quedó vacío; archivos del cuerpo se conservan
                let _ = fs::remove_dir(&output_dir);
                end = end.with("status", "failed").with("error", err.to_string());
                self.auditor.audit(&end, &context);
                self.audit_resources(&audit_id, elapsed, &context);
                advance(&mut state, RunState::Failed, task.name());
                Err(err)
            }
        }
    }

    fn hit_report(&self, (location, result): (PathBuf, TaskResult), fingerprint: &Fingerprint, state: RunState) -> RunReport {
        let output_dir = location.join(fingerprint.as_str());
        self.report(result, state, true, output_dir, None)
    }

    fn audit_resources(&self, audit_id: &str, elapsed: f64, context: &AuditContext) {
        let msg = self.auditor
                      .message(audit_id, AuditFlags::RESOURCE)
                      .with("wallClockSeconds", elapsed)
                      .with("backend", self.backend_name().unwrap_or("direct"));
        self.auditor.audit(&msg, context);
    }

    fn backend_name(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.name())
    }

    fn root_for<'a>(&'a self, task: &'a Task) -> &'a Path {
        task.cache_dir().unwrap_or(&self.cache_root)
    }

    fn locations(&self, task: &Task, cache_locations: &[PathBuf]) -> Vec<PathBuf> {
        with_location(cache_locations.to_vec(), self.root_for(task))
    }

    fn report(&self,
              result: TaskResult,
              state: RunState,
              cache_hit: bool,
              output_dir: PathBuf,
              backend: Option<String>)
              -> RunReport {
        RunReport { fingerprint: result.fingerprint.clone(),
                    result,
                    cache_hit,
                    state,
                    output_dir,
                    backend }
    }
}

enum Started {
    Hit(RunReport),
    Miss(Pending),
}

/// Estado de una ejecución entre el despacho y la persistencia. Mientras
/// vive retiene el lock exclusivo, si lo hay.
struct Pending {
    state: RunState,
    inputs: InputSet,
    fingerprint: Fingerprint,
    root: PathBuf,
    output_dir: PathBuf,
    audit_id: String,
    context: AuditContext,
    started: Instant,
    _lock: Option<FingerprintLock>,
}

impl Pending {
    fn job(&self, task: &Task) -> Job {
        let body = task.body();
        let inputs = self.inputs.clone();
        let dir = self.output_dir.clone();
        let fp = self.fingerprint.clone();
        Box::new(move || body.call(&TaskContext::new(&inputs, &dir, &fp)))
    }

    fn request(&self, task: &Task) -> TaskRequest {
        TaskRequest::new(task, &self.output_dir, &self.fingerprint)
    }
}

fn execution_error(task: &Task, source: WorkerError) -> EngineError {
    EngineError::TaskExecution { task: task.name().to_string(),
                                 source }
}

fn advance(state: &mut RunState, next: RunState, task: &str) {
    debug_assert!(state.can_transition_to(next), "{state:?} -> {next:?}");
    debug!("task '{task}': {state:?} -> {next:?}");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryChannel;
    use crate::model::{FieldDecl, FieldType, TaskFailure};
    use crate::worker::SerialBackend;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn add_task(calls: Arc<AtomicUsize>) -> Task {
        Task::builder("add").input(FieldDecl::required("a", FieldType::Int))
                            .input(FieldDecl::with_default("b", FieldType::Float, json!(0.1)))
                            .output(FieldDecl::required("out", FieldType::Float))
                            .body(move |ctx: &TaskContext<'_>| {
                                calls.fetch_add(1, Ordering::SeqCst);
                                let a: i64 = ctx.input("a")?;
                                let b: f64 = ctx.input("b")?;
                                Ok(json!(a as f64 + b))
                            })
                            .build()
                            .unwrap()
    }

    #[test]
    fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut task = add_task(calls.clone());
        task.set_input("a", 1).unwrap();
        let runner = TaskRunner::new(dir.path());

        let first = runner.run(&task, &[]).unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.state, RunState::Done);
        assert_eq!(first.result.get_as::<f64>("out").unwrap(), 1.1);
        assert!(first.output_dir.join(crate::constants::RESULT_FILE).is_file());

        let second = runner.run(&task, &[]).unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.result, first.result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.cached_result(&task, &[]).unwrap(), Some(first.result));
    }

    #[test]
    fn failure_is_not_persisted_and_audits_end() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryChannel::new());
        let task = Task::builder("boom").body(|_: &TaskContext<'_>| Err(TaskFailure::new("exploded")))
                                        .build()
                                        .unwrap();
        let runner = TaskRunner::builder(dir.path()).backend(Arc::new(SerialBackend::new()))
                                                    .auditor(Auditor::new(AuditFlags::PROV).with_channel(memory.clone()))
                                                    .build();
        let err = runner.run(&task, &[]).unwrap_err();
        assert!(err.is_task_failure());
        assert_eq!(err.to_string(), "task 'boom' failed: exploded");
        assert_eq!(runner.cached_result(&task, &[]).unwrap(), None);
        let fp = runner.fingerprint(&task).unwrap();
        assert!(!dir.path().join(fp.as_str()).exists());

        let msgs = memory.messages();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].fields.contains_key("startedAtTime"));
        assert_eq!(msgs[1].fields["status"], json!("failed"));
        assert_eq!(msgs[0].id, msgs[1].id);
    }

    #[test]
    fn panicking_body_becomes_task_error() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::builder("panics").body(|_: &TaskContext<'_>| -> Result<Value, TaskFailure> {
                                              panic!("division by zero")
                                          })
                                          .build()
                                          .unwrap();
        let err = TaskRunner::new(dir.path()).run(&task, &[]).unwrap_err();
        assert!(matches!(err, EngineError::TaskExecution { .. }));
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn missing_input_aborts_before_cache_check() {
        let dir = tempfile::tempdir().unwrap();
        let task = add_task(Arc::new(AtomicUsize::new(0)));
        let err = TaskRunner::new(dir.path()).run(&task, &[]).unwrap_err();
        assert!(matches!(err, EngineError::MissingInput(ref f) if f == "a"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn exclusive_runner_takes_lock() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut task = add_task(calls.clone());
        task.set_input("a", 3).unwrap();
        let runner = TaskRunner::builder(dir.path()).exclusive(true).build();
        let report = runner.run(&task, &[]).unwrap();
        assert_eq!(report.result.get_as::<f64>("out").unwrap(), 3.1);
        assert!(runner.run(&task, &[]).unwrap().cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
