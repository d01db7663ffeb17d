//! Pool fijo de procesos del sistema operativo.
//!
//! Cada proceso worker es una instancia de un binario que atiende solicitudes
//! con [`serve`]: lee un `TaskRequest` JSON por línea en stdin y responde un
//! `TaskReply` JSON por línea en stdout. El cuerpo de la tarea no debe
//! escribir en stdout.
//!
//! Un cuerpo que aborta o llama a `process::exit` termina sólo su proceso: el
//! handle recibe `WorkerError::Process` y el siguiente trabajo levanta un
//! proceso nuevo.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lab_core::worker::{JobOutcome, JobTracker, TaskReply, TaskRequest};
use lab_core::{Job, Task, WorkerBackend, WorkerError, WorkerHandle, WorkerOptions};
use log::{debug, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Programa y argumentos que levantan un proceso worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerCommand {
    /// Subcomando con el que los binarios de la distribución atienden el pool.
    pub const SUBCOMMAND: &'static str = "worker";

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(),
               args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// El ejecutable actual con el subcomando `worker`.
    pub fn current_exe() -> Result<Self, WorkerError> {
        let exe = std::env::current_exe().map_err(|e| WorkerError::Setup(format!("cannot locate current executable: {e}")))?;
        Ok(Self::new(exe).arg(Self::SUBCOMMAND))
    }

    /// `[programa, args...]`; `None` si está vacío.
    pub fn from_words(words: &[String]) -> Option<Self> {
        let (program, args) = words.split_first()?;
        Some(Self { program: PathBuf::from(program),
                    args: args.to_vec() })
    }

    /// `WorkerOptions::worker_command` o, si no hay, `current_exe()`.
    pub fn from_options(options: &WorkerOptions) -> Result<Self, WorkerError> {
        match options.worker_command.as_deref().and_then(Self::from_words) {
            Some(command) => Ok(command),
            None => Self::current_exe(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn spawn(&self) -> Result<WorkerProcess, WorkerError> {
        let mut child = Command::new(&self.program).args(&self.args)
                                                   .stdin(Stdio::piped())
                                                   .stdout(Stdio::piped())
                                                   .stderr(Stdio::inherit())
                                                   .spawn()
                                                   .map_err(|e| {
                                                       WorkerError::Process(format!("cannot start {}: {e}",
                                                                                    self.program.display()))
                                                   })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WorkerError::Process("worker process started without stdio pipes".into()));
        };
        debug!("started worker process {} ({})", child.id(), self.program.display());
        Ok(WorkerProcess { child,
                           stdin: Some(stdin),
                           stdout: BufReader::new(stdout) })
    }
}

#[derive(Debug)]
struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn call(&mut self, request: &TaskRequest) -> Result<TaskReply, WorkerError> {
        let mut line =
            serde_json::to_string(request).map_err(|e| WorkerError::Process(format!("cannot encode request: {e}")))?;
        line.push('\n');
        let written = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(line.as_bytes()).and_then(|()| stdin.flush()),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed")),
        };
        if let Err(e) = written {
            return Err(self.lost(&format!("cannot send request: {e}")));
        }
        let mut reply = String::new();
        match self.stdout.read_line(&mut reply) {
            Ok(0) => Err(self.lost(&format!("no reply for task '{}'", request.task))),
            Ok(_) => serde_json::from_str(&reply).map_err(|e| {
                                                     WorkerError::Process(format!("invalid reply from worker process {}: {e}",
                                                                                  self.child.id()))
                                                 }),
            Err(e) => Err(self.lost(&format!("cannot read reply: {e}"))),
        }
    }

    /// El proceso murió a mitad de un trabajo; recoge su estado de salida.
    fn lost(&mut self, what: &str) -> WorkerError {
        self.stdin.take();
        let status = match self.child.wait() {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        };
        WorkerError::Process(format!("worker process {} exited ({status}): {what}", self.child.id()))
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // EOF en stdin termina el bucle de `serve`
        self.stdin.take();
        if let Err(e) = self.child.wait() {
            warn!("could not reap worker process {}: {e}", self.child.id());
        }
    }
}

/// Pool de a lo sumo `max_workers` procesos worker. Los procesos se levantan
/// a demanda y se reutilizan entre trabajos; `submit_task` no bloquea.
#[derive(Debug)]
pub struct ProcessPoolBackend {
    command: WorkerCommand,
    // un hilo por proceso en uso: el tamaño del pool acota los procesos vivos
    pool: ThreadPool,
    idle: Arc<Mutex<Vec<WorkerProcess>>>,
    tracker: JobTracker,
}

impl ProcessPoolBackend {
    pub const NAME: &'static str = "pool";

    pub fn new(command: WorkerCommand, max_workers: usize) -> Result<Self, WorkerError> {
        let pool = ThreadPoolBuilder::new().num_threads(max_workers.max(1))
                                           .thread_name(|i| format!("labflow-proc-{i}"))
                                           .build()
                                           .map_err(|e| WorkerError::Setup(e.to_string()))?;
        debug!("process pool for {} with {} slot(s)",
               command.program.display(),
               pool.current_num_threads());
        Ok(Self { command,
                  pool,
                  idle: Arc::new(Mutex::new(Vec::new())),
                  tracker: JobTracker::new() })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    /// Procesos vivos esperando trabajo.
    pub fn idle_processes(&self) -> usize {
        lock_idle(&self.idle).len()
    }

    fn release_idle(&self) {
        let drained: Vec<WorkerProcess> = lock_idle(&self.idle).drain(..).collect();
        if !drained.is_empty() {
            debug!("stopping {} idle worker process(es)", drained.len());
        }
    }
}

fn lock_idle(idle: &Mutex<Vec<WorkerProcess>>) -> MutexGuard<'_, Vec<WorkerProcess>> {
    idle.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dispatch(command: &WorkerCommand, idle: &Mutex<Vec<WorkerProcess>>, request: &TaskRequest) -> JobOutcome {
    let reused = lock_idle(idle).pop();
    let mut process = match reused {
        Some(process) => process,
        None => command.spawn()?,
    };
    // si `call` falla el proceso se descarta y se recoge en su drop
    let reply = process.call(request)?;
    lock_idle(idle).push(process);
    reply.into()
}

impl WorkerBackend for ProcessPoolBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Un closure no cruza la frontera de proceso: sólo `submit_task`.
    fn submit(&self, _job: Job) -> Result<WorkerHandle, WorkerError> {
        if self.tracker.is_closed() {
            return Err(WorkerError::ShutDown(Self::NAME.to_string()));
        }
        Err(WorkerError::Process("process pool only accepts task requests".into()))
    }

    fn submit_task(&self, request: TaskRequest, job: Job) -> Result<WorkerHandle, WorkerError> {
        let (handle, prepared) = self.tracker.prepare(Self::NAME, job)?;
        let command = self.command.clone();
        let idle = self.idle.clone();
        self.pool.spawn(move || prepared.run_with(|_| dispatch(&command, &idle, &request)));
        Ok(handle)
    }

    fn shutdown(&self) {
        if self.tracker.close() {
            debug!("process pool shutting down, {} job(s) in flight", self.tracker.in_flight());
        }
        self.tracker.wait_idle();
        self.release_idle();
    }

    fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }
}

impl Drop for ProcessPoolBackend {
    fn drop(&mut self) {
        self.release_idle();
    }
}

/// Lado worker del protocolo: atiende solicitudes de `input` hasta EOF y
/// devuelve cuántas atendió. `resolve` construye la tarea local por nombre.
pub fn serve<R, W, F>(input: R, mut output: W, resolve: F) -> io::Result<usize>
    where R: BufRead,
          W: Write,
          F: Fn(&str) -> Option<Task>
{
    let mut served = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<TaskRequest>(&line) {
            Ok(request) => match resolve(&request.task) {
                Some(task) => request.execute(task),
                None => TaskReply::Failed(format!("unknown task '{}'", request.task)),
            },
            Err(e) => TaskReply::Failed(format!("malformed request: {e}")),
        };
        let mut encoded = serde_json::to_string(&reply).map_err(io::Error::other)?;
        encoded.push('\n');
        output.write_all(encoded.as_bytes())?;
        output.flush()?;
        served += 1;
    }
    Ok(served)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::hashing::{fingerprint, HashScope};
    use lab_core::{FieldDecl, FieldType, TaskContext};
    use serde_json::{json, Map, Value};
    use std::io::Cursor;

    fn double() -> Task {
        Task::builder("double").input(FieldDecl::required("x", FieldType::Int))
                               .body(|ctx: &TaskContext<'_>| Ok(json!(ctx.input::<i64>("x")? * 2)))
                               .build()
                               .unwrap()
    }

    fn request(x: i64) -> TaskRequest {
        let mut task = double();
        task.set_input("x", x).unwrap();
        TaskRequest::new(&task, std::env::temp_dir(), &fingerprint(&Map::new(), &HashScope::inputs_only()))
    }

    fn replies(raw: &[u8]) -> Vec<TaskReply> {
        String::from_utf8_lossy(raw).lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    #[test]
    fn serve_answers_one_line_per_request() {
        let mut input = String::new();
        for x in [1, 2] {
            input.push_str(&serde_json::to_string(&request(x)).unwrap());
            input.push('\n');
        }
        input.push_str("\nnot json\n");
        let mut unknown = request(3);
        unknown.task = "triple".into();
        input.push_str(&serde_json::to_string(&unknown).unwrap());

        let mut out = Vec::new();
        let served = serve(Cursor::new(input), &mut out, |name| (name == "double").then(double)).unwrap();
        assert_eq!(served, 4);
        let got = replies(&out);
        assert_eq!(got[0], TaskReply::Completed(json!(2)));
        assert_eq!(got[1], TaskReply::Completed(json!(4)));
        assert!(matches!(got[2], TaskReply::Failed(ref m) if m.starts_with("malformed request")));
        assert_eq!(got[3], TaskReply::Failed("unknown task 'triple'".into()));
    }

    #[test]
    fn command_from_options() {
        let opts = WorkerOptions::default().with_worker_command(["/opt/lab", "worker", "--quiet"]);
        let cmd = WorkerCommand::from_options(&opts).unwrap();
        assert_eq!(cmd.program(), Path::new("/opt/lab"));
        assert_eq!(cmd.args(), ["worker".to_string(), "--quiet".to_string()]);
        let fallback = WorkerCommand::from_options(&WorkerOptions::default()).unwrap();
        assert_eq!(fallback.args(), [WorkerCommand::SUBCOMMAND.to_string()]);
        assert_eq!(WorkerCommand::from_words(&[]), None);
    }

    #[test]
    fn bare_closures_are_refused() {
        let backend = ProcessPoolBackend::new(WorkerCommand::new("true"), 1).unwrap();
        let err = backend.submit(Box::new(|| Ok(json!(1)))).unwrap_err();
        assert!(matches!(err, WorkerError::Process(_)));
        backend.shutdown();
        let err = backend.submit(Box::new(|| Ok(json!(1)))).unwrap_err();
        assert_eq!(err, WorkerError::ShutDown("pool".into()));
    }

    fn shell(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh").arg("-c").arg(script)
    }

    #[cfg(unix)]
    #[test]
    fn processes_are_reused_between_jobs() {
        let backend = ProcessPoolBackend::new(shell("while read -r line; do echo '{\"completed\": 42}'; done"), 1).unwrap();
        for x in 0..3 {
            let h = backend.submit_task(request(x), Box::new(|| Ok(Value::Null))).unwrap();
            assert_eq!(h.result(), Ok(json!(42)));
        }
        assert_eq!(backend.idle_processes(), 1);
        backend.shutdown();
        assert_eq!(backend.idle_processes(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn crashed_process_fails_the_job_not_the_pool() {
        let backend = ProcessPoolBackend::new(shell("read -r line; exit 3"), 1).unwrap();
        let h = backend.submit_task(request(1), Box::new(|| Ok(Value::Null))).unwrap();
        match h.result() {
            Err(WorkerError::Process(msg)) => assert!(msg.contains("exit status: 3"), "{msg}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(backend.idle_processes(), 0);

        // el siguiente trabajo levanta otro proceso
        let h = backend.submit_task(request(2), Box::new(|| Ok(Value::Null))).unwrap();
        assert!(matches!(h.result(), Err(WorkerError::Process(_))));
        backend.shutdown();
    }

    #[test]
    fn missing_program_surfaces_through_the_handle() {
        let backend = ProcessPoolBackend::new(WorkerCommand::new("/nonexistent/labflow-worker"), 1).unwrap();
        let h = backend.submit_task(request(1), Box::new(|| Ok(Value::Null))).unwrap();
        assert!(matches!(h.result(), Err(WorkerError::Process(ref m)) if m.contains("cannot start")));
        backend.shutdown();
    }
}
