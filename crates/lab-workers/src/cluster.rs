//! Backend distribuido.
//!
//! `ClusterBackend` es el cliente: registra el trabajo, obtiene el handle y
//! despacha de forma asíncrona a través de un `ClusterTransport`. Cualquier
//! fallo del lado del cluster (scheduler inalcanzable, nodo perdido) llega al
//! llamador por `WorkerHandle::result()` como `WorkerError::Cluster`, igual que
//! un fallo local; `submit` sólo falla si el backend ya está cerrado.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use dashmap::DashMap;
use lab_core::worker::{JobTracker, PreparedJob};
use lab_core::{Job, WorkerBackend, WorkerError, WorkerHandle};
use log::{debug, info, warn};
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

/// Trabajo que el transporte no pudo entregar; se devuelve al cliente para
/// que el error llegue al handle.
pub struct Rejected {
    pub job: PreparedJob,
    pub reason: String,
}

impl Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("reason", &self.reason).finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ClusterTransport: Send + Sync + Debug {
    /// Dirección del scheduler.
    fn address(&self) -> &str;

    /// Entrega el trabajo al scheduler. Una vez aceptado, el transporte es
    /// responsable de que el trabajo se ejecute o se abandone con un error.
    async fn dispatch(&self, id: Uuid, job: PreparedJob) -> Result<(), Rejected>;
}

pub struct ClusterBackend {
    transport: Arc<dyn ClusterTransport>,
    runtime: Option<Runtime>,
    tracker: JobTracker,
}

impl Debug for ClusterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterBackend")
         .field("scheduler", &self.transport.address())
         .field("in_flight", &self.tracker.in_flight())
         .finish()
    }
}

impl ClusterBackend {
    pub const NAME: &'static str = "cluster";

    pub fn new(transport: Arc<dyn ClusterTransport>) -> Result<Self, WorkerError> {
        let runtime = Builder::new_multi_thread().worker_threads(1)
                                                 .thread_name("labflow-cluster-client")
                                                 .enable_all()
                                                 .build()
                                                 .map_err(|e| WorkerError::Setup(e.to_string()))?;
        info!("cluster client connected to {}", transport.address());
        Ok(Self { transport,
                  runtime: Some(runtime),
                  tracker: JobTracker::new() })
    }
}

impl WorkerBackend for ClusterBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn submit(&self, job: Job) -> Result<WorkerHandle, WorkerError> {
        let runtime = self.runtime
                          .as_ref()
                          .ok_or_else(|| WorkerError::ShutDown(Self::NAME.to_string()))?;
        let (handle, prepared) = self.tracker.prepare(Self::NAME, job)?;
        let transport = self.transport.clone();
        let id = Uuid::new_v4();
        runtime.spawn(async move {
                   if let Err(rejected) = transport.dispatch(id, prepared).await {
                       warn!("dispatch of {id} to {} failed: {}", transport.address(), rejected.reason);
                       rejected.job.abandon(WorkerError::Cluster(rejected.reason));
                   }
               });
        Ok(handle)
    }

    fn shutdown(&self) {
        if self.tracker.close() {
            debug!("cluster client shutting down, {} job(s) in flight", self.tracker.in_flight());
        }
        self.tracker.wait_idle();
    }

    fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }
}

impl Drop for ClusterBackend {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

struct Node {
    tx: Mutex<Option<Sender<(Uuid, PreparedJob)>>>,
    alive: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Scheduler en proceso con `nodes` nodos worker (un hilo cada uno) y reparto
/// round-robin. Sirve de cluster de desarrollo y permite inyectar fallos:
/// rechazar despachos o perder un nodo con trabajo encolado.
pub struct LocalCluster {
    address: String,
    nodes: Vec<Node>,
    next: AtomicUsize,
    assignments: Arc<DashMap<Uuid, usize>>,
    reject_next: AtomicUsize,
}

impl Debug for LocalCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCluster")
         .field("address", &self.address)
         .field("nodes", &self.nodes.len())
         .field("live_nodes", &self.live_nodes())
         .field("assigned", &self.assignments.len())
         .finish()
    }
}

impl LocalCluster {
    pub fn start(address: impl Into<String>, nodes: usize) -> Result<Self, WorkerError> {
        let address = address.into();
        let assignments = Arc::new(DashMap::new());
        let mut started = Vec::with_capacity(nodes.max(1));
        for index in 0..nodes.max(1) {
            let (tx, rx) = mpsc::channel::<(Uuid, PreparedJob)>();
            let alive = Arc::new(AtomicBool::new(true));
            let node_alive = alive.clone();
            let node_assignments: Arc<DashMap<Uuid, usize>> = assignments.clone();
            let thread = thread::Builder::new().name(format!("labflow-node-{index}"))
                                               .spawn(move || {
                                                   for (id, job) in rx {
                                                       if node_alive.load(Ordering::Acquire) {
                                                           job.run();
                                                       } else {
                                                           job.abandon(WorkerError::Cluster(format!("worker node {index} lost while holding {id}")));
                                                       }
                                                       node_assignments.remove(&id);
                                                   }
                                               })
                                               .map_err(|e| WorkerError::Setup(e.to_string()))?;
            started.push(Node { tx: Mutex::new(Some(tx)),
                                alive,
                                thread: Mutex::new(Some(thread)) });
        }
        debug!("local cluster {address} started with {} node(s)", started.len());
        Ok(Self { address,
                  nodes: started,
                  next: AtomicUsize::new(0),
                  assignments,
                  reject_next: AtomicUsize::new(0) })
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive.load(Ordering::Acquire)).count()
    }

    /// Trabajos entregados a un nodo que todavía no terminaron.
    pub fn assigned(&self) -> usize {
        self.assignments.len()
    }

    /// Los próximos `count` despachos fallan como si el scheduler no
    /// respondiera.
    pub fn reject_next(&self, count: usize) {
        self.reject_next.store(count, Ordering::Release);
    }

    /// Marca el nodo como perdido: el trabajo que tenga encolado se abandona
    /// con error y no recibe trabajo nuevo.
    pub fn kill_node(&self, index: usize) {
        if let Some(node) = self.nodes.get(index) {
            node.alive.store(false, Ordering::Release);
            warn!("local cluster {}: node {index} marked as lost", self.address);
        }
    }

    fn take_rejection(&self) -> bool {
        self.reject_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn pick_node(&self) -> Option<usize> {
        let total = self.nodes.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        (0..total).map(|offset| (start + offset) % total)
                  .find(|&i| self.nodes[i].alive.load(Ordering::Acquire))
    }
}

#[async_trait]
impl ClusterTransport for LocalCluster {
    fn address(&self) -> &str {
        &self.address
    }

    async fn dispatch(&self, id: Uuid, job: PreparedJob) -> Result<(), Rejected> {
        if self.take_rejection() {
            return Err(Rejected { job,
                                  reason: format!("scheduler {} unreachable", self.address) });
        }
        let Some(index) = self.pick_node() else {
            return Err(Rejected { job,
                                  reason: format!("no live workers at {}", self.address) });
        };
        let guard = match self.nodes[index].tx.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(Rejected { job,
                                      reason: format!("node {index} is poisoned") })
            }
        };
        let Some(tx) = guard.as_ref() else {
            return Err(Rejected { job,
                                  reason: format!("scheduler {} is stopped", self.address) });
        };
        self.assignments.insert(id, index);
        if let Err(mpsc::SendError((_, job))) = tx.send((id, job)) {
            self.assignments.remove(&id);
            return Err(Rejected { job,
                                  reason: format!("node {index} disconnected") });
        }
        debug!("job {id} assigned to node {index}");
        Ok(())
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        for node in &self.nodes {
            if let Ok(mut tx) = node.tx.lock() {
                tx.take();
            }
        }
        for node in &self.nodes {
            let handle = node.thread.lock().ok().and_then(|mut t| t.take());
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!("local cluster node thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(nodes: usize) -> (Arc<LocalCluster>, ClusterBackend) {
        let cluster = Arc::new(LocalCluster::start("inproc://test", nodes).unwrap());
        let backend = ClusterBackend::new(cluster.clone()).unwrap();
        (cluster, backend)
    }

    #[test]
    fn runs_jobs_on_nodes() {
        let (cluster, backend) = backend(2);
        let handles: Vec<_> = (0..4).map(|i| backend.submit(Box::new(move || Ok(json!(i * i)))).unwrap())
                                    .collect();
        let got: Vec<_> = handles.into_iter().map(|h| h.result().unwrap()).collect();
        assert_eq!(got, vec![json!(0), json!(1), json!(4), json!(9)]);
        backend.shutdown();
        assert_eq!(cluster.assigned(), 0);
    }

    #[test]
    fn unreachable_scheduler_surfaces_through_handle() {
        let (cluster, backend) = backend(1);
        cluster.reject_next(1);
        let handle = backend.submit(Box::new(|| Ok(json!("never")))).unwrap();
        match handle.result() {
            Err(WorkerError::Cluster(reason)) => assert!(reason.contains("unreachable")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // el siguiente despacho ya no se rechaza
        assert_eq!(backend.submit(Box::new(|| Ok(json!(1)))).unwrap().result(), Ok(json!(1)));
    }

    #[test]
    fn lost_nodes_fail_jobs_with_cluster_error() {
        let (cluster, backend) = backend(1);
        cluster.kill_node(0);
        assert_eq!(cluster.live_nodes(), 0);
        let handle = backend.submit(Box::new(|| Ok(json!(0)))).unwrap();
        assert!(matches!(handle.result(), Err(WorkerError::Cluster(_))));
        backend.shutdown();
        assert_eq!(backend.in_flight(), 0);
    }
}
