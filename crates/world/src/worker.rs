//! Worker pool for heavy, pure jobs.
//!
//! The tick thread copies (or moves) the inputs into a typed request,
//! workers compute and move the outputs back. Workers hold nothing but a
//! shared read-only registry and the seeded generator; they never touch the
//! column map. Cancelled request ids are filtered when replies drain, so a
//! stale reply from an unloaded column is dropped on the floor.

use crate::coords::SubChunkPos;
use crate::relight::{relight_column, ColumnBlockSnapshot, ColumnRelightResult};
use crate::subchunk::SubChunk;
use crate::terrain::WorldGenerator;
use crossbeam_channel::{unbounded, Receiver, Sender};
use slopworld_core::BlockRegistry;
use slopworld_mesh::{mesh_sub_chunk, MeshBuffers, MeshInput};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{trace, warn};

/// Monotonic id correlating requests with replies.
pub type RequestId = u64;

/// Job submitted to the pool.
pub enum WorkerRequest {
    GenerateSub {
        id: RequestId,
        pos: SubChunkPos,
    },
    MeshSub {
        id: RequestId,
        pos: SubChunkPos,
        input: MeshInput,
    },
    RelightColumn {
        id: RequestId,
        snapshot: ColumnBlockSnapshot,
    },
}

impl WorkerRequest {
    fn id(&self) -> RequestId {
        match self {
            WorkerRequest::GenerateSub { id, .. }
            | WorkerRequest::MeshSub { id, .. }
            | WorkerRequest::RelightColumn { id, .. } => *id,
        }
    }
}

/// Completed job, outputs moved back to the tick thread.
pub enum WorkerReply {
    SubGenerated {
        id: RequestId,
        pos: SubChunkPos,
        sub: Box<SubChunk>,
    },
    MeshBuilt {
        id: RequestId,
        pos: SubChunkPos,
        mesh: MeshBuffers,
    },
    ColumnRelit {
        id: RequestId,
        result: ColumnRelightResult,
    },
    /// The job panicked; the requester may re-queue the work.
    Failed {
        id: RequestId,
        what: String,
    },
}

impl WorkerReply {
    pub fn id(&self) -> RequestId {
        match self {
            WorkerReply::SubGenerated { id, .. }
            | WorkerReply::MeshBuilt { id, .. }
            | WorkerReply::ColumnRelit { id, .. }
            | WorkerReply::Failed { id, .. } => *id,
        }
    }
}

/// Fixed pool of stateless worker threads.
pub struct WorkerPool {
    request_tx: Option<Sender<WorkerRequest>>,
    reply_rx: Receiver<WorkerReply>,
    handles: Vec<JoinHandle<()>>,
    next_id: RequestId,
    cancelled: HashSet<RequestId>,
}

impl WorkerPool {
    pub fn new(
        threads: usize,
        generator: Arc<WorldGenerator>,
        registry: Arc<BlockRegistry>,
    ) -> Self {
        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (reply_tx, reply_rx) = unbounded::<WorkerReply>();

        let mut handles = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let request_rx: Receiver<WorkerRequest> = request_rx.clone();
            let reply_tx: Sender<WorkerReply> = reply_tx.clone();
            let generator = generator.clone();
            let registry = registry.clone();
            let handle = std::thread::Builder::new()
                .name(format!("world-worker-{index}"))
                .spawn(move || {
                    while let Ok(request) = request_rx.recv() {
                        let id = request.id();
                        let reply = catch_unwind(AssertUnwindSafe(|| {
                            run_request(request, &generator, &registry)
                        }))
                        .unwrap_or_else(|panic| WorkerReply::Failed {
                            id,
                            what: panic_message(panic),
                        });
                        if reply_tx.send(reply).is_err() {
                            break; // Pool dropped; nothing left to report to.
                        }
                    }
                })
                .expect("spawning worker thread");
            handles.push(handle);
        }

        Self {
            request_tx: Some(request_tx),
            reply_rx,
            handles,
            next_id: 0,
            cancelled: HashSet::new(),
        }
    }

    /// Submit a job; the closure receives the assigned request id.
    pub fn submit(&mut self, build: impl FnOnce(RequestId) -> WorkerRequest) -> RequestId {
        self.next_id += 1;
        let id = self.next_id;
        let request = build(id);
        debug_assert_eq!(request.id(), id);
        if let Some(tx) = &self.request_tx {
            if tx.send(request).is_err() {
                warn!(id, "worker pool is shut down; dropping request");
            }
        }
        id
    }

    /// Mark a request cancelled; its reply will be discarded on arrival.
    pub fn cancel(&mut self, id: RequestId) {
        self.cancelled.insert(id);
    }

    /// Next completed reply, skipping cancelled ones.
    pub fn try_recv(&mut self) -> Option<WorkerReply> {
        while let Ok(reply) = self.reply_rx.try_recv() {
            if self.cancelled.remove(&reply.id()) {
                trace!(id = reply.id(), "discarding reply from cancelled job");
                continue;
            }
            return Some(reply);
        }
        None
    }

    /// Number of requests submitted so far (monotonic).
    pub fn submitted(&self) -> u64 {
        self.next_id
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain and exit.
        self.request_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_request(
    request: WorkerRequest,
    generator: &WorldGenerator,
    registry: &BlockRegistry,
) -> WorkerReply {
    match request {
        WorkerRequest::GenerateSub { id, pos } => {
            let mut sub = generator.generate_sub(pos);
            let fully_opaque = sub.compute_fully_opaque(registry);
            sub.set_fully_opaque(fully_opaque);
            WorkerReply::SubGenerated {
                id,
                pos,
                sub: Box::new(sub),
            }
        }
        WorkerRequest::MeshSub { id, pos, input } => WorkerReply::MeshBuilt {
            id,
            pos,
            mesh: mesh_sub_chunk(&input, registry),
        },
        WorkerRequest::RelightColumn { id, snapshot } => WorkerReply::ColumnRelit {
            id,
            result: relight_column(&snapshot, registry),
        },
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker job panicked".to_string()
    }
}
