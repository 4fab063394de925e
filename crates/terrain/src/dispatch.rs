//! Background build dispatcher
//!
//! A small worker pool draining a channel of build requests. Requests are
//! keyed by an opaque id; cancelling removes a request that has not started,
//! while in-flight work always runs to completion. No async runtime: the
//! main thread and the workers meet only at the channel and at the hardware
//! shadow locks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

/// Opaque handle for a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Request {
    id: RequestId,
    job: Job,
}

/// Worker pool for background triangulation and density edits.
pub struct BuildDispatcher {
    sender: Option<Sender<Request>>,
    workers: Vec<JoinHandle<()>>,
    cancelled: Arc<Mutex<HashSet<RequestId>>>,
    next_id: AtomicU64,
}

impl BuildDispatcher {
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Request>();
        let cancelled = Arc::new(Mutex::new(HashSet::new()));

        let workers = (0..worker_count.max(1))
            .map(|n| {
                let receiver: Receiver<Request> = receiver.clone();
                let cancelled = Arc::clone(&cancelled);
                std::thread::Builder::new()
                    .name(format!("terrain-build-{n}"))
                    .spawn(move || {
                        for request in receiver.iter() {
                            let skip = cancelled
                                .lock()
                                .expect("cancel set poisoned")
                                .remove(&request.id);
                            if skip {
                                tracing::debug!(id = request.id.0, "request cancelled");
                                continue;
                            }
                            (request.job)();
                        }
                    })
                    .expect("failed to spawn build worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            cancelled,
            next_id: AtomicU64::new(1),
        }
    }

    /// Queues a job and returns its cancellation handle.
    pub fn enqueue<F>(&self, job: F) -> RequestId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sender
            .as_ref()
            .expect("dispatcher already shut down")
            .send(Request {
                id,
                job: Box::new(job),
            })
            .expect("worker pool hung up");
        id
    }

    /// Marks a request as cancelled. A request that already started is not
    /// interrupted; cancelling it has no effect.
    pub fn cancel(&self, id: RequestId) {
        self.cancelled
            .lock()
            .expect("cancel set poisoned")
            .insert(id);
    }

    /// Drains outstanding work and joins the workers.
    pub fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Err(panic) = worker.join() {
                tracing::error!(?panic, "build worker panicked");
            }
        }
    }
}

impl Drop for BuildDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
