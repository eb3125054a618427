//! Background compile workers.
//!
//! A fixed set of threads pulling [`VariantKey`]s off a `flume` channel and
//! compiling them into the shared cache. Closing the channel stops the pool.

use std::sync::Arc;
use std::thread;

use log::{debug, error};

use super::VariantKey;
use super::variant_cache::CacheShared;
use crate::errors::Result;

struct Worker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: Option<flume::Sender<VariantKey>>,
}

impl WorkerPool {
    pub(crate) fn new(size: usize, shared: &Arc<CacheShared>) -> Result<Self> {
        let (sender, receiver) = flume::unbounded::<VariantKey>();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let shared = Arc::clone(shared);
            let handle = thread::Builder::new()
                .name(format!("prism-shader-{id}"))
                .spawn(move || {
                    // `recv` fails once every sender is gone.
                    while let Ok(key) = receiver.recv() {
                        shared.compile_queued(key);
                    }
                    debug!("[Shaders] worker {id} stopped");
                })?;
            workers.push(Worker {
                id,
                handle: Some(handle),
            });
        }

        Ok(Self {
            workers,
            sender: Some(sender),
        })
    }

    pub fn submit(&self, key: VariantKey) -> Result<()> {
        match &self.sender {
            Some(sender) => Ok(sender.send(key)?),
            None => Err(crate::errors::PrismError::WorkerPool(
                "worker pool is shut down".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Closes the queue and joins every worker. Queued keys still drain.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());

        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take()
                && handle.join().is_err()
            {
                error!("[Shaders] worker {} panicked", worker.id);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
