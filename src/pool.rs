//! Fixed-size worker pool.
//!
//! Tasks are handed out through one shared bounded channel, so workers compete
//! for the next host and results arrive in completion order. The caller drains
//! results on its own thread; when it stops early, pending tasks are dropped
//! and every worker is joined before `run` returns.

use crate::Result;
use anyhow::anyhow;
use crossbeam_channel::bounded;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `work` over `tasks` and hand the result stream to `consume`.
    ///
    /// The iterator given to `consume` yields exactly one item per task unless
    /// `consume` stops pulling first.
    pub fn run<T, O, W, C, R>(&self, tasks: Vec<T>, work: W, consume: C) -> Result<R>
    where
        T: Send + std::fmt::Display,
        O: Send,
        W: Fn(&T) -> O + Sync,
        C: FnOnce(&mut dyn Iterator<Item = O>) -> R,
    {
        let total = tasks.len();
        let (task_tx, task_rx) = bounded::<T>(total.max(1));
        let (result_tx, result_rx) = bounded::<O>(total.max(1));

        for task in tasks {
            // Capacity equals the task count and no worker has started yet.
            task_tx
                .send(task)
                .map_err(|_| anyhow!("task queue closed before workers started"))?;
        }
        drop(task_tx);

        let work = &work;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.size);
            for worker in 1..=self.size {
                let rx = task_rx.clone();
                let tx = result_tx.clone();
                let handle = thread::Builder::new()
                    .name(format!("fetch-worker-{}", worker))
                    .spawn_scoped(scope, move || {
                        for task in rx.iter() {
                            tracing::debug!(worker, task = %task, "started");
                            let out = work(&task);
                            tracing::debug!(worker, task = %task, "finished");
                            if tx.send(out).is_err() {
                                break;
                            }
                        }
                    })?;
                handles.push(handle);
            }
            // Workers own the remaining senders; the stream ends when they exit.
            drop(result_tx);

            let out = {
                let mut stream = result_rx.iter().take(total);
                consume(&mut stream)
            };

            // Stop handing out work and unblock any worker waiting to send.
            while task_rx.try_recv().is_ok() {}
            drop(result_rx);

            for handle in handles {
                handle
                    .join()
                    .map_err(|_| anyhow!("fetch worker thread panicked"))?;
            }
            Ok(out)
        })
    }
}
