//! Fixed-size worker pool that yields batches in completion order.
//!
//! A [`BatchStream`] is created per parallel generation call. Task
//! descriptors are queued up front; each worker builds its own state once
//! when it starts, then pulls tasks until the queue is empty. Finished
//! batches go through a bounded channel, so at most `2 * workers` batches
//! exist at any moment (one in flight per worker plus the channel).
//!
//! The stream is one-pass. Dropping it early disconnects the output
//! channel; workers stop at their next send and are joined.

use crate::error::GeneratorError;
use crossbeam_channel::{bounded, Receiver};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Lazy, finite sequence of generated batches.
pub struct BatchStream<T> {
    receiver: Option<Receiver<Vec<T>>>,
    workers: Vec<JoinHandle<()>>,
    total_batches: usize,
    delivered: usize,
}

impl<T: Send + 'static> BatchStream<T> {
    /// Start `num_workers` threads processing `tasks`.
    ///
    /// `init` runs once per worker to build its local state; `work` turns
    /// one task into one batch using that state.
    pub fn spawn<Task, State, Init, Work>(
        name: &str,
        tasks: Vec<Task>,
        num_workers: usize,
        init: Init,
        work: Work,
    ) -> Result<Self, GeneratorError>
    where
        Task: Send + 'static,
        Init: Fn() -> State + Send + Sync + 'static,
        Work: Fn(&mut State, Task) -> Vec<T> + Send + Sync + 'static,
    {
        Self::spawn_with(name, tasks, num_workers, init, work, |_, builder, body| {
            builder.spawn(body)
        })
    }

    /// [`BatchStream::spawn`] with the thread creation supplied by the
    /// caller. If any spawn fails, the workers already running are stopped
    /// and joined before the error is returned.
    fn spawn_with<Task, State, Init, Work, Spawner>(
        name: &str,
        tasks: Vec<Task>,
        num_workers: usize,
        init: Init,
        work: Work,
        mut spawn_thread: Spawner,
    ) -> Result<Self, GeneratorError>
    where
        Task: Send + 'static,
        Init: Fn() -> State + Send + Sync + 'static,
        Work: Fn(&mut State, Task) -> Vec<T> + Send + Sync + 'static,
        Spawner: FnMut(usize, thread::Builder, WorkerBody) -> io::Result<JoinHandle<()>>,
    {
        let total_batches = tasks.len();
        let num_workers = num_workers.max(1).min(total_batches.max(1));

        let (task_tx, task_rx) = bounded(total_batches.max(1));
        for task in tasks {
            // capacity == task count, never blocks
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let (batch_tx, batch_rx) = bounded(num_workers);
        let init = Arc::new(init);
        let work = Arc::new(work);

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let batch_tx = batch_tx.clone();
            let init = Arc::clone(&init);
            let work = Arc::clone(&work);

            let body: WorkerBody = Box::new(move || {
                let mut state = init();
                for task in task_rx.iter() {
                    let batch = work(&mut state, task);
                    if batch_tx.send(batch).is_err() {
                        debug!("Worker {} stopping: stream dropped", worker_id);
                        break;
                    }
                }
            });
            let builder = thread::Builder::new().name(format!("{name}-worker-{worker_id}"));

            match spawn_thread(worker_id, builder, body) {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    error!(
                        "Failed to spawn {} worker {}: {}; stopping {} started",
                        name,
                        worker_id,
                        source,
                        workers.len()
                    );
                    // Disconnect the output so blocked workers return
                    drop(batch_rx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(GeneratorError::Spawn(source));
                }
            }
        }

        debug!(
            "Started {} {} workers for {} batches",
            num_workers, name, total_batches
        );

        Ok(Self {
            receiver: Some(batch_rx),
            workers,
            total_batches,
            delivered: 0,
        })
    }
}

impl<T> BatchStream<T> {
    /// Number of batches the stream will yield if no worker fails.
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    fn join_workers(&mut self) -> Result<(), GeneratorError> {
        let mut panicked = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            error!("{} generator worker(s) panicked", panicked);
            return Err(GeneratorError::WorkerPanicked { count: panicked });
        }
        Ok(())
    }
}

impl<T> Iterator for BatchStream<T> {
    type Item = Result<Vec<T>, GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        let receiver = self.receiver.as_ref()?;

        match receiver.recv() {
            Ok(batch) => {
                self.delivered += 1;
                Some(Ok(batch))
            }
            Err(_) => {
                // All workers have exited
                self.receiver = None;
                self.join_workers().err().map(Err)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.receiver.is_none() {
            return (0, Some(0));
        }
        // One extra item for a possible worker failure
        let remaining = self.total_batches.saturating_sub(self.delivered);
        (0, Some(remaining + 1))
    }
}

impl<T> Drop for BatchStream<T> {
    fn drop(&mut self) {
        self.receiver = None;
        let _ = self.join_workers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_task_processed_once() {
        let tasks: Vec<u32> = (0..50).collect();
        let stream =
            BatchStream::spawn("test", tasks, 4, || (), |_, task: u32| vec![task]).unwrap();
        assert_eq!(stream.total_batches(), 50);

        let mut seen = HashSet::new();
        for batch in stream {
            for item in batch.unwrap() {
                assert!(seen.insert(item));
            }
        }
        assert_eq!(seen.len(), 50);
    }

    #[test]
    fn test_state_initialized_once_per_worker() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&inits);
        let tasks: Vec<u32> = (0..40).collect();

        let stream = BatchStream::spawn(
            "test",
            tasks,
            3,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                0usize
            },
            |processed: &mut usize, task: u32| {
                *processed += 1;
                vec![task]
            },
        )
        .unwrap();

        let total: usize = stream.map(|batch| batch.unwrap().len()).sum();
        assert_eq!(total, 40);
        assert_eq!(inits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_task_list() {
        let mut stream =
            BatchStream::spawn("test", Vec::<u32>::new(), 4, || (), |_, t: u32| vec![t]).unwrap();
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let tasks: Vec<u32> = (0..10).collect();
        let stream = BatchStream::spawn("test", tasks, 2, || (), |_, task: u32| {
            if task == 3 {
                panic!("boom");
            }
            vec![task]
        })
        .unwrap();

        let results: Vec<_> = stream.collect();
        assert!(matches!(
            results.last(),
            Some(Err(GeneratorError::WorkerPanicked { count: 1 }))
        ));
    }

    struct ExitCounter(Arc<AtomicUsize>);

    impl Drop for ExitCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_spawn_failure_joins_started_workers() {
        let exited = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exited);
        let tasks: Vec<u32> = (0..100).collect();

        let result = BatchStream::spawn_with(
            "test",
            tasks,
            4,
            move || ExitCounter(Arc::clone(&counter)),
            |_, task: u32| vec![task],
            |worker_id, builder, body| {
                if worker_id == 2 {
                    return Err(io::Error::other("thread limit"));
                }
                builder.spawn(body)
            },
        );

        assert!(matches!(result, Err(GeneratorError::Spawn(_))));
        // Workers 0 and 1 ran to completion before the error came back
        assert_eq!(exited.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_early_drop_does_not_hang() {
        let tasks: Vec<u32> = (0..1_000).collect();
        let mut stream =
            BatchStream::spawn("test", tasks, 4, || (), |_, t: u32| vec![t; 100]).unwrap();
        assert!(stream.next().is_some());
        drop(stream);
    }
}
