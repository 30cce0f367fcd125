//! looper.rs — single-consumer event loop owning the trainer state
//!
//! Server tasks never touch the population, result matrix, or timeouts
//! directly; they post jobs here and the one consumer runs them FIFO with
//! exclusive access to the state. The queue is double-buffered: posters push
//! into the front buffer under a short lock, the consumer swaps buffers under
//! the same lock and drains the back buffer outside it.
//!
//! Wakeups fire when the first entry lands in an empty queue and again at the
//! batching threshold, so a burst of postings costs one wakeup per batch.

use std::sync::Mutex;

use tokio::sync::Notify;

pub type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Wake the consumer early once this many jobs are queued.
pub const BATCH_THRESHOLD: usize = 64;

pub struct Looper<S> {
    front: Mutex<Vec<Job<S>>>,
    notify: Notify,
}

impl<S> Default for Looper<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Looper<S> {
    pub fn new() -> Self {
        Self {
            front: Mutex::new(Vec::with_capacity(BATCH_THRESHOLD)),
            notify: Notify::new(),
        }
    }

    /// Queue a job; callable from any task or thread.
    pub fn post(&self, job: impl FnOnce(&mut S) + Send + 'static) {
        let mut queue = self.front.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.push(Box::new(job));
        if queue.len() == 1 || queue.len() >= BATCH_THRESHOLD {
            self.notify.notify_one();
        }
    }

    /// Drain jobs forever, each exactly once, in FIFO order.
    pub async fn run(&self, state: &mut S) {
        let mut back: Vec<Job<S>> = Vec::with_capacity(BATCH_THRESHOLD);
        loop {
            loop {
                let notified = self.notify.notified();
                {
                    let mut front =
                        self.front.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    if !front.is_empty() {
                        std::mem::swap(&mut *front, &mut back);
                        break;
                    }
                }
                notified.await;
            }
            for job in back.drain(..) {
                job(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn jobs_run_fifo_with_exclusive_state() {
        let looper: Arc<Looper<Vec<u32>>> = Arc::new(Looper::new());
        for i in 0..10 {
            looper.post(move |seen: &mut Vec<u32>| seen.push(i));
        }
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        looper.post(move |seen: &mut Vec<u32>| {
            let _ = done_tx.send(seen.clone());
        });

        let consumer = looper.clone();
        let handle = tokio::spawn(async move {
            let mut state = Vec::new();
            consumer.run(&mut state).await;
        });

        let seen = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("looper drained in time")
            .unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<u32>>());
        handle.abort();
    }

    #[tokio::test]
    async fn posting_from_other_threads_is_safe() {
        let looper: Arc<Looper<u64>> = Arc::new(Looper::new());
        let mut producers = Vec::new();
        for _ in 0..4 {
            let looper = looper.clone();
            producers.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    looper.post(|count: &mut u64| *count += 1);
                }
            }));
        }
        for p in producers {
            p.join().unwrap();
        }

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        looper.post(move |count: &mut u64| {
            let _ = done_tx.send(*count);
        });

        let consumer = looper.clone();
        let handle = tokio::spawn(async move {
            let mut count = 0u64;
            consumer.run(&mut count).await;
        });

        let count = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("looper drained in time")
            .unwrap();
        assert_eq!(count, 400);
        handle.abort();
    }
}
