//! Bounded multi-consumer work queue with completion tracking.
//!
//! A [`StageQueue`] couples a bounded `tokio` channel with an unfinished-work
//! counter. Every push counts one unit of work and every consumer calls
//! [`StageQueue::task_done`] once it has finished with a popped value (including
//! pushing whatever it produced downstream). [`StageQueue::join`] resolves when
//! the counter reaches zero, so a worker that sees the sentinel can wait for its
//! peers' in-flight items before signalling the next stage.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};

/// Bounded queue shared by one stage's producers and the next stage's consumers
pub struct StageQueue<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    unfinished: AtomicUsize,
    all_done: Notify,
}

impl<T: Send> StageQueue<T> {
    /// Create a queue holding at most `capacity` values
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            name,
            tx,
            rx: Mutex::new(rx),
            unfinished: AtomicUsize::new(0),
            all_done: Notify::new(),
        }
    }

    /// Queue name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of values waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether no values are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pushed values not yet marked done
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    /// Push a value, waiting while the queue is full
    pub async fn push(&self, value: T) {
        // Count before sending so a consumer's task_done can never run first
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(value).await.is_err() {
            // The receiver lives in `self`, so this only happens while dropping.
            self.task_done();
            tracing::error!(queue = self.name, "push on closed queue");
        }
    }

    /// Pop the next value, waiting while the queue is empty
    pub async fn pop(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Pop a value only if one is immediately available
    ///
    /// Also returns `None` while another consumer is parked in [`pop`](Self::pop),
    /// which implies the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Mark one popped value as fully processed
    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.all_done.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!(queue = self.name, "task_done called more times than push"),
        }
    }

    /// Wait until every pushed value has been marked done
    pub async fn join(&self) {
        loop {
            let notified = self.all_done.notified();
            tokio::pin!(notified);
            // Register before checking, or a notify between the check and the
            // await would be lost
            notified.as_mut().enable();
            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }
}
