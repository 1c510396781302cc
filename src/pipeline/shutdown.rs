//! Cascading shutdown of a worker pool.

use std::sync::atomic::{AtomicBool, Ordering};

use super::Message;
use super::queue::StageQueue;

/// Per-stage coordinator shared by every worker of one pool
///
/// The first worker to pop the upstream sentinel waits for all accepted work
/// on its input queue to finish, forwards exactly one sentinel downstream and
/// flips the flag. Every worker, first or not, then puts the sentinel back on
/// its input queue for the next peer and exits.
pub struct ShutdownCoordinator<'a, D> {
    stage: &'static str,
    done: AtomicBool,
    downstream: Option<&'a StageQueue<Message<D>>>,
}

impl<'a, D: Send> ShutdownCoordinator<'a, D> {
    /// Coordinator forwarding to `downstream`
    pub fn new(stage: &'static str, downstream: &'a StageQueue<Message<D>>) -> Self {
        Self {
            stage,
            done: AtomicBool::new(false),
            downstream: Some(downstream),
        }
    }

    /// Coordinator for the last stage, which has nothing downstream
    pub fn terminal(stage: &'static str) -> Self {
        Self {
            stage,
            done: AtomicBool::new(false),
            downstream: None,
        }
    }

    /// Whether the downstream sentinel has been sent
    pub fn is_shut_down(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Handle a sentinel popped from `input`
    ///
    /// Returns true for the worker that forwarded the sentinel downstream.
    pub async fn observe_sentinel<U: Send>(&self, input: &StageQueue<Message<U>>) -> bool {
        // The sentinel itself counts as unfinished work; release it first or
        // join would wait on this very call forever
        input.task_done();
        // Peers may still be pushing downstream what they popped earlier
        input.join().await;

        let first = !self.done.swap(true, Ordering::SeqCst);
        if first {
            if let Some(downstream) = self.downstream {
                downstream.push(Message::Shutdown).await;
            }
            tracing::debug!(stage = self.stage, "stage drained, shutdown forwarded");
        }

        // Hand the sentinel on so the next parked peer wakes up and exits too
        input.push(Message::Shutdown).await;
        first
    }
}
