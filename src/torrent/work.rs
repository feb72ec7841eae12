use std::sync::Arc;

use crossbeam::queue::SegQueue;

/// The shared backlog of piece indices not yet successfully written.
///
/// Many peer sessions pull from and return to the queue concurrently, so it
/// must be multi-producer multi-consumer and never block: a peer with
/// nothing to do has to keep servicing its event loop. An index is owned by
/// the queue when not in flight and by exactly one peer's work map while in
/// flight; failed work comes back via [`WorkQueue::push`].
#[derive(Clone, Default)]
pub struct WorkQueue {
    inner: Arc<SegQueue<u32>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or returns) a piece index to the backlog.
    pub fn push(&self, index: u32) {
        self.inner.push(index);
    }

    /// Takes one piece index, without blocking.
    pub fn pop(&self) -> Option<u32> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
