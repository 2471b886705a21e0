//! Next-turn task queue
//!
//! Tasks deferred during a turn run at the start of the following one, after
//! whatever synchronous work queued them has returned. There is no delay and
//! no timer; ordering is first-in, first-out.

use std::collections::VecDeque;

/// FIFO of tasks waiting for the next turn
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: VecDeque<T>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Queue a task for the next turn
    pub fn defer(&mut self, task: T) {
        self.queue.push_back(task);
    }

    /// Take every task queued so far
    ///
    /// Tasks deferred while the returned batch runs wait for the turn after.
    pub fn take_ready(&mut self) -> Vec<T> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
