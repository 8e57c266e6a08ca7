use std::collections::VecDeque;
use tokio::task::{JoinError, JoinHandle};

/// Bounded queue of spawned block tasks, drained in submission order
#[derive(Debug)]
pub struct InFlightQueue<T> {
    capacity: usize,
    tasks: VecDeque<(u64, JoinHandle<T>)>,
}

impl<T> InFlightQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            tasks: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.capacity
    }

    /// Id of the oldest task still queued
    pub fn oldest_id(&self) -> Option<u64> {
        self.tasks.front().map(|(id, _)| *id)
    }

    /// Queues a task; a full queue hands the task back
    pub fn push(&mut self, id: u64, handle: JoinHandle<T>) -> Result<(), JoinHandle<T>> {
        if self.is_full() {
            return Err(handle);
        }
        self.tasks.push_back((id, handle));
        Ok(())
    }

    /// Waits for the oldest task, whatever the completion order of the others.
    ///
    /// Cancel safe: the task stays queued until it has finished.
    pub async fn pop_oldest(&mut self) -> Option<(u64, Result<T, JoinError>)> {
        let (_, handle) = self.tasks.front_mut()?;
        let result = handle.await;
        let (id, _) = self.tasks.pop_front()?;
        Some((id, result))
    }

    /// Aborts every queued task and returns their ids
    pub fn abort_all(&mut self) -> Vec<u64> {
        self.tasks
            .drain(..)
            .map(|(id, handle)| {
                handle.abort();
                id
            })
            .collect()
    }
}
