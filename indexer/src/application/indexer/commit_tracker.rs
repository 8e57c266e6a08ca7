//! Orders block writes by id.
//!
//! Block tasks fetch and resolve concurrently, but each one waits for its predecessor to be
//! committed before writing anything. The tracker holds the next id allowed to write.
//!
//! Writers of unfinalized tail blocks share the tracker's write lock with the walker, so a tail
//! write either lands before the walker's write of the same id or sees it committed.

use tokio::sync::{watch, Mutex, MutexGuard};

use crate::domain::errors::BlockProcessorError;

#[derive(Debug)]
pub struct CommitTracker {
    next: watch::Sender<u64>,
    writes: Mutex<()>,
}

impl CommitTracker {
    /// Tracker whose first writable id is `next_id`
    pub fn new(next_id: u64) -> Self {
        let (next, _) = watch::channel(next_id);
        Self {
            next,
            writes: Mutex::new(()),
        }
    }

    /// Held for the whole write of one block
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().await
    }

    pub fn next_id(&self) -> u64 {
        *self.next.borrow()
    }

    /// Highest committed id of this run, `None` before the first commit from genesis
    pub fn last_committed(&self) -> Option<u64> {
        self.next_id().checked_sub(1)
    }

    /// Waits until every id below `id` is committed.
    ///
    /// Returns `Cancelled` once `cancel` turns true or its sender is gone.
    pub async fn wait_for_turn(
        &self,
        id: u64,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), BlockProcessorError> {
        let mut next = self.next.subscribe();
        loop {
            if *next.borrow_and_update() >= id {
                return Ok(());
            }
            if *cancel.borrow_and_update() {
                return Err(BlockProcessorError::Cancelled);
            }
            tokio::select! {
                changed = next.changed() => {
                    if changed.is_err() {
                        return Err(BlockProcessorError::Cancelled);
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() {
                        return Err(BlockProcessorError::Cancelled);
                    }
                }
            }
        }
    }

    /// Records `id` as committed. Only the id whose turn it is can advance the tracker.
    pub fn mark_committed(&self, id: u64) -> bool {
        self.next.send_if_modified(|next| {
            if *next == id {
                *next = id + 1;
                true
            } else {
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.next.subscribe()
    }
}
