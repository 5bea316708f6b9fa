//! Background persistence slot: at most one flush task per kind in flight.

use std::future::Future;

use tokio::task::JoinHandle;

/// Holds the handle of the last background flush of one kind.
///
/// A new flush is only spawned once the previous one has finished, so two
/// writes to the same table never race.
#[derive(Debug)]
pub(crate) struct FlushSlot {
    name: &'static str,
    task: Option<JoinHandle<()>>,
}

impl FlushSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { name, task: None }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn `flush` unless a previous one is still running.
    ///
    /// Returns `false` when the slot was busy and nothing was spawned.
    pub(crate) fn spawn<F>(&mut self, flush: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_busy() {
            tracing::debug!(flush = self.name, "previous flush still running");
            return false;
        }
        self.task = Some(tokio::spawn(flush));
        true
    }

    /// Wait for the in-flight flush, if any.
    pub(crate) async fn settle(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::error!(flush = self.name, error = %err, "flush task panicked");
        }
    }
}
