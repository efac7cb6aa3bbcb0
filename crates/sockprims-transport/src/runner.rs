use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::{Result, TransportError};

/// A unit of work handed to a [`TaskRunner`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes tasks asynchronously on caller-owned workers.
///
/// Event and receive loops never create threads on their own; they are
/// submitted here, so the caller decides how threads are provisioned.
/// At least one worker must be free for a submitted loop to make progress.
pub trait TaskRunner: Send + Sync {
    /// Submit a task for asynchronous execution.
    fn execute(&self, task: Task) -> Result<()>;
}

impl<F> TaskRunner for F
where
    F: Fn(Task) + Send + Sync,
{
    fn execute(&self, task: Task) -> Result<()> {
        self(task);
        Ok(())
    }
}

/// Runs every task on a freshly spawned, named OS thread.
#[derive(Debug)]
pub struct ThreadRunner {
    name: String,
    spawned: AtomicU64,
}

impl ThreadRunner {
    /// Create a runner whose threads are named `{name}-{n}`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spawned: AtomicU64::new(0),
        }
    }
}

impl Default for ThreadRunner {
    fn default() -> Self {
        Self::new("sockprims")
    }
}

impl TaskRunner for ThreadRunner {
    fn execute(&self, task: Task) -> Result<()> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{n}", self.name);
        debug!(thread = %name, "spawning runner thread");
        std::thread::Builder::new()
            .name(name)
            .spawn(task)
            .map(|_| ())
            .map_err(|err| TransportError::RunnerUnavailable(err.to_string()))
    }
}
