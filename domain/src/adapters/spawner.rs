use std::sync::Mutex;

use crate::{BoxTask, TaskSpawner};

/// Spawner that holds detached tasks until the test drives them, so the
/// outcome of fire-and-forget work can be asserted deterministically.
#[derive(Default)]
pub struct CollectingSpawner {
    tasks: Mutex<Vec<BoxTask>>,
}

impl CollectingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Run every collected task to completion, in spawn order.
    pub async fn run_pending(&self) {
        let drained: Vec<BoxTask> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => return,
        };
        for task in drained {
            task.await;
        }
    }
}

impl TaskSpawner for CollectingSpawner {
    fn spawn(&self, task: BoxTask) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }
}
