//! Bounded pool for fan-out work against storage nodes.

use std::{future::Future, sync::Arc};

use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinHandle},
};

/// Runs submitted futures with at most `limit` of them executing at once.
///
/// Each task acquires a semaphore permit before running and releases it when
/// it settles. `join_all` collects results in submission order and never
/// aborts siblings: tasks report their own failures through their output
/// type.
pub struct TaskPool<T> {
    semaphore: Arc<Semaphore>,
    handles: Vec<JoinHandle<T>>,
}

impl<T: Send + 'static> TaskPool<T> {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            handles: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("pool semaphore is never closed");
            future.await
        }));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Await every task, in submission order.
    pub async fn join_all(self) -> Result<Vec<T>, JoinError> {
        let mut results = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            results.push(handle.await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn concurrency_stays_within_the_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut pool = TaskPool::new(3);
        for i in 0..16u32 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            });
        }

        let results = pool.join_all().await.unwrap();
        assert_eq!(results, (0..16).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failures_do_not_abort_siblings() {
        let mut pool = TaskPool::new(2);
        for i in 0..4u32 {
            pool.spawn(async move {
                if i == 1 {
                    Err("boom")
                } else {
                    Ok(i)
                }
            });
        }

        let results = pool.join_all().await.unwrap();
        assert_eq!(results, vec![Ok(0), Err("boom"), Ok(2), Ok(3)]);
    }
}
