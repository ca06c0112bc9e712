use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument};

use crate::error::NvdError;

/// Runs per-feed operations concurrently, never more than `limit` at once.
///
/// Every item runs to completion regardless of how its siblings fare; the
/// outcomes come back aligned with the input order.
#[derive(Debug, Clone)]
pub struct FeedExecutor {
    semaphore: Arc<Semaphore>,
}

impl FeedExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    #[instrument(skip(self, items, op), fields(items = items.len()))]
    pub async fn run_all<T, O, F, Fut>(&self, items: Vec<T>, op: F) -> Vec<Result<O, NvdError>>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, NvdError>> + Send + 'static,
    {
        let total = items.len();
        let op = Arc::new(op);
        let mut set = JoinSet::new();

        for (position, item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&self.semaphore);
            let op = Arc::clone(&op);
            set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => op(item).await,
                    Err(e) => Err(NvdError::Task(format!("Semaphore error: {}", e))),
                };
                (position, outcome)
            });
        }

        let mut slots: Vec<Option<Result<O, NvdError>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((position, outcome)) => slots[position] = Some(outcome),
                Err(e) => debug!(error = %e, "Task join error"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(NvdError::Task("task panicked or was cancelled".into())))
            })
            .collect()
    }
}
