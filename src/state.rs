use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::database::Models;
use crate::limiter::RateLimiter;
use crate::mailer::Mailer;
use crate::middleware::metrics::Metrics;

/// Shared handles available to every stage and handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub models: Models,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub mailer: Arc<dyn Mailer>,
    pub background: BackgroundTasks,
}

impl AppState {
    /// Must be called inside a tokio runtime; starts the limiter's sweeper.
    pub fn new(config: AppConfig, models: Models, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = RateLimiter::spawn(&config.limiter);
        Self {
            config: Arc::new(config),
            models,
            limiter,
            metrics: Arc::new(Metrics::default()),
            mailer,
            background: BackgroundTasks::default(),
        }
    }
}

/// Work that outlives the request that started it, such as sending mail.
/// Tasks are tracked so shutdown can wait for them. Once `wait` has begun
/// no new tasks are accepted.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
    closed: Arc<AtomicBool>,
}

impl BackgroundTasks {
    /// Returns false, dropping `task` unstarted, when shutdown is already
    /// waiting on the set.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            warn!(task = name, "background task refused after shutdown began");
            return false;
        }
        // Reap finished tasks so the set does not grow with every request
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            task.await;
            tracing::debug!(task = name, "background task finished");
        });
        true
    }

    /// Waits for every tracked task, giving up after `limit`. Returns the
    /// number of tasks still running when the limit passed.
    pub async fn wait(&self, limit: Duration) -> usize {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        if tasks.is_empty() {
            return 0;
        }

        info!(pending = tasks.len(), "waiting for background tasks");
        let drained = tokio::time::timeout(limit, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "background task failed");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => 0,
            Err(_) => {
                let abandoned = tasks.len();
                error!(abandoned, "background tasks did not finish in time");
                abandoned
            }
        }
    }
}
