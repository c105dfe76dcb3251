//! Concurrent convergence of tracked entities.
use crate::cloud::{ConvergeError, Converger};
use crate::metrics_defs::{CONVERGENCE_FAILURES, DISPATCH_DURATION};
use crate::types::{Identity, TrackedEntity};
use shared::{counter, histogram};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};

#[derive(Clone, Debug)]
pub struct DispatchLimits {
    /// Upper bound on entities converging at the same time.
    pub max_concurrency: usize,
    /// Time a single entity may spend converging once it holds a slot.
    pub unit_timeout: Duration,
    /// Time after which the whole dispatch stops waiting.
    pub deadline: Duration,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Post-convergence state of every entity that converged.
    pub converged: Vec<TrackedEntity>,
    pub failed: Vec<(Identity, ConvergeError)>,
}

pub struct Dispatcher {
    converger: Arc<dyn Converger>,
    limits: DispatchLimits,
}

impl Dispatcher {
    pub fn new(converger: Arc<dyn Converger>, limits: DispatchLimits) -> Self {
        Dispatcher { converger, limits }
    }

    /// Converges every entity in its own task and waits for all of them, or
    /// for the deadline.
    ///
    /// One entity failing, timing out or panicking never affects the others.
    /// Entities still converging at the deadline are aborted and reported as
    /// failed.
    pub async fn dispatch(&self, entities: Vec<TrackedEntity>) -> DispatchReport {
        let started = Instant::now();
        let limiter = Arc::new(Semaphore::new(self.limits.max_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let mut task_identities = HashMap::new();
        let mut outstanding = HashSet::new();

        for entity in entities {
            let identity = entity.identity.clone();
            let converger = self.converger.clone();
            let limiter = limiter.clone();
            let unit_timeout = self.limits.unit_timeout;

            let abort_handle = join_set.spawn(async move {
                let identity = entity.identity.clone();
                // The semaphore is never closed.
                let _permit = limiter.acquire_owned().await;
                let result = tokio::time::timeout(unit_timeout, converger.converge(entity))
                    .await
                    .unwrap_or(Err(ConvergeError::TimedOut(unit_timeout)));
                (identity, result)
            });

            task_identities.insert(abort_handle.id(), identity.clone());
            outstanding.insert(identity);
        }

        let mut report = DispatchReport::default();
        let deadline = sleep(self.limits.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::error!(
                        remaining = outstanding.len(),
                        "Dispatch deadline reached, aborting remaining convergence"
                    );
                    join_set.abort_all();
                    break;
                },
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok((identity, result))) => {
                            outstanding.remove(&identity);
                            match result {
                                Ok(entity) => report.converged.push(entity),
                                Err(e) => report.failed.push((identity, e)),
                            }
                        }
                        Some(Err(e)) => {
                            if let Some(identity) = task_identities.get(&e.id()) {
                                outstanding.remove(identity);
                                report
                                    .failed
                                    .push((identity.clone(), ConvergeError::Panicked(e.to_string())));
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        for identity in outstanding {
            report
                .failed
                .push((identity, ConvergeError::DeadlineExceeded));
        }

        for (identity, error) in &report.failed {
            tracing::error!(identity = %identity, error = %error, "Convergence failed");
        }
        counter!(CONVERGENCE_FAILURES).increment(report.failed.len() as u64);
        histogram!(DISPATCH_DURATION).record(started.elapsed().as_secs_f64());

        report
    }
}
