//! The task scheduler seam (spec §6: "To the Task Scheduler").
//!
//! The scheduler only ever drives one job in this core: the optional
//! expired-request housekeeping sweep (spec §9, "Expiry as projection,
//! not sweep"). Correctness never depends on it running; it exists to
//! keep storage tidy on a leader-only cadence.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;

/// Returns whether the calling process is currently the cluster leader.
/// The scheduler invokes a rescheduled job only when this returns true
/// (spec §6: "the scheduler invokes `fn` only on the cluster leader").
pub trait LeaderCheck: Send + Sync {
    fn is_leader(&self) -> bool;
}

impl<F> LeaderCheck for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_leader(&self) -> bool {
        self()
    }
}

/// Always-leader check, useful for single-node deployments and tests.
pub struct AlwaysLeader;

impl LeaderCheck for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

type BoxedJob = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Reschedules named cron jobs, gated by a [`LeaderCheck`].
pub trait TaskScheduler: Send + Sync {
    /// Parse `cron_expr` and run `job` at each firing for as long as the
    /// returned handle is kept alive, skipping firings where `leader`
    /// reports the caller is not the cluster leader.
    fn reschedule(
        &self,
        name: &str,
        cron_expr: &str,
        leader: Arc<dyn LeaderCheck>,
        job: BoxedJob,
    ) -> Result<ScheduledJobHandle, cron::error::Error>;
}

/// Cancels the job when dropped.
pub struct ScheduledJobHandle {
    task: tokio::task::JoinHandle<()>,
}

impl Drop for ScheduledJobHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Default [`TaskScheduler`] backed by `tokio::time::sleep_until` and the
/// `cron` crate's schedule iterator — the same periodic-task shape
/// `umbra-relay`'s `main.rs` uses for its cleanup/heartbeat tasks,
/// generalized from a fixed interval to a parsed cron expression.
pub struct TokioCronScheduler;

impl TaskScheduler for TokioCronScheduler {
    fn reschedule(
        &self,
        name: &str,
        cron_expr: &str,
        leader: Arc<dyn LeaderCheck>,
        job: BoxedJob,
    ) -> Result<ScheduledJobHandle, cron::error::Error> {
        let schedule = Schedule::from_str(cron_expr)?;
        let job_name = name.to_string();

        let task = tokio::spawn(async move {
            loop {
                let next = match schedule.upcoming(Utc).next() {
                    Some(t) => t,
                    None => {
                        tracing::warn!(job = job_name.as_str(), "Cron schedule has no next firing");
                        return;
                    }
                };
                let delay = (next - Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(0));
                tokio::time::sleep(delay).await;

                if !leader.is_leader() {
                    tracing::debug!(job = job_name.as_str(), "Skipping cron firing: not leader");
                    continue;
                }

                tracing::debug!(job = job_name.as_str(), "Cron job firing");
                job().await;
            }
        });

        Ok(ScheduledJobHandle { task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_on_every_second_when_leader() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job_counter = counter.clone();

        let scheduler = TokioCronScheduler;
        let handle = scheduler
            .reschedule(
                "test-job",
                "* * * * * *",
                Arc::new(AlwaysLeader),
                Arc::new(move || {
                    let c = job_counter.clone();
                    Box::pin(async move {
                        c.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        drop(handle);

        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn skips_firing_when_not_leader() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job_counter = counter.clone();

        struct NeverLeader;
        impl LeaderCheck for NeverLeader {
            fn is_leader(&self) -> bool {
                false
            }
        }

        let scheduler = TokioCronScheduler;
        let handle = scheduler
            .reschedule(
                "test-job-not-leader",
                "* * * * * *",
                Arc::new(NeverLeader),
                Arc::new(move || {
                    let c = job_counter.clone();
                    Box::pin(async move {
                        c.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
        drop(handle);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
