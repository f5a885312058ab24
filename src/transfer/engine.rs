use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{RetryPolicy, TransferError, DEFAULT_CONCURRENCY};
use crate::models::TransferInstruction;

// == Transfer Engine ==
/// Bounded worker pool running one job per transfer instruction.
///
/// The first failing part cancels the run: parts not yet started never
/// start, and parts in flight are interrupted at their next await point.
/// `execute` returns only after every spawned task has finished.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    concurrency: usize,
    retry: RetryPolicy,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl TransferEngine {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs `job` for every instruction, at most `concurrency` at a time,
    /// retrying each part under the engine's policy.
    ///
    /// Results come back in instruction order.
    pub async fn execute<T, F, Fut>(
        &self,
        instructions: Vec<TransferInstruction>,
        job: F,
    ) -> Result<Vec<T>, TransferError>
    where
        T: Send + 'static,
        F: Fn(TransferInstruction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TransferError>> + Send + 'static,
    {
        let total = instructions.len();
        let job = Arc::new(job);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (cancel_tx, _) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let mut tasks = JoinSet::new();

        for (index, instruction) in instructions.into_iter().enumerate() {
            let job = Arc::clone(&job);
            let semaphore = Arc::clone(&semaphore);
            let cancel_tx = Arc::clone(&cancel_tx);
            let mut cancel = cancel_tx.subscribe();
            let retry = self.retry.clone();

            tasks.spawn(async move {
                let part = instruction.part();
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (index, Err(TransferError::Cancelled)),
                    },
                    _ = cancelled(&mut cancel) => return (index, Err(TransferError::Cancelled)),
                };
                if *cancel.borrow() {
                    return (index, Err(TransferError::Cancelled));
                }

                let result = tokio::select! {
                    result = retry.execute(|| (*job)(instruction.clone())) => result,
                    _ = cancelled(&mut cancel) => Err(TransferError::Cancelled),
                };

                if let Err(e) = &result {
                    if !matches!(e, TransferError::Cancelled) {
                        warn!(part, error = %e, "part failed, cancelling transfer");
                        cancel_tx.send_replace(true);
                    }
                }
                drop(permit);
                (index, result)
            });
        }

        let mut results: Vec<(usize, T)> = Vec::with_capacity(total);
        let mut first_error: Option<TransferError> = None;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((index, Ok(value))) => Ok((index, value)),
                Ok((_, Err(e))) => Err(e),
                Err(e) => {
                    cancel_tx.send_replace(true);
                    Err(TransferError::Task(e.to_string()))
                }
            };

            match outcome {
                Ok(done) => results.push(done),
                Err(TransferError::Cancelled) => {
                    if first_error.is_none() {
                        first_error = Some(TransferError::Cancelled);
                    }
                }
                Err(e) => match first_error {
                    None | Some(TransferError::Cancelled) => first_error = Some(e),
                    Some(_) => debug!(error = %e, "additional part failure"),
                },
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, value)| value).collect())
    }
}

/// Resolves once cancellation has been signalled.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Offset, TransferMethod};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn instructions(count: u32) -> Vec<TransferInstruction> {
        (1..=count)
            .map(|part| TransferInstruction {
                method: TransferMethod::Put,
                url: format!("http://store/part/{}", part),
                offset: Some(Offset {
                    part,
                    start: (part as u64 - 1) * 10,
                    end: part as u64 * 10 - 1,
                }),
            })
            .collect()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
    }

    /// Counts attempts per part and the peak number of parts running at once.
    #[derive(Default)]
    struct Probe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        attempts: [AtomicUsize; 8],
        started: AtomicUsize,
    }

    impl Probe {
        fn enter(&self, part: u32) {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.attempts[part as usize].fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_results_in_instruction_order() {
        let engine = TransferEngine::new(3).with_retry(fast_retry());

        let parts = engine
            .execute(instructions(6), |instruction| async move {
                // Later parts finish first
                let part = instruction.part();
                tokio::time::sleep(Duration::from_millis(5 * (7 - part as u64))).await;
                Ok(part)
            })
            .await
            .unwrap();

        assert_eq!(parts, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_forbidden_part_fails_without_retry_and_respects_limit() {
        let probe = Arc::new(Probe::default());
        let engine = TransferEngine::new(2).with_retry(fast_retry());

        let p = Arc::clone(&probe);
        let result = engine
            .execute(instructions(5), move |instruction| {
                let probe = Arc::clone(&p);
                async move {
                    let part = instruction.part();
                    probe.enter(part);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    probe.leave();
                    if part == 3 {
                        Err(TransferError::Permanent { status: 403 })
                    } else {
                        Ok(part)
                    }
                }
            })
            .await;

        assert!(matches!(result, Err(TransferError::Permanent { status: 403 })));
        assert_eq!(probe.attempts[3].load(Ordering::SeqCst), 1);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let probe = Arc::new(Probe::default());
        let engine = TransferEngine::new(2).with_retry(fast_retry());

        let p = Arc::clone(&probe);
        let result = engine
            .execute(instructions(3), move |instruction| {
                let probe = Arc::clone(&p);
                async move {
                    let part = instruction.part();
                    probe.enter(part);
                    probe.leave();
                    if part == 2 && probe.attempts[2].load(Ordering::SeqCst) < 3 {
                        Err(TransferError::Status { status: 503 })
                    } else {
                        Ok(part)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), vec![1, 2, 3]);
        assert_eq!(probe.attempts[2].load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_stops_undispatched_parts() {
        let probe = Arc::new(Probe::default());
        let engine = TransferEngine::new(1).with_retry(fast_retry());

        let p = Arc::clone(&probe);
        let result = engine
            .execute(instructions(5), move |instruction| {
                let probe = Arc::clone(&p);
                async move {
                    probe.enter(instruction.part());
                    probe.leave();
                    Err::<(), _>(TransferError::Permanent { status: 400 })
                }
            })
            .await;

        assert!(matches!(result, Err(TransferError::Permanent { status: 400 })));
        assert_eq!(probe.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_interrupts_in_flight_parts() {
        let finished = Arc::new(AtomicUsize::new(0));
        let engine = TransferEngine::new(4).with_retry(fast_retry());

        let f = Arc::clone(&finished);
        let result = engine
            .execute(instructions(4), move |instruction| {
                let finished = Arc::clone(&f);
                async move {
                    if instruction.part() == 1 {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        return Err(TransferError::Permanent { status: 411 });
                    }
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(TransferError::Permanent { status: 411 })));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_instruction_list() {
        let engine = TransferEngine::default();
        let parts: Vec<u32> = engine
            .execute(Vec::new(), |instruction| async move { Ok(instruction.part()) })
            .await
            .unwrap();
        assert!(parts.is_empty());
    }
}
