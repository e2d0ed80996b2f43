use std::{future::Future, time::Duration};

use tokio::{
    task::JoinSet,
    time::{sleep_until, Instant},
};

use crate::error::{AppError, AppResult};

/// Work queue that rate-limits job starts
///
/// A job starts only once the previous one started at least `min_interval` ago
/// and fewer than `max_in_flight` jobs are running. No delay precedes the first
/// job. With `max_in_flight = 1` the queue is strictly sequential: job k+1 is not
/// started until job k has finished.
#[derive(Debug, Clone, Copy)]
pub struct ThrottledQueue {
    min_interval: Duration,
    max_in_flight: usize,
}

impl ThrottledQueue {
    pub fn new(min_interval: Duration, max_in_flight: usize) -> Self {
        Self {
            min_interval,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn sequential(min_interval: Duration) -> Self {
        Self::new(min_interval, 1)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Runs `worker` over `items`, returning results in input order
    ///
    /// The first failing job aborts the run: jobs still in flight are cancelled,
    /// no further jobs are started and its error is returned.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, mut worker: F) -> AppResult<Vec<T>>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(items.len()).collect();
        let mut in_flight = JoinSet::new();
        let mut last_start: Option<Instant> = None;

        for (index, item) in items.into_iter().enumerate() {
            while in_flight.len() >= self.max_in_flight {
                settle_next(&mut in_flight, &mut slots).await?;
            }

            if let Some(previous) = last_start {
                let ready_at = previous + self.min_interval;
                if ready_at > Instant::now() {
                    tracing::debug!(
                        index,
                        wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                        "Throttling next job"
                    );
                    sleep_until(ready_at).await;
                }
            }

            last_start = Some(Instant::now());
            let job = worker(item);
            in_flight.spawn(async move { (index, job.await) });
        }

        while !in_flight.is_empty() {
            settle_next(&mut in_flight, &mut slots).await?;
        }

        slots
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| AppError::Internal("throttled job finished without a result".to_string()))
    }
}

async fn settle_next<T: 'static>(
    in_flight: &mut JoinSet<(usize, AppResult<T>)>,
    slots: &mut [Option<T>],
) -> AppResult<()> {
    match in_flight.join_next().await {
        Some(Ok((index, Ok(value)))) => {
            slots[index] = Some(value);
            Ok(())
        }
        Some(Ok((index, Err(e)))) => {
            tracing::warn!(index, error = %e, "Throttled job failed, aborting remaining jobs");
            in_flight.abort_all();
            Err(e)
        }
        Some(Err(join_error)) => {
            in_flight.abort_all();
            Err(AppError::Internal(format!("throttled job panicked: {}", join_error)))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type StartLog = Arc<Mutex<Vec<(usize, Duration)>>>;

    fn worker(
        origin: Instant,
        log: StartLog,
        work: Duration,
        fail_on: Option<usize>,
    ) -> impl FnMut(usize) -> std::pin::Pin<Box<dyn Future<Output = AppResult<usize>> + Send>> {
        move |item| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push((item, origin.elapsed()));
                tokio::time::sleep(work).await;
                if fail_on == Some(item) {
                    return Err(AppError::ExternalApi(format!("job {} failed", item)));
                }
                Ok(item * 10)
            })
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_starts() {
        let origin = Instant::now();
        let log = StartLog::default();
        let queue = ThrottledQueue::sequential(ms(300));

        let results = queue
            .run(vec![0, 1, 2], worker(origin, log.clone(), Duration::ZERO, None))
            .await
            .unwrap();

        assert_eq!(results, vec![0, 10, 20]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![(0, ms(0)), (1, ms(300)), (2, ms(600))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_jobs_are_not_delayed_further() {
        let origin = Instant::now();
        let log = StartLog::default();
        let queue = ThrottledQueue::sequential(ms(300));

        queue
            .run(vec![0, 1, 2], worker(origin, log.clone(), ms(500), None))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![(0, ms(0)), (1, ms(500)), (2, ms(1000))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_later_jobs() {
        let origin = Instant::now();
        let log = StartLog::default();
        let queue = ThrottledQueue::sequential(ms(300));

        let err = queue
            .run(vec![0, 1, 2, 3], worker(origin, log.clone(), ms(10), Some(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExternalApi(ref msg) if msg == "job 1 failed"));
        let started: Vec<usize> = log.lock().unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(started, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_slots_keep_input_order() {
        let origin = Instant::now();
        let log = StartLog::default();
        let queue = ThrottledQueue::new(ms(100), 2);

        let results = queue
            .run(vec![0, 1, 2], worker(origin, log.clone(), ms(1000), None))
            .await
            .unwrap();

        assert_eq!(results, vec![0, 10, 20]);
        // The third job waits for a free slot, not just the interval
        assert_eq!(
            *log.lock().unwrap(),
            vec![(0, ms(0)), (1, ms(100)), (2, ms(1000))]
        );
    }

    #[tokio::test]
    async fn test_empty_input() {
        let queue = ThrottledQueue::sequential(ms(300));
        let results: Vec<usize> = queue
            .run(Vec::<usize>::new(), |item| async move { Ok(item) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_zero_in_flight_is_clamped() {
        assert_eq!(ThrottledQueue::new(ms(0), 0).max_in_flight(), 1);
    }
}
