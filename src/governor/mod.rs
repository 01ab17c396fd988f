//! Process-wide token-bucket admission control.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ScribeError;

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// One shared bucket of `capacity` tokens, refilled one token every
/// `window / capacity`.
#[derive(Debug)]
pub struct RateGovernor {
    capacity: u32,
    refill_interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RateGovernor {
    /// `capacity` is raised to 1 if 0.
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1);
        let refill_interval = (window / capacity).max(Duration::from_nanos(1));
        Self {
            capacity,
            refill_interval,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Takes one token, or fails with `RateLimited` carrying the time until
    /// the next token is due.
    pub fn try_acquire(&self) -> Result<(), ScribeError> {
        let now = Instant::now();
        let mut bucket = self.bucket.lock();
        self.reconcile(&mut bucket, now);

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return Ok(());
        }

        let since_refill = now.saturating_duration_since(bucket.last_refill);
        Err(ScribeError::RateLimited {
            retry_after: self.refill_interval.saturating_sub(since_refill),
        })
    }

    #[must_use]
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock();
        self.reconcile(&mut bucket, Instant::now());
        bucket.tokens
    }

    /// Credits every whole interval elapsed since the last refill.
    pub fn refill(&self) {
        let mut bucket = self.bucket.lock();
        self.reconcile(&mut bucket, Instant::now());
    }

    fn reconcile(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let earned = elapsed.as_nanos() / self.refill_interval.as_nanos();
        if earned == 0 {
            return;
        }

        let headroom = u128::from(self.capacity - bucket.tokens);
        if earned >= headroom {
            bucket.tokens = self.capacity;
            bucket.last_refill = now;
        } else {
            // earned < headroom <= u32::MAX
            let earned = u32::try_from(earned).unwrap_or(u32::MAX);
            bucket.tokens += earned;
            bucket.last_refill += self.refill_interval * earned;
        }
    }

    /// Background refill every interval until `cancel_token` is cancelled.
    #[must_use]
    pub fn spawn_refill(self: &Arc<Self>, cancel_token: CancellationToken) -> JoinHandle<()> {
        let governor = Arc::clone(self);
        tokio::spawn(async move {
            let period = governor.refill_interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                capacity = governor.capacity,
                interval_ms = period.as_millis(),
                "rate governor refill loop started"
            );

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => break,
                    _ = ticker.tick() => governor.refill(),
                }
            }

            info!("rate governor refill loop stopped");
        })
    }
}

/// Rejects the request with 429 when the bucket is empty.
pub async fn rate_limit(
    State(governor): State<Arc<RateGovernor>>,
    request: Request,
    next: Next,
) -> Response {
    match governor.try_acquire() {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(path = %request.uri().path(), "request rejected by rate governor");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rejects_after_capacity_and_recovers_after_window() {
        let governor = RateGovernor::new(5, Duration::from_secs(1));
        for _ in 0..5 {
            assert!(governor.try_acquire().is_ok());
        }
        let err = governor.try_acquire().unwrap_err();
        assert!(matches!(err, ScribeError::RateLimited { .. }));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(governor.try_acquire().is_ok());
        assert_eq!(governor.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_refill_keeps_fractional_progress() {
        let governor = RateGovernor::new(4, Duration::from_millis(400));
        for _ in 0..4 {
            governor.try_acquire().unwrap();
        }

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(governor.available(), 1);

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(governor.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_time_to_next_token() {
        let governor = RateGovernor::new(2, Duration::from_secs(10));
        governor.try_acquire().unwrap();
        governor.try_acquire().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        match governor.try_acquire() {
            Err(ScribeError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(3));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_capacity() {
        let governor = RateGovernor::new(3, Duration::from_secs(3));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(governor.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refill_stops_on_cancel() {
        let governor = Arc::new(RateGovernor::new(2, Duration::from_secs(2)));
        governor.try_acquire().unwrap();
        governor.try_acquire().unwrap();

        let token = CancellationToken::new();
        let handle = governor.spawn_refill(token.clone());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(governor.available(), 1);

        token.cancel();
        handle.await.unwrap();
    }
}
