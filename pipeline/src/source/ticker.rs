use std::time::Duration;
use tokio::time::Instant;

/// Periodic tick driver for streaming sources.
///
/// Unlike `tokio::time::Interval` it can be created and stopped outside a
/// runtime and accepts a zero period, which means "as fast as the loop
/// allows". The first tick after `start` fires immediately; ticks missed
/// while the loop was busy are skipped rather than bursted.
#[derive(Debug)]
pub(crate) struct Ticker {
    period: Duration,
    next: Option<Instant>,
}

impl Ticker {
    pub(crate) fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn is_running(&self) -> bool {
        self.next.is_some()
    }

    /// Start ticking. No-op if already running.
    pub(crate) fn start(&mut self) {
        if self.next.is_none() {
            self.next = Some(Instant::now());
        }
    }

    pub(crate) fn stop(&mut self) {
        self.next = None;
    }

    /// Wait for the next tick. Never resolves while stopped.
    ///
    /// Cancel-safe: the schedule only advances once the wait has completed.
    pub(crate) async fn wait(&mut self) {
        let Some(deadline) = self.next else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;
        if self.period.is_zero() {
            tokio::task::yield_now().await;
        }
        let now = Instant::now();
        let mut next = deadline + self.period;
        if next < now {
            next = now + self.period;
        }
        self.next = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_to(actual: Duration, expected: Duration) -> bool {
        actual >= expected && actual < expected + Duration::from_millis(5)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_period() {
        let mut ticker = Ticker::new(Duration::from_millis(40));
        ticker.start();
        let start = Instant::now();
        ticker.wait().await;
        assert!(close_to(start.elapsed(), Duration::ZERO));
        ticker.wait().await;
        ticker.wait().await;
        assert!(close_to(start.elapsed(), Duration::from_millis(80)));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_ticker_never_fires() {
        let mut ticker = Ticker::new(Duration::from_millis(10));
        let waited = tokio::time::timeout(Duration::from_secs(1), ticker.wait()).await;
        assert!(waited.is_err());

        ticker.start();
        ticker.stop();
        assert!(!ticker.is_running());
        let waited = tokio::time::timeout(Duration::from_secs(1), ticker.wait()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_keeps_schedule() {
        let mut ticker = Ticker::new(Duration::from_millis(40));
        ticker.start();
        ticker.wait().await;
        ticker.start();
        let before = Instant::now();
        ticker.wait().await;
        assert!(close_to(before.elapsed(), Duration::from_millis(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn missed_ticks_are_skipped() {
        let mut ticker = Ticker::new(Duration::from_millis(10));
        ticker.start();
        ticker.wait().await;
        tokio::time::advance(Duration::from_millis(55)).await;
        let before = Instant::now();
        ticker.wait().await;
        assert!(close_to(before.elapsed(), Duration::ZERO));
        ticker.wait().await;
        assert!(close_to(before.elapsed(), Duration::from_millis(10)));
    }
}
