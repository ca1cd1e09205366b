//! Periodic Timer Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::time::{TickSource, Ticker};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Tokio-interval backed tick source for desktop.
///
/// Missed ticks are skipped, so a sweep that overruns its period produces a
/// single follow-up tick instead of a burst. Works with `tokio::time::pause`
/// for virtual-time tests.
#[derive(Debug, Clone, Default)]
pub struct IntervalTickSource;

impl IntervalTickSource {
    pub fn new() -> Self {
        Self
    }
}

impl TickSource for IntervalTickSource {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        // tokio panics on a zero period; config validation rejects it upstream
        let period = period.max(Duration::from_millis(1));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Box::new(IntervalTicker { interval })
    }
}

struct IntervalTicker {
    interval: Interval,
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_a_full_period() {
        let source = IntervalTickSource::new();
        let mut ticker = source.ticker(Duration::from_secs(60));

        let fired = tokio::time::timeout(Duration::from_secs(59), ticker.tick()).await;
        assert!(fired.is_err(), "ticker fired before its period elapsed");

        let fired = tokio::time::timeout(Duration::from_secs(2), ticker.tick()).await;
        assert!(fired.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_virtual_time() {
        let source = IntervalTickSource::new();
        let mut ticker = source.ticker(Duration::from_secs(10));
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let handle = tokio::spawn(async move {
            loop {
                ticker.tick().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        handle.abort();

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
