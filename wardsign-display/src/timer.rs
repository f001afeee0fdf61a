//! Restartable periodic timer for `tokio::select!` loops
//!
//! A stopped `Ticker` never fires. Starting or changing the period replaces
//! the underlying interval, so at most one interval is alive per ticker and
//! dropping the ticker cancels it. Late ticks are skipped, so the cadence
//! stays on its original schedule.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    interval: Option<Interval>,
}

impl Ticker {
    pub fn stopped(period: Duration) -> Self {
        Self { period, interval: None }
    }

    /// First tick fires one full period from now.
    pub fn running(period: Duration) -> Self {
        let mut ticker = Self::stopped(period);
        ticker.start();
        ticker
    }

    pub fn start(&mut self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    /// Changes the period; a running ticker restarts with it.
    pub fn set_period(&mut self, period: Duration) {
        if period == self.period {
            return;
        }
        self.period = period;
        if self.is_running() {
            self.start();
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => std::future::pending().await,
        }
    }
}
