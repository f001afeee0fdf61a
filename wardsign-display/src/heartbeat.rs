//! Liveness reporting to the display registry
//!
//! Online pulses go out on a fixed cadence while the display is visible.
//! Hiding the display sends one offline pulse and stops the cadence;
//! showing it again sends one online pulse and restarts it. On teardown a
//! last offline pulse is sent as a beacon: bounded by a short timeout,
//! never retried, outcome ignored.
//!
//! Sends never block the caller: pulses are queued to a delivery task that
//! posts them one at a time, in order, and reports each result back.
//! Failures never escape this module. They are logged, counted and kept as
//! a banner message until the next successful pulse.

use crate::timer::Ticker;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseStatus {
    Online,
    Offline,
}

/// Heartbeat body (`POST /api/displays/heartbeat`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pulse {
    pub display_id: String,
    pub status: PulseStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("heartbeat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry rejected heartbeat: HTTP {0}")]
    Rejected(u16),
}

/// Where pulses are delivered
pub trait HeartbeatSink: Send + Sync + 'static {
    fn send(&self, pulse: &Pulse) -> impl Future<Output = Result<(), HeartbeatError>> + Send;
}

/// HTTP sink posting to the registry
#[derive(Clone)]
pub struct HttpHeartbeatSink {
    client: reqwest::Client,
    url: String,
}

impl HttpHeartbeatSink {
    pub fn new(client: reqwest::Client, registry_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/displays/heartbeat", registry_url.trim_end_matches('/')),
        }
    }
}

impl HeartbeatSink for HttpHeartbeatSink {
    async fn send(&self, pulse: &Pulse) -> Result<(), HeartbeatError> {
        let response = self.client.post(&self.url).json(pulse).send().await?;
        if !response.status().is_success() {
            return Err(HeartbeatError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Delivery result of one queued pulse
#[derive(Debug)]
pub struct PulseOutcome {
    pub status: PulseStatus,
    pub result: Result<(), HeartbeatError>,
}

#[derive(Debug)]
pub enum LivenessEvent {
    Tick,
    Delivered(PulseOutcome),
}

pub struct LivenessReporter<S> {
    sink: Arc<S>,
    display_id: String,
    ticker: Ticker,
    visibility: Visibility,
    banner: Option<String>,
    consecutive_failures: u32,
    total_failures: u64,
    beacon_timeout: Duration,
    queue: Option<mpsc::UnboundedSender<Pulse>>,
    worker: Option<JoinHandle<()>>,
    outcome_tx: mpsc::UnboundedSender<PulseOutcome>,
    outcomes: mpsc::UnboundedReceiver<PulseOutcome>,
    pending: usize,
}

impl<S: HeartbeatSink> LivenessReporter<S> {
    /// Created idle; `start()` emits the first pulse and arms the cadence.
    pub fn new(sink: S, display_id: impl Into<String>, every: Duration, beacon_timeout: Duration) -> Self {
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        Self {
            sink: Arc::new(sink),
            display_id: display_id.into(),
            ticker: Ticker::stopped(every),
            visibility: Visibility::Visible,
            banner: None,
            consecutive_failures: 0,
            total_failures: 0,
            beacon_timeout,
            queue: None,
            worker: None,
            outcome_tx,
            outcomes,
            pending: 0,
        }
    }

    pub fn start(&mut self) {
        info!("Liveness reporting for {} every {:?}", self.display_id, self.ticker.period());
        self.visibility = Visibility::Visible;
        self.dispatch(PulseStatus::Online);
        self.ticker.start();
    }

    /// Queues one pulse and returns immediately. Pulses leave in order from a
    /// background task; the result comes back as `LivenessEvent::Delivered`.
    pub fn dispatch(&mut self, status: PulseStatus) {
        let pulse = self.pulse(status);
        let queue = match self.queue.take() {
            Some(queue) if !queue.is_closed() => queue,
            _ => self.spawn_worker(),
        };
        if queue.send(pulse).is_ok() {
            self.pending += 1;
        }
        self.queue = Some(queue);
    }

    fn spawn_worker(&mut self) -> mpsc::UnboundedSender<Pulse> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Pulse>();
        let sink = self.sink.clone();
        let outcomes = self.outcome_tx.clone();
        self.worker = Some(tokio::spawn(async move {
            while let Some(pulse) = rx.recv().await {
                let result = sink.send(&pulse).await;
                if outcomes.send(PulseOutcome { status: pulse.status, result }).is_err() {
                    break;
                }
            }
        }));
        tx
    }

    /// Resolves on the next cadence tick or delivery result. Never ticks
    /// while hidden.
    pub async fn next_event(&mut self) -> LivenessEvent {
        tokio::select! {
            _ = self.ticker.tick() => LivenessEvent::Tick,
            Some(outcome) = self.outcomes.recv(), if self.pending > 0 => LivenessEvent::Delivered(outcome),
        }
    }

    pub fn handle(&mut self, event: LivenessEvent) {
        match event {
            LivenessEvent::Tick if self.visibility == Visibility::Visible => self.dispatch(PulseStatus::Online),
            LivenessEvent::Tick => {}
            LivenessEvent::Delivered(outcome) => {
                self.record(outcome);
            }
        }
    }

    /// Waits until every queued pulse has an answer. Returns whether the
    /// last one was acknowledged.
    pub async fn settle(&mut self) -> bool {
        let mut acknowledged = false;
        while self.pending > 0 {
            match self.outcomes.recv().await {
                Some(outcome) => acknowledged = self.record(outcome),
                None => break,
            }
        }
        acknowledged
    }

    /// Sends one pulse and waits for the registry's answer.
    pub async fn report_status(&mut self, status: PulseStatus) -> bool {
        self.dispatch(status);
        self.settle().await
    }

    fn record(&mut self, outcome: PulseOutcome) -> bool {
        self.pending = self.pending.saturating_sub(1);
        match outcome.result {
            Ok(()) => {
                if self.banner.take().is_some() {
                    info!("Heartbeat recovered after {} failure(s)", self.consecutive_failures);
                }
                self.consecutive_failures = 0;
                debug!("Heartbeat sent ({:?})", outcome.status);
                true
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.total_failures += 1;
                error!("Failed to send heartbeat ({:?}): {}", outcome.status, e);
                self.banner = Some(format!("Heartbeat failed: {e}"));
                false
            }
        }
    }

    /// Applies a visibility change. Repeats of the current state are ignored.
    pub fn set_visibility(&mut self, visibility: Visibility) {
        if visibility == self.visibility {
            return;
        }
        self.visibility = visibility;
        match visibility {
            Visibility::Hidden => {
                info!("Display hidden, suspending heartbeats");
                self.ticker.stop();
                self.dispatch(PulseStatus::Offline);
            }
            Visibility::Visible => {
                info!("Display visible, resuming heartbeats");
                self.dispatch(PulseStatus::Online);
                self.ticker.start();
            }
        }
    }

    /// Final offline beacon; consumes the reporter so no timer survives it.
    /// Queued pulses get `beacon_timeout` to drain first, then are dropped.
    pub async fn teardown(mut self) {
        self.ticker.stop();
        self.queue = None;
        if let Some(mut worker) = self.worker.take() {
            if tokio::time::timeout(self.beacon_timeout, &mut worker).await.is_err() {
                worker.abort();
                debug!("Dropped {} undelivered pulse(s)", self.pending);
            }
        }

        let pulse = self.pulse(PulseStatus::Offline);
        match tokio::time::timeout(self.beacon_timeout, self.sink.send(&pulse)).await {
            Ok(Ok(())) => debug!("Offline beacon delivered"),
            Ok(Err(e)) => debug!("Offline beacon lost: {}", e),
            Err(_) => debug!("Offline beacon timed out after {:?}", self.beacon_timeout),
        }
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_running()
    }

    /// Pulses queued or in flight
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    fn pulse(&self, status: PulseStatus) -> Pulse {
        Pulse {
            display_id: self.display_id.clone(),
            status,
            timestamp: Utc::now(),
        }
    }
}
