//! Display session: the single loop behind a signage screen
//!
//! Heartbeat, rotation, data refresh and the clock are independent timers
//! polled by one `tokio::select!`. Operator commands arrive on an mpsc
//! channel. Every event ends with a fresh frame handed to the presenter.
//!
//! The loop never waits on the network. Pulses go to the reporter's
//! delivery task and refreshes run as spawned tasks that write the
//! snapshot store themselves; both report back as loop events.
//!
//! Pins come from two places. The registry pin arrives with the display
//! settings on each refresh; an operator pin comes from a `Command` and wins
//! over the registry one until `Resume`.

use crate::config::DisplayAgentConfig;
use crate::fetch::{DataSource, SnapshotFetcher, SnapshotStore};
use crate::heartbeat::{HeartbeatSink, LivenessEvent, LivenessReporter, Visibility};
use crate::model::{ContentMode, DisplayConfig, DisplaySettings, HospitalSnapshot, ViewId};
use crate::render::{render, RenderContext};
use crate::rotation::Rotator;
use crate::simulation::LiveSimulation;
use crate::timer::Ticker;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

const CLOCK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Visibility(Visibility),
    Pin(ViewId),
    Resume,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub location: String,
    pub content: ContentMode,
    pub config: Option<DisplayConfig>,
    pub rotation_interval: Duration,
    pub kiosk: bool,
    pub refresh_interval: Duration,
    pub simulate: bool,
    pub simulation_seed: Option<u64>,
}

impl SessionOptions {
    pub fn from_config(config: &DisplayAgentConfig) -> Self {
        Self {
            location: config.location.clone(),
            content: config.content,
            config: config.display_config.clone(),
            rotation_interval: config.rotation_interval(),
            kiosk: config.kiosk,
            refresh_interval: config.refresh_interval(),
            simulate: config.simulate,
            simulation_seed: config.simulation_seed,
        }
    }
}

enum Event {
    Liveness(LivenessEvent),
    Rotate,
    Refresh,
    Refreshed(Result<Option<DisplaySettings>, JoinError>),
    Clock,
    Snapshot,
    Command(Option<Command>),
}

pub struct DisplaySession<S, D> {
    reporter: LivenessReporter<S>,
    fetcher: Arc<SnapshotFetcher<D>>,
    refreshes: JoinSet<Option<DisplaySettings>>,
    store: SnapshotStore,
    snapshots: watch::Receiver<Arc<HospitalSnapshot>>,
    rotator: Rotator,
    rotation: Ticker,
    refresh: Ticker,
    clock: Ticker,
    simulation: Option<LiveSimulation>,
    location: String,
    config: Option<DisplayConfig>,
    base_rotation: Duration,
    kiosk: bool,
    registry_pin: Option<ViewId>,
    operator_pin: Option<ViewId>,
    started: bool,
}

impl<S: HeartbeatSink, D: DataSource> DisplaySession<S, D> {
    pub fn new(reporter: LivenessReporter<S>, fetcher: SnapshotFetcher<D>, options: SessionOptions) -> Self {
        let store = SnapshotStore::new();
        let snapshots = store.subscribe();
        let simulation = options
            .simulate
            .then(|| LiveSimulation::new(store.clone(), options.refresh_interval, options.simulation_seed));

        Self {
            reporter,
            fetcher: Arc::new(fetcher),
            refreshes: JoinSet::new(),
            snapshots,
            rotator: Rotator::for_mode(options.content),
            rotation: Ticker::stopped(options.rotation_interval),
            refresh: Ticker::stopped(options.refresh_interval),
            clock: Ticker::stopped(CLOCK_PERIOD),
            simulation,
            location: options.location,
            config: options.config,
            base_rotation: options.rotation_interval,
            kiosk: options.kiosk,
            registry_pin: None,
            operator_pin: None,
            started: false,
            store,
        }
    }

    /// Runs until `Command::Shutdown` or until every command sender is gone.
    /// Call `teardown()` afterwards to send the offline beacon.
    pub async fn run(&mut self, commands: &mut mpsc::Receiver<Command>, mut present: impl FnMut(&str)) {
        if !self.started {
            self.start();
        }
        present(&self.frame());

        loop {
            let event = tokio::select! {
                event = self.reporter.next_event() => Event::Liveness(event),
                _ = self.rotation.tick() => Event::Rotate,
                _ = self.refresh.tick() => Event::Refresh,
                Some(done) = self.refreshes.join_next(), if !self.refreshes.is_empty() => Event::Refreshed(done),
                _ = self.clock.tick() => Event::Clock,
                changed = self.snapshots.changed() => match changed {
                    Ok(()) => Event::Snapshot,
                    Err(_) => Event::Clock,
                },
                command = commands.recv() => Event::Command(command),
            };

            match event {
                Event::Liveness(event) => self.reporter.handle(event),
                Event::Rotate => {
                    if self.rotator.on_tick() {
                        debug!("Rotated to {}", self.rotator.current());
                    }
                }
                Event::Refresh => self.spawn_refresh(),
                Event::Refreshed(done) => self.on_refreshed(done),
                Event::Clock | Event::Snapshot => {}
                Event::Command(Some(Command::Shutdown)) | Event::Command(None) => {
                    info!("Display session stopping");
                    return;
                }
                Event::Command(Some(command)) => self.handle_command(command),
            }
            present(&self.frame());
        }
    }

    /// Stops every timer and the simulation, then sends the offline beacon.
    pub async fn teardown(mut self) {
        self.rotation.stop();
        self.refresh.stop();
        self.clock.stop();
        self.refreshes.abort_all();
        if let Some(mut simulation) = self.simulation.take() {
            simulation.stop();
        }
        self.reporter.teardown().await;
    }

    fn start(&mut self) {
        self.started = true;
        self.spawn_refresh();
        self.reporter.start();

        // a simulation starts from the first snapshot, see `on_refreshed`
        if self.simulation.is_none() {
            self.refresh.start();
        }
        self.clock.start();
        self.sync_rotation();
        info!(
            "Display session started: {:?} on {}, rotation every {:?}",
            self.rotator.mode(),
            self.rotator.current(),
            self.rotation.period()
        );
    }

    /// At most one refresh in flight; a tick during a slow one is skipped.
    fn spawn_refresh(&mut self) {
        if !self.refreshes.is_empty() {
            debug!("Previous refresh still running, skipping");
            return;
        }
        let fetcher = self.fetcher.clone();
        let store = self.store.clone();
        self.refreshes.spawn(async move {
            let outcome = fetcher.refresh().await;
            if !outcome.failed.is_empty() {
                warn!("Refresh degraded, {} of 6 resources failed", outcome.failed.len());
            }
            store.apply(&outcome);
            outcome.settings
        });
    }

    fn on_refreshed(&mut self, done: Result<Option<DisplaySettings>, JoinError>) {
        match done {
            Ok(Some(settings)) => self.apply_settings(settings),
            Ok(None) => {}
            Err(e) => warn!("Refresh task ended abnormally: {}", e),
        }
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.start();
        }
    }

    fn apply_settings(&mut self, settings: DisplaySettings) {
        if !settings.location.is_empty() {
            self.location = settings.location;
        }
        self.config = settings.config;

        if settings.content != self.rotator.mode() {
            info!("Content mode changed to {:?}", settings.content);
            self.rotator.set_mode(settings.content);
            self.reapply_pin();
        }

        if settings.pinned_view != self.registry_pin {
            self.registry_pin = settings.pinned_view;
            match self.registry_pin {
                Some(view) => info!("Registry pinned view {}", view),
                None => info!("Registry pin cleared"),
            }
            if self.operator_pin.is_none() {
                self.rotator.resume();
                self.reapply_pin();
            }
        }
        self.sync_rotation();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Visibility(visibility) => self.reporter.set_visibility(visibility),
            Command::Pin(view) => {
                if self.rotator.pin(view) {
                    info!("Operator pinned view {}", view);
                    self.operator_pin = Some(view);
                } else {
                    warn!("View {} is not in the rotation", view);
                }
            }
            Command::Resume => {
                self.operator_pin = None;
                self.rotator.resume();
                self.reapply_pin();
            }
            Command::Shutdown => {}
        }
        self.sync_rotation();
    }

    fn reapply_pin(&mut self) {
        if let Some(view) = self.operator_pin.or(self.registry_pin) {
            self.rotator.pin(view);
        }
    }

    /// Runs the rotation timer only while the rotator advances on its own.
    /// Leaves a running timer alone so the cadence is not reset.
    fn sync_rotation(&mut self) {
        self.rotation.set_period(self.rotation_period());
        match (self.rotator.is_rotating(), self.rotation.is_running()) {
            (true, false) => self.rotation.start(),
            (false, true) => self.rotation.stop(),
            _ => {}
        }
    }

    fn rotation_period(&self) -> Duration {
        match &self.config {
            Some(DisplayConfig::Mixed { section_interval_secs: Some(secs) }) if !self.kiosk => {
                Duration::from_secs((*secs).max(1))
            }
            _ => self.base_rotation,
        }
    }

    fn frame(&mut self) -> String {
        let snapshot = self.snapshots.borrow_and_update().clone();
        render(&RenderContext {
            location: &self.location,
            view: self.rotator.current(),
            position: (self.rotator.index(), self.rotator.views().len()),
            pinned: self.rotator.is_pinned(),
            snapshot: &snapshot,
            config: self.config.as_ref(),
            heartbeat_banner: self.reporter.banner(),
            hidden: self.reporter.visibility() == Visibility::Hidden,
            now: Local::now(),
        })
    }

    pub fn rotator(&self) -> &Rotator {
        &self.rotator
    }

    pub fn reporter(&self) -> &LivenessReporter<S> {
        &self.reporter
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn is_simulating(&self) -> bool {
        self.simulation.as_ref().is_some_and(LiveSimulation::is_running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticSource;
    use crate::fetch::Resource;
    use crate::heartbeat::testing::RecordingSink;
    use crate::heartbeat::{PulseStatus, DEFAULT_HEARTBEAT_INTERVAL};
    use crate::rotation::DEFAULT_SECTION_INTERVAL;
    use serde_json::json;

    fn options(content: ContentMode) -> SessionOptions {
        SessionOptions {
            location: "Main Lobby".into(),
            content,
            config: None,
            rotation_interval: DEFAULT_SECTION_INTERVAL,
            kiosk: false,
            refresh_interval: Duration::from_secs(5),
            simulate: false,
            simulation_seed: None,
        }
    }

    fn session(
        sink: &RecordingSink,
        source: &StaticSource,
        options: SessionOptions,
    ) -> DisplaySession<RecordingSink, StaticSource> {
        let reporter = LivenessReporter::new(sink.clone(), "DISP-001", DEFAULT_HEARTBEAT_INTERVAL, Duration::from_secs(1));
        DisplaySession::new(reporter, SnapshotFetcher::new(source.clone()), options)
    }

    /// Sends each command after its delay, measured from the previous one.
    fn script(commands: Vec<(u64, Command)>) -> mpsc::Receiver<Command> {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for (delay_ms, command) in commands {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if tx.send(command).await.is_err() {
                    return;
                }
            }
        });
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_session_reaches_emergency_after_45s() {
        let sink = RecordingSink::default();
        let source = StaticSource::default()
            .with(Resource::EmergencyAlerts, vec![json!({"id": "A1", "code_type": "Code Blue", "location": "ICU"})]);
        let mut session = session(&sink, &source, options(ContentMode::Mixed));
        let mut commands = script(vec![(45_001, Command::Shutdown)]);

        let mut frames = Vec::new();
        session.run(&mut commands, |f| frames.push(f.to_string())).await;

        assert_eq!(session.rotator().index(), 3);
        assert_eq!(session.rotator().current(), ViewId::Emergency);
        let last = frames.last().unwrap();
        assert!(last.contains("Emergency Alerts (4/7)"));
        assert!(last.contains("[!] Code Blue - ICU"));

        session.teardown().await;
        // start + 15/30/45 + beacon
        assert_eq!(
            sink.statuses(),
            vec![PulseStatus::Online, PulseStatus::Online, PulseStatus::Online, PulseStatus::Online, PulseStatus::Offline]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_pin_and_resume() {
        let sink = RecordingSink::default();
        let source = StaticSource::default();
        let mut session = session(&sink, &source, options(ContentMode::Mixed));
        let mut commands = script(vec![
            (0, Command::Pin(ViewId::Ot)),
            (31_000, Command::Resume),
            (16_000, Command::Shutdown),
        ]);

        let mut frames = Vec::new();
        session.run(&mut commands, |f| frames.push(f.to_string())).await;

        assert!(frames.iter().any(|f| f.contains("Operation Theatres (3/7) [pinned]")));
        assert!(!session.rotator().is_pinned());
        // resumed at 31s, first advance 15s later
        assert_eq!(session.rotator().current(), ViewId::Emergency);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_pin_follows_settings() {
        let sink = RecordingSink::default();
        let source = StaticSource::default();
        source.set_settings(Some(DisplaySettings {
            location: "Ward 3".into(),
            content: ContentMode::Mixed,
            config: None,
            pinned_view: Some(ViewId::Inventory),
        }));
        let mut session = session(&sink, &source, options(ContentMode::Mixed));

        let clear = source.clone();
        let (tx, mut commands) = mpsc::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(47)).await;
            clear.set_settings(Some(DisplaySettings {
                location: "Ward 3".into(),
                content: ContentMode::Mixed,
                config: None,
                pinned_view: None,
            }));
            tokio::time::sleep(Duration::from_secs(10)).await;
            let _ = tx.send(Command::Shutdown).await;
        });

        let mut frames = Vec::new();
        session.run(&mut commands, |f| frames.push(f.to_string())).await;

        assert!(frames.iter().any(|f| f.starts_with("Ward 3 | Drug Inventory (5/7) [pinned]")));
        assert!(!session.rotator().is_pinned());
        assert!(session.rotator().is_rotating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_command_sends_offline_pulse() {
        let sink = RecordingSink::default();
        let source = StaticSource::default();
        let mut session = session(&sink, &source, options(ContentMode::TokenQueue));
        let mut commands = script(vec![
            (1_000, Command::Visibility(Visibility::Hidden)),
            (60_000, Command::Shutdown),
        ]);

        let mut frames = Vec::new();
        session.run(&mut commands, |f| frames.push(f.to_string())).await;

        assert_eq!(sink.statuses(), vec![PulseStatus::Online, PulseStatus::Offline]);
        assert!(frames.last().unwrap().contains("[offline]"));
        // fixed display never rotates
        assert_eq!(session.rotator().current(), ViewId::Queue);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kiosk_single_content_stays_frozen() {
        let sink = RecordingSink::default();
        let source = StaticSource::default();
        let mut opts = options(ContentMode::OtStatus);
        opts.kiosk = true;
        opts.rotation_interval = Duration::from_secs(10);
        let mut session = session(&sink, &source, opts);
        let mut commands = script(vec![(60_000, Command::Shutdown)]);

        session.run(&mut commands, |_| {}).await;
        assert_eq!(session.rotator().current(), ViewId::Ot);
        assert!(!session.rotator().is_rotating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_departments_render_empty() {
        let sink = RecordingSink::default();
        let source = StaticSource::default()
            .with(Resource::TokenQueue, vec![json!({"token_number": "T-7", "status": "serving", "estimated_wait": "abc"})]);
        source.fail(Resource::Departments);
        let mut session = session(&sink, &source, options(ContentMode::DepartmentStatus));
        let mut commands = script(vec![(100, Command::Shutdown)]);

        let mut frames = Vec::new();
        session.run(&mut commands, |f| frames.push(f.to_string())).await;

        assert!(frames.last().unwrap().contains("No data available"));
        assert_eq!(session.store().latest().token_queue[0].estimated_wait, 0);
    }

    /// Takes five seconds per pulse, then answers 504
    #[derive(Clone, Default)]
    struct SlowSink {
        attempts: Arc<std::sync::Mutex<u32>>,
    }

    impl HeartbeatSink for SlowSink {
        async fn send(&self, _pulse: &crate::heartbeat::Pulse) -> Result<(), crate::heartbeat::HeartbeatError> {
            *self.attempts.lock().unwrap() += 1;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(crate::heartbeat::HeartbeatError::Rejected(504))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_registry_does_not_hold_rotation() {
        let sink = SlowSink::default();
        let source = StaticSource::default()
            .with(Resource::EmergencyAlerts, vec![json!({"id": "A1", "code_type": "Code Blue", "location": "ICU"})]);
        source.slow(Duration::from_secs(8));
        let reporter = LivenessReporter::new(sink.clone(), "DISP-001", DEFAULT_HEARTBEAT_INTERVAL, Duration::from_secs(1));
        let mut session = DisplaySession::new(reporter, SnapshotFetcher::new(source), options(ContentMode::Mixed));
        let mut commands = script(vec![(20_000, Command::Pin(ViewId::Departments)), (25_001, Command::Shutdown)]);

        let mut frames = Vec::new();
        session.run(&mut commands, |f| frames.push(f.to_string())).await;

        // rotated at 15s, pinned at 20s while a pulse and a refresh were in flight
        assert!(frames.iter().any(|f| f.contains("Token Queue (2/7)")));
        assert!(frames.iter().any(|f| f.contains("Departments (6/7) [pinned]")));
        assert_eq!(session.rotator().current(), ViewId::Departments);
        // pulses at 0/15/30/45, each answered 5s later
        assert_eq!(*sink.attempts.lock().unwrap(), 4);
        assert_eq!(session.reporter().consecutive_failures(), 3);
        assert!(frames.last().unwrap().contains("Heartbeat failed"));
        assert_eq!(session.store().latest().emergency_alerts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_rotation_on_time_with_slow_registry() {
        let sink = SlowSink::default();
        let source = StaticSource::default();
        source.slow(Duration::from_secs(5));
        let reporter = LivenessReporter::new(sink, "DISP-001", DEFAULT_HEARTBEAT_INTERVAL, Duration::from_secs(1));
        let mut session = DisplaySession::new(reporter, SnapshotFetcher::new(source), options(ContentMode::Mixed));
        let mut commands = script(vec![(45_001, Command::Shutdown)]);

        session.run(&mut commands, |_| {}).await;
        assert_eq!(session.rotator().index(), 3);
        assert_eq!(session.rotator().current(), ViewId::Emergency);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_replaces_network_refresh() {
        let sink = RecordingSink::default();
        let source = StaticSource::default()
            .with(Resource::Departments, vec![json!({"name": "ICU", "total_beds": 10, "occupied_beds": 5})]);
        let mut opts = options(ContentMode::DepartmentStatus);
        opts.simulate = true;
        opts.simulation_seed = Some(3);
        let mut session = session(&sink, &source, opts);
        let mut commands = script(vec![(12_000, Command::Shutdown)]);

        session.run(&mut commands, |_| {}).await;
        assert!(session.is_simulating());
        let ward = &session.store().latest().departments[0];
        assert!(ward.occupied_beds <= ward.total_beds);

        session.teardown().await;
        assert_eq!(sink.statuses().last(), Some(&PulseStatus::Offline));
    }
}
