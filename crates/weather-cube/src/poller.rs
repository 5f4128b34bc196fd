//! The polling loop: schedule → weather → colors → display, every
//! refresh interval.

use chrono::{Local, NaiveDateTime};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::color::{ColorCommand, ColorMapper};
use crate::schedule::{ActiveHours, ScheduleState};
use crate::snapshot::{LoopPhase, SnapshotWriter, StatusSnapshot};
use crate::transport::{palette_payload, DisplayTransport, PowerState};
use crate::weather::WeatherSource;

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(300);

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Quiet hours; display switched off.
    Quiet,
    /// Display updated with these colors.
    Updated(ColorCommand),
    /// Weather unavailable; nothing sent.
    FetchFailed,
    /// A publish failed; snapshot left unchanged.
    TransportFailed,
}

/// Decision settings for the loop.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub mapper: ColorMapper,
    pub hours: ActiveHours,
    pub refresh: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            mapper: ColorMapper::default(),
            hours: ActiveHours::default(),
            refresh: DEFAULT_REFRESH,
        }
    }
}

pub struct PollingLoop<W, T, C = LocalClock> {
    settings: PollerSettings,
    weather: W,
    transport: T,
    clock: C,
    snapshot: SnapshotWriter,
    restart_rx: mpsc::Receiver<()>,
    /// Set by a restart signal: the device may have come back powered off.
    resend_power: bool,
}

impl<W, T, C> PollingLoop<W, T, C>
where
    W: WeatherSource,
    T: DisplayTransport,
    C: Clock,
{
    pub fn new(
        settings: PollerSettings,
        weather: W,
        transport: T,
        clock: C,
        snapshot: SnapshotWriter,
        restart_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            weather,
            transport,
            clock,
            snapshot,
            restart_rx,
            resend_power: false,
        }
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// Cycles never overlap. The wait between cycles ends early when the
    /// display reports a restart.
    pub async fn run(mut self, mut shutdown: watch::Receiver<()>) {
        log::info!(
            "[Poller] Starting: refresh every {}s, active {:02}:00-{:02}:59",
            self.settings.refresh.as_secs(),
            self.settings.hours.start_hour(),
            self.settings.hours.end_hour()
        );

        loop {
            if shutdown.has_changed().unwrap_or(true) {
                break;
            }

            self.drain_restart_signals();
            let outcome = self.run_cycle().await;
            log::debug!("[Poller] Cycle finished: {:?}", outcome);

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                Some(()) = self.restart_rx.recv() => {
                    log::info!("[Poller] Display restart observed, refreshing now");
                    self.resend_power = true;
                }
                _ = tokio::time::sleep(self.settings.refresh) => {}
            }
        }

        log::info!("[Poller] Stopped");
    }

    /// Run exactly one cycle against the current time.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let now = self.clock.now();
        match self.settings.hours.state_at(&now) {
            ScheduleState::Quiet => self.quiet_cycle(now).await,
            ScheduleState::Active => self.active_cycle(now).await,
        }
    }

    async fn quiet_cycle(&mut self, now: NaiveDateTime) -> CycleOutcome {
        log::info!("[Poller] Quiet hours, switching display off");
        if let Err(e) = self.transport.publish_power(PowerState::Off).await {
            log::warn!("[Poller] {}", e);
            return CycleOutcome::TransportFailed;
        }
        self.resend_power = false;
        let snapshot = self.snapshot.current().quiet(now);
        self.snapshot.publish(snapshot);
        CycleOutcome::Quiet
    }

    async fn active_cycle(&mut self, now: NaiveDateTime) -> CycleOutcome {
        let reading = match self.weather.current().await {
            Ok(reading) => reading,
            Err(e) => {
                log::warn!("[Poller] Weather fetch failed, skipping cycle: {}", e);
                return CycleOutcome::FetchFailed;
            }
        };

        let command = self.settings.mapper.build_color_command(&reading);
        log::info!(
            "[Poller] {:.1}°C {} -> {}",
            reading.temperature_celsius(),
            reading.condition,
            palette_payload(&command)
        );

        if self.resend_power || self.snapshot.current().phase != LoopPhase::Active {
            if let Err(e) = self.transport.publish_power(PowerState::On).await {
                log::warn!("[Poller] {}", e);
                return CycleOutcome::TransportFailed;
            }
            self.resend_power = false;
        }
        if let Err(e) = self.transport.publish_colors(&command).await {
            log::warn!("[Poller] {}", e);
            return CycleOutcome::TransportFailed;
        }

        self.snapshot
            .publish(StatusSnapshot::active(now, &reading, command.primary));
        CycleOutcome::Updated(command)
    }

    /// Drop restart signals that arrived outside a wait.
    fn drain_restart_signals(&mut self) {
        while self.restart_rx.try_recv().is_ok() {}
    }
}
