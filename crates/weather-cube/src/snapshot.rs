//! Last-known state, published by the polling loop for the status page.
//!
//! The loop is the only writer. Each cycle replaces the whole snapshot
//! through a `watch` channel, so readers never see a half-updated record.

use chrono::NaiveDateTime;
use tokio::sync::watch;

use crate::color::Rgb;
use crate::weather::WeatherReading;

/// What the loop last did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// No cycle has completed yet.
    Idle,
    /// Showing the weather.
    Active,
    /// Display switched off for the night.
    Quiet,
}

impl LoopPhase {
    pub fn describe(self) -> &'static str {
        match self {
            LoopPhase::Idle => "Idle",
            LoopPhase::Active => "Running",
            LoopPhase::Quiet => "Sleeping until morning...",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub phase: LoopPhase,
    /// Local wall-clock time of the last update.
    pub updated_at: NaiveDateTime,
    pub temperature_celsius: Option<f64>,
    pub condition: Option<String>,
    pub primary_color: Option<Rgb>,
}

impl StatusSnapshot {
    pub fn idle(now: NaiveDateTime) -> Self {
        Self {
            phase: LoopPhase::Idle,
            updated_at: now,
            temperature_celsius: None,
            condition: None,
            primary_color: None,
        }
    }

    /// Snapshot after showing `reading` with `primary` on the display.
    pub fn active(now: NaiveDateTime, reading: &WeatherReading, primary: Rgb) -> Self {
        Self {
            phase: LoopPhase::Active,
            updated_at: now,
            temperature_celsius: Some(reading.temperature_celsius()),
            condition: Some(reading.condition.clone()),
            primary_color: Some(primary),
        }
    }

    /// Quiet snapshot that keeps the last observed weather.
    pub fn quiet(&self, now: NaiveDateTime) -> Self {
        Self {
            phase: LoopPhase::Quiet,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Create the writer/reader pair, starting in [`LoopPhase::Idle`].
pub fn snapshot_channel(now: NaiveDateTime) -> (SnapshotWriter, SnapshotReader) {
    let (tx, rx) = watch::channel(StatusSnapshot::idle(now));
    (SnapshotWriter { tx }, SnapshotReader { rx })
}

/// Single writer, owned by the polling loop.
#[derive(Debug)]
pub struct SnapshotWriter {
    tx: watch::Sender<StatusSnapshot>,
}

impl SnapshotWriter {
    pub fn publish(&self, snapshot: StatusSnapshot) {
        // send_replace succeeds even when every reader is gone
        self.tx.send_replace(snapshot);
    }

    pub fn current(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cheap, cloneable read handle.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<StatusSnapshot>,
}

impl SnapshotReader {
    pub fn current(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication. Returns `false` once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
