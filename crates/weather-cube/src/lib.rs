//! Weather Cube
//!
//! Polls the current weather, turns it into colors and drives a Tasmota LED
//! display over MQTT.
//!
//! # Components
//!
//! - [`color`]: temperature → hue color, condition → accent color
//! - [`schedule`]: active/quiet hours
//! - [`poller`]: the polling loop tying everything together
//! - [`weather`]: OpenWeatherMap client
//! - [`transport`]: MQTT publisher and device restart detection
//! - [`snapshot`] / [`status_page`]: last-known state over HTTP

pub mod color;
pub mod config;
pub mod error;
pub mod poller;
pub mod schedule;
pub mod shutdown;
pub mod snapshot;
pub mod status_page;
pub mod transport;
pub mod weather;

pub use color::{ColorCommand, ColorMapper, Condition, Rgb};
pub use config::Config;
pub use error::{ConfigError, FetchError, ShutdownError, StatusPageError, TransportError};
pub use poller::{Clock, CycleOutcome, LocalClock, PollerSettings, PollingLoop};
pub use schedule::{ActiveHours, ScheduleState};
pub use shutdown::setup_shutdown;
pub use snapshot::{snapshot_channel, LoopPhase, SnapshotReader, SnapshotWriter, StatusSnapshot};
pub use transport::{DisplayTransport, PowerState, TasmotaMqtt};
pub use weather::{OpenWeatherClient, WeatherReading, WeatherSource};
