//! MQTT transport for a Tasmota-driven LED display.
//!
//! Commands are published to `{topic}/cmnd/<Command>`. Everything under
//! `{topic}/#` is watched so the loop can react when the device reboots.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::color::ColorCommand;
use crate::config::MqttConfig;
use crate::error::TransportError;

/// Tasmota palette scheme that cycles through the palette colors.
pub const PALETTE_SCHEME: &str = "2";

/// Request queue depth between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 10;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn payload(self) -> &'static str {
        match self {
            PowerState::On => "ON",
            PowerState::Off => "OFF",
        }
    }
}

/// Commands the polling loop sends to the display.
#[async_trait]
pub trait DisplayTransport: Send + Sync {
    async fn publish_power(&self, state: PowerState) -> Result<(), TransportError>;

    async fn publish_colors(&self, command: &ColorCommand) -> Result<(), TransportError>;
}

/// Space-separated `R,G,B` triples, primary first.
pub fn palette_payload(command: &ColorCommand) -> String {
    command
        .colors()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Topic layout for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    base: String,
}

impl DeviceTopics {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn command(&self, name: &str) -> String {
        format!("{}/cmnd/{}", self.base, name)
    }

    pub fn power(&self) -> String {
        self.command("Power")
    }

    pub fn palette(&self) -> String {
        self.command("Palette")
    }

    pub fn scheme(&self) -> String {
        self.command("Scheme")
    }

    pub fn subscription(&self) -> String {
        format!("{}/#", self.base)
    }

    /// True for the device's `INFO3` self-report carrying a restart reason,
    /// which Tasmota sends once after every boot.
    pub fn is_restart_report(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(rest) = topic.strip_prefix(&self.base) else {
            return false;
        };
        if !rest.starts_with('/') || rest.rsplit('/').next() != Some("INFO3") {
            return false;
        }
        serde_json::from_slice::<serde_json::Value>(payload)
            .map(|value| {
                value
                    .get("Info3")
                    .and_then(|info| info.get("RestartReason"))
                    .is_some()
            })
            .unwrap_or(false)
    }
}

/// [`DisplayTransport`] over a `rumqttc` client.
///
/// Publishing never waits on the network: requests are queued for the
/// event loop task. While the broker is unreachable nothing is queued, so
/// stale commands are never replayed on reconnect; a full queue is
/// reported as a [`TransportError`] as well.
pub struct TasmotaMqtt {
    client: AsyncClient,
    topics: DeviceTopics,
    connected: Arc<AtomicBool>,
}

impl TasmotaMqtt {
    /// Create the client and spawn the task that drives the connection.
    ///
    /// Restart reports from the device, and every (re)connect to the
    /// broker, are forwarded on `restart_tx`. The task sends DISCONNECT and
    /// exits when `shutdown` fires.
    pub fn connect(
        config: &MqttConfig,
        restart_tx: mpsc::Sender<()>,
        shutdown: watch::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let topics = DeviceTopics::new(&config.topic);
        let connected = Arc::new(AtomicBool::new(false));

        log::info!(
            "[MQTT] Connecting to {}:{} as {}",
            config.broker,
            config.port,
            config.client_id
        );
        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            topics.clone(),
            connected.clone(),
            restart_tx,
            shutdown,
        ));

        (
            Self {
                client,
                topics,
                connected,
            },
            handle,
        )
    }

    fn publish(&self, topic: String, payload: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::Publish {
                topic,
                reason: "not connected to broker".to_string(),
            });
        }
        log::debug!("[MQTT] {} <- {}", topic, payload);
        self.client
            .try_publish(topic.as_str(), QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| TransportError::Publish {
                topic,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl DisplayTransport for TasmotaMqtt {
    async fn publish_power(&self, state: PowerState) -> Result<(), TransportError> {
        self.publish(self.topics.power(), state.payload())
    }

    async fn publish_colors(&self, command: &ColorCommand) -> Result<(), TransportError> {
        self.publish(self.topics.palette(), &palette_payload(command))?;
        self.publish(self.topics.scheme(), PALETTE_SCHEME)
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: DeviceTopics,
    connected: Arc<AtomicBool>,
    restart_tx: mpsc::Sender<()>,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                connected.store(false, Ordering::Release);
                disconnect(&mut eventloop, &client).await;
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    log::info!("[MQTT] Connected, subscribing to {}", topics.subscription());
                    connected.store(true, Ordering::Release);
                    // Subscriptions do not survive a clean-session reconnect.
                    tokio::spawn(subscribe_device(client.clone(), topics.subscription()));
                    // Device state is unknown after an outage.
                    request_refresh(&restart_tx);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_publish(&topics, &publish, &restart_tx);
                }
                Ok(_) => {}
                Err(e) => {
                    connected.store(false, Ordering::Release);
                    log::warn!("[MQTT] Connection error: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
    log::info!("[MQTT] Event loop stopped");
}

/// Subscribe to everything the device reports, waiting for room in the
/// request queue rather than giving up when it is full.
async fn subscribe_device(client: AsyncClient, filter: String) {
    match client.subscribe(filter.as_str(), QoS::AtMostOnce).await {
        Ok(()) => log::debug!("[MQTT] Subscription to {} queued", filter),
        Err(e) => {
            let err = TransportError::Subscribe {
                topic: filter,
                reason: e.to_string(),
            };
            log::error!("[MQTT] {}", err);
        }
    }
}

/// Returns true when the message was a restart report and a refresh was
/// requested.
fn handle_publish(
    topics: &DeviceTopics,
    publish: &Publish,
    restart_tx: &mpsc::Sender<()>,
) -> bool {
    log::debug!(
        "[MQTT] Received `{}` from `{}`",
        String::from_utf8_lossy(&publish.payload),
        publish.topic
    );
    if !topics.is_restart_report(&publish.topic, &publish.payload) {
        return false;
    }
    log::info!("[MQTT] Display restarted, requesting refresh");
    request_refresh(restart_tx);
    true
}

fn request_refresh(restart_tx: &mpsc::Sender<()>) {
    // A full queue already holds a pending wake-up.
    let _ = restart_tx.try_send(());
}

async fn disconnect(eventloop: &mut EventLoop, client: &AsyncClient) {
    if let Err(e) = client.try_disconnect() {
        log::warn!("[MQTT] {}", TransportError::Disconnect(e.to_string()));
        return;
    }
    // Drive the loop until the DISCONNECT packet is flushed.
    let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    if flushed.is_err() {
        log::warn!("[MQTT] Timed out sending DISCONNECT");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;

    #[test]
    fn test_command_topics() {
        let topics = DeviceTopics::new("tasmota_cube/");
        assert_eq!(topics.power(), "tasmota_cube/cmnd/Power");
        assert_eq!(topics.palette(), "tasmota_cube/cmnd/Palette");
        assert_eq!(topics.scheme(), "tasmota_cube/cmnd/Scheme");
        assert_eq!(topics.subscription(), "tasmota_cube/#");
    }

    #[test]
    fn test_power_payloads() {
        assert_eq!(PowerState::On.payload(), "ON");
        assert_eq!(PowerState::Off.payload(), "OFF");
    }

    #[test]
    fn test_palette_payload() {
        let single = ColorCommand {
            primary: Rgb::new(255, 0, 0),
            accent: None,
        };
        assert_eq!(palette_payload(&single), "255,0,0");

        let pair = ColorCommand {
            primary: Rgb::new(0, 102, 255),
            accent: Some(Rgb::new(255, 0, 153)),
        };
        assert_eq!(palette_payload(&pair), "0,102,255 255,0,153");
    }

    #[test]
    fn test_restart_report_detected() {
        let topics = DeviceTopics::new("tasmota_cube");
        let payload = br#"{"Info3":{"RestartReason":"Software/System restart","BootCount":12}}"#;
        assert!(topics.is_restart_report("tasmota_cube/INFO3", payload));
        assert!(topics.is_restart_report("tasmota_cube/tele/INFO3", payload));
    }

    #[test]
    fn test_other_messages_ignored() {
        let topics = DeviceTopics::new("tasmota_cube");
        let restart = br#"{"Info3":{"RestartReason":"Power On"}}"#;
        assert!(!topics.is_restart_report("other_device/INFO3", restart));
        assert!(!topics.is_restart_report("tasmota_cubeX/INFO3", restart));
        assert!(!topics.is_restart_report("tasmota_cube/INFO2", restart));
        assert!(!topics.is_restart_report("tasmota_cube/INFO3", br#"{"Info3":{"BootCount":1}}"#));
        assert!(!topics.is_restart_report("tasmota_cube/INFO3", br#"{"RestartReason":"x"}"#));
        assert!(!topics.is_restart_report("tasmota_cube/INFO3", b"not json"));
        assert!(!topics.is_restart_report("tasmota_cube/stat/RESULT", br#"{"POWER":"ON"}"#));
    }

    fn offline_transport(capacity: usize) -> (TasmotaMqtt, EventLoop) {
        let options = MqttOptions::new("weather-cube-test", "127.0.0.1", 1883);
        let (client, eventloop) = AsyncClient::new(options, capacity);
        let transport = TasmotaMqtt {
            client,
            topics: DeviceTopics::new("cube"),
            connected: Arc::new(AtomicBool::new(true)),
        };
        (transport, eventloop)
    }

    fn red() -> ColorCommand {
        ColorCommand {
            primary: Rgb::new(255, 0, 0),
            accent: None,
        }
    }

    #[tokio::test]
    async fn test_publish_fails_when_queue_full() {
        let (transport, _eventloop) = offline_transport(4);

        // Nothing drains the queue: two palette updates fill it.
        assert!(transport.publish_colors(&red()).await.is_ok());
        assert!(transport.publish_colors(&red()).await.is_ok());
        let err = transport.publish_power(PowerState::Off).await.unwrap_err();
        assert!(matches!(err, TransportError::Publish { ref topic, .. } if topic == "cube/cmnd/Power"));
    }

    #[tokio::test]
    async fn test_nothing_queued_while_disconnected() {
        let (transport, mut eventloop) = offline_transport(1);
        transport.connected.store(false, Ordering::Release);

        let err = transport.publish_power(PowerState::Off).await.unwrap_err();
        assert!(matches!(err, TransportError::Publish { ref reason, .. } if reason.contains("not connected")));
        assert!(transport.publish_colors(&red()).await.is_err());

        // The single queue slot is still free.
        transport.connected.store(true, Ordering::Release);
        assert!(transport.publish_power(PowerState::On).await.is_ok());
        eventloop.clean();
        assert_eq!(eventloop.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_waits_for_queue_space() {
        let (transport, mut eventloop) = offline_transport(REQUEST_CAPACITY);
        for _ in 0..REQUEST_CAPACITY {
            transport.publish_power(PowerState::Off).await.unwrap();
        }
        assert!(transport.client.try_subscribe("cube/#", QoS::AtMostOnce).is_err());

        let task = tokio::spawn(subscribe_device(transport.client.clone(), "cube/#".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        // Move the queued commands out of the channel, as a dropped session does.
        eventloop.clean();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("subscription never queued")
            .unwrap();
        eventloop.clean();
        assert_eq!(eventloop.pending.len(), REQUEST_CAPACITY + 1);
    }

    fn inbound(topic: &str, payload: &[u8]) -> Publish {
        Publish::new(topic, QoS::AtMostOnce, payload.to_vec())
    }

    #[test]
    fn test_restart_report_requests_refresh() {
        let topics = DeviceTopics::new("cube");
        let (tx, mut rx) = mpsc::channel(1);

        let report = inbound("cube/tele/INFO3", br#"{"Info3":{"RestartReason":"Power On"}}"#);
        assert!(handle_publish(&topics, &report, &tx));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_other_publish_does_not_request_refresh() {
        let topics = DeviceTopics::new("cube");
        let (tx, mut rx) = mpsc::channel(1);

        let state = inbound("cube/stat/RESULT", br#"{"POWER":"ON"}"#);
        assert!(!handle_publish(&topics, &state, &tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_restart_report_with_pending_refresh() {
        let topics = DeviceTopics::new("cube");
        let (tx, mut rx) = mpsc::channel(1);
        let report = inbound("cube/INFO3", br#"{"Info3":{"RestartReason":"Power On"}}"#);

        assert!(handle_publish(&topics, &report, &tx));
        assert!(handle_publish(&topics, &report, &tx));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
