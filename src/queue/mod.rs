//! Durable frame and alert queues over MQTT.
//!
//! Both hops of the pipeline ride one broker: samplerd publishes frames,
//! detectord consumes frames and publishes alerts, notifierd consumes
//! alerts. Delivery is at-least-once end to end:
//!
//! - everything is published at QoS 1,
//! - consumers connect with `clean_session = false` under a stable client
//!   id, so the broker holds their subscriptions and undelivered messages
//!   while they are down,
//! - consumers ack manually, only after the handler disposes of a message.
//!
//! A handler that cannot finish a message requeues it by dropping the
//! connection without acking; the broker redelivers on session resume.
//! Consumers reconnect forever once they have reached the broker at least
//! once, but a broker that is unreachable at process start is a
//! configuration problem and aborts startup.

mod endpoint;
pub mod wire;

pub use endpoint::{parse_broker_endpoint, BrokerEndpoint, DEFAULT_MQTT_PORT};
pub use wire::{frame_from_payload, AlertMessage};

use anyhow::{anyhow, Context, Result};
use rumqttc::{Client, Connection, Event, Incoming, LastWill, MqttOptions, Publish, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::FrameSink;
use crate::config::PipelineConfig;
use crate::frame::CapturedFrame;
use crate::infer::AlertSink;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const CHANNEL_CAPACITY: usize = 10;
/// Raised from rumqttc's small default so full-resolution snapshots fit.
const MAX_PACKET_BYTES: usize = 8 * 1024 * 1024;

/// Broker endpoint plus naming shared by every daemon.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub endpoint: BrokerEndpoint,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
}

impl QueueSettings {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            endpoint: parse_broker_endpoint(&config.broker_addr)?,
            username: config.broker_username.clone(),
            password: config.broker_password.clone(),
            topic_prefix: config.topic_prefix.clone(),
        })
    }

    pub fn frame_topic(&self) -> String {
        format!("{}/frames", self.topic_prefix)
    }

    pub fn alert_topic(&self) -> String {
        format!("{}/alerts", self.topic_prefix)
    }

    fn status_topic(&self, role: &str) -> String {
        format!("{}/status/{}", self.topic_prefix, role)
    }

    /// Session resume requires the id to be identical across restarts, so
    /// it is derived from config rather than randomized.
    fn client_id(&self, role: &str) -> String {
        format!("{}-{}", self.topic_prefix, role)
    }

    fn base_options(&self, role: &str) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.client_id(role),
            self.endpoint.host.clone(),
            self.endpoint.port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        options.set_max_packet_size(MAX_PACKET_BYTES, MAX_PACKET_BYTES);
        if let Some(user) = &self.username {
            options.set_credentials(user, self.password.clone().unwrap_or_default());
        }
        options
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Frame publisher used by samplerd. A background thread pumps the MQTT
/// event loop; publishes ride the client's bounded request channel, which
/// applies backpressure while the broker is unreachable.
pub struct QueuePublisher {
    client: Client,
    frame_topic: String,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl QueuePublisher {
    /// Connect and wait for the broker to accept the session. An
    /// unreachable broker at startup aborts instead of retrying.
    pub fn connect(settings: &QueueSettings) -> Result<Self> {
        let status_topic = settings.status_topic("sampler");
        let mut options = settings.base_options("sampler");
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            status_topic.as_str(),
            b"offline".to_vec(),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, connection) = Client::new(options, CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let pump = Some(spawn_pump(connection, Arc::clone(&stop), ready_tx));

        let mut publisher = Self {
            client,
            frame_topic: settings.frame_topic(),
            stop,
            pump,
        };
        if ready_rx.recv_timeout(STARTUP_TIMEOUT).is_err() {
            let endpoint = settings.endpoint.clone();
            let _ = publisher.shutdown_inner();
            return Err(anyhow!(
                "broker at {} did not accept the MQTT session within {}s",
                endpoint,
                STARTUP_TIMEOUT.as_secs()
            ));
        }
        publisher
            .client
            .publish(status_topic.as_str(), QoS::AtLeastOnce, true, b"online".to_vec())
            .context("failed to announce sampler status")?;
        Ok(publisher)
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.client.disconnect();
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl FrameSink for QueuePublisher {
    fn publish_frame(&mut self, frame: &CapturedFrame) -> Result<()> {
        let payload = wire::frame_to_payload(frame)?;
        self.client
            .publish(self.frame_topic.as_str(), QoS::AtLeastOnce, false, payload)
            .context("failed to queue frame")?;
        Ok(())
    }
}

/// Drives the connection until shutdown. Signals `ready` on the first
/// ConnAck; thereafter the loop rides out broker outages on its own.
fn spawn_pump(
    mut connection: Connection,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<()>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut announced = false;
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    if announced {
                        log::info!("MQTT session re-established");
                    } else {
                        announced = true;
                        let _ = ready.send(());
                        log::info!("MQTT session established");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    log::warn!("MQTT connection error: {err}. Retrying...");
                    std::thread::sleep(RECONNECT_DELAY);
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Handler verdict for one delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Done with the message; ack it to the broker.
    Ack,
    /// Could not finish; leave it unacked and force redelivery.
    Requeue,
}

enum SessionEnd {
    Shutdown,
    Requeue,
    ConnectionLost,
}

/// QoS 1 subscriber with manual acks. `run` blocks until shutdown,
/// handing each publish to the handler together with the session client
/// so handlers can publish downstream messages on the same connection.
pub struct QueueConsumer {
    settings: QueueSettings,
    role: &'static str,
    topic: String,
}

impl QueueConsumer {
    pub fn new(settings: QueueSettings, role: &'static str, topic: String) -> Self {
        Self {
            settings,
            role,
            topic,
        }
    }

    pub fn run<F>(&self, shutdown: &AtomicBool, mut handle: F) -> Result<()>
    where
        F: FnMut(&Publish, &Client) -> Disposition,
    {
        let mut ever_connected = false;
        while !shutdown.load(Ordering::SeqCst) {
            let mut options = self.settings.base_options(self.role);
            options.set_clean_session(false);
            options.set_manual_acks(true);
            let (client, mut connection) = Client::new(options, CHANNEL_CAPACITY);
            client
                .subscribe(self.topic.as_str(), QoS::AtLeastOnce)
                .context("failed to subscribe")?;

            let end = drive_session(
                &self.topic,
                &client,
                &mut connection,
                shutdown,
                &mut handle,
                &mut ever_connected,
            )?;
            drop(connection);
            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Requeue | SessionEnd::ConnectionLost => {
                    if !shutdown.load(Ordering::SeqCst) {
                        std::thread::sleep(RECONNECT_DELAY);
                    }
                }
            }
        }
        Ok(())
    }
}

fn drive_session<F>(
    topic: &str,
    client: &Client,
    connection: &mut Connection,
    shutdown: &AtomicBool,
    handle: &mut F,
    ever_connected: &mut bool,
) -> Result<SessionEnd>
where
    F: FnMut(&Publish, &Client) -> Disposition,
{
    for event in connection.iter() {
        if shutdown.load(Ordering::SeqCst) {
            let _ = client.disconnect();
            return Ok(SessionEnd::Shutdown);
        }
        match event {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                *ever_connected = true;
                log::info!(
                    "MQTT session established on {} (resumed: {})",
                    topic,
                    ack.session_present
                );
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                match handle(&publish, client) {
                    Disposition::Ack => {
                        client.ack(&publish).context("failed to ack message")?;
                    }
                    Disposition::Requeue => {
                        // Dropping the connection without the ack makes the
                        // broker redeliver on session resume.
                        log::info!("requeueing message from {}", topic);
                        return Ok(SessionEnd::Requeue);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                if !*ever_connected {
                    return Err(anyhow!(
                        "broker unreachable at startup on {}: {err}",
                        topic
                    ));
                }
                log::error!("MQTT connection error: {err}. Reconnecting...");
                return Ok(SessionEnd::ConnectionLost);
            }
        }
    }
    Ok(SessionEnd::ConnectionLost)
}

// ---------------------------------------------------------------------------
// Sinks over the session client
// ---------------------------------------------------------------------------

/// Alert sink bound to a consumer session's client, so detection and the
/// alert publish share one broker connection.
pub struct MqttAlertSink<'a> {
    client: &'a Client,
    topic: &'a str,
}

impl<'a> MqttAlertSink<'a> {
    pub fn new(client: &'a Client, topic: &'a str) -> Self {
        Self { client, topic }
    }
}

impl AlertSink for MqttAlertSink<'_> {
    fn publish_alert(&mut self, alert: &AlertMessage) -> Result<()> {
        let payload = alert.to_json()?;
        self.client
            .publish(self.topic, QoS::AtLeastOnce, false, payload)
            .context("failed to queue alert")?;
        Ok(())
    }
}
