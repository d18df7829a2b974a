//! detectord - fire detection daemon
//!
//! This daemon:
//! 1. Consumes frames from the frame topic with manual acks
//! 2. Re-screens frame quality, then runs the fire classifier
//! 3. Suppresses repeat detections of the same scene inside the quiet window
//! 4. Stores an evidence photo and publishes one alert per new fire event
//!
//! Classifier faults requeue the frame; frames that cannot decode are
//! acked and dropped, since redelivery cannot fix a bad payload.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use emberwatch::config::PipelineConfig;
use emberwatch::infer::{open_classifier, AlertDestination, DetectionHandler};
use emberwatch::queue::{self, Disposition, MqttAlertSink, QueueConsumer, QueueSettings};
use emberwatch::store::PhotoStore;

#[derive(Parser, Debug)]
#[command(
    name = "detectord",
    about = "Classifies queued frames and publishes fire alerts"
)]
struct Args {
    /// Path to the pipeline config file (JSON).
    #[arg(long, env = "EMBERWATCH_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = PipelineConfig::load(args.config.as_deref())?;
    if config.chat_id.is_empty() || config.bot_token.is_empty() {
        return Err(anyhow!(
            "chat_id and bot_token must be configured before alerts can be addressed"
        ));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let store = PhotoStore::open(&config.store_path)?;
    let mut classifier = open_classifier(&config)?;
    classifier.warm_up()?;
    log::info!("classifier '{}' ready", classifier.name());

    let destination = AlertDestination {
        chat_id: config.chat_id.clone(),
        bot_token: config.bot_token.clone(),
    };
    let mut handler = DetectionHandler::new(classifier, store, destination);

    let settings = QueueSettings::from_config(&config)?;
    let frame_topic = settings.frame_topic();
    let alert_topic = settings.alert_topic();
    let consumer = QueueConsumer::new(settings, "detector", frame_topic);

    consumer.run(&shutdown, |publish, client| {
        let frame = match queue::frame_from_payload(&publish.payload) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("dropping undecodable frame payload: {err:#}");
                return Disposition::Ack;
            }
        };
        let mut alerts = MqttAlertSink::new(client, &alert_topic);
        match handler.handle(&frame, &mut alerts) {
            Ok(detection) => {
                log::debug!(
                    "frame captured {}: {:?} p={:.2}",
                    frame.captured_at,
                    detection.label,
                    detection.probability
                );
                Disposition::Ack
            }
            Err(err) => {
                log::warn!("detection failed, requeueing frame: {err:#}");
                Disposition::Requeue
            }
        }
    })?;

    let stats = handler.stats();
    log::info!(
        "detectord stopped: frames={} degenerate={} fires={} alerts={}",
        stats.frames,
        stats.degenerate,
        stats.fires,
        stats.alerts
    );
    Ok(())
}
