//! notifierd - alert delivery daemon
//!
//! This daemon:
//! 1. Consumes alerts from the alert topic with manual acks
//! 2. Sends the alert text, then the stored photo, over the Telegram Bot API
//! 3. Acknowledges only when both sends succeeded
//! 4. Dead letters alerts that exhaust their delivery attempts

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use emberwatch::config::PipelineConfig;
use emberwatch::notify::{AlertDispatcher, TelegramClient};
use emberwatch::queue::{QueueConsumer, QueueSettings};
use emberwatch::store::PhotoStore;

#[derive(Parser, Debug)]
#[command(
    name = "notifierd",
    about = "Delivers queued fire alerts over the Telegram Bot API"
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

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let store = PhotoStore::open(&config.store_path)?;
    let transport = TelegramClient::with_api_base(&config.telegram_api_base);
    let mut dispatcher = AlertDispatcher::new(transport, store, config.max_delivery_attempts);

    let settings = QueueSettings::from_config(&config)?;
    let alert_topic = settings.alert_topic();
    log::info!(
        "delivering alerts from {} (up to {} attempts each)",
        alert_topic,
        config.max_delivery_attempts
    );
    let consumer = QueueConsumer::new(settings, "notifier", alert_topic);

    consumer.run(&shutdown, |publish, _client| {
        dispatcher.handle(&publish.payload)
    })?;

    let stats = dispatcher.stats();
    log::info!(
        "notifierd stopped: delivered={} requeued={} dead_lettered={}",
        stats.delivered,
        stats.requeued,
        stats.dead_lettered
    );
    Ok(())
}
