//! samplerd - frame sampling daemon
//!
//! This daemon:
//! 1. Opens the configured frame source (synthetic, HTTP camera, still dir)
//! 2. Samples a frame per capture interval and screens out degenerate ones
//! 3. Publishes usable frames to the frame topic at QoS 1
//! 4. Serves a loopback control endpoint for live interval changes

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use emberwatch::capture::{control, CaptureInterval, CaptureScheduler};
use emberwatch::config::PipelineConfig;
use emberwatch::queue::{QueuePublisher, QueueSettings};
use emberwatch::source::FrameSource;

#[derive(Parser, Debug)]
#[command(
    name = "samplerd",
    about = "Samples frames from a video source and publishes them to the frame queue"
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

    let interval = Arc::new(
        CaptureInterval::new(config.capture_interval_secs)
            .context("invalid capture interval in config")?,
    );
    let control = control::spawn(&config.control_addr, Arc::clone(&interval))?;

    let source = FrameSource::open(&config.source_url)?;

    let settings = QueueSettings::from_config(&config)?;
    let publisher = QueuePublisher::connect(&settings)?;
    log::info!("publishing frames to {}", settings.frame_topic());

    let mut scheduler = CaptureScheduler::new(source, publisher, interval);
    scheduler.run(&shutdown);

    control.stop();
    scheduler.into_sink().shutdown()?;
    log::info!("samplerd stopped");
    Ok(())
}
