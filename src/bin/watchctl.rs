//! watchctl - operator CLI for a running pipeline
//!
//! Talks to samplerd's loopback control endpoint for health and interval
//! changes, and reads the shared SQLite store for evidence photos and
//! dead-lettered alerts.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use emberwatch::config::PipelineConfig;
use emberwatch::store::PhotoStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "watchctl", about = "Inspect and steer the fire detection pipeline")]
struct Args {
    /// Path to the pipeline config file (JSON).
    #[arg(long, env = "EMBERWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query samplerd's health and current capture interval.
    Health,
    /// Change the capture interval of the running samplerd.
    SetInterval {
        /// New interval in seconds (must be at least 1).
        seconds: u64,
    },
    /// List stored evidence photos.
    Photos,
    /// List dead-lettered alerts, newest first.
    DeadLetters {
        /// Maximum number of entries to show.
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = PipelineConfig::load(args.config.as_deref())?;
    match args.command {
        Command::Health => health(&config),
        Command::SetInterval { seconds } => set_interval(&config, seconds),
        Command::Photos => photos(&config),
        Command::DeadLetters { limit } => dead_letters(&config, limit),
    }
}

fn control_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(REQUEST_TIMEOUT)
        .timeout_read(REQUEST_TIMEOUT)
        .build()
}

fn health(config: &PipelineConfig) -> Result<()> {
    let url = format!("http://{}/health", config.control_addr);
    let body = control_agent()
        .get(&url)
        .call()
        .with_context(|| format!("samplerd not reachable at {}", config.control_addr))?
        .into_string()?;
    let health: serde_json::Value =
        serde_json::from_str(&body).context("malformed health response")?;
    println!(
        "samplerd: {} (interval {}s)",
        health["status"].as_str().unwrap_or("unknown"),
        health["interval_secs"]
    );
    Ok(())
}

fn set_interval(config: &PipelineConfig, seconds: u64) -> Result<()> {
    let url = format!("http://{}/interval", config.control_addr);
    let request = serde_json::json!({ "seconds": seconds }).to_string();
    let response = control_agent()
        .put(&url)
        .set("Content-Type", "application/json")
        .send_string(&request);
    match response {
        Ok(response) => {
            let body: serde_json::Value = serde_json::from_str(&response.into_string()?)
                .context("malformed interval response")?;
            println!("capture interval set to {}s", body["interval_secs"]);
            Ok(())
        }
        Err(ureq::Error::Status(code, response)) => {
            let detail = response
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<serde_json::Value>(&body).ok())
                .and_then(|body| body["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {code}"));
            Err(anyhow!("samplerd refused the interval: {detail}"))
        }
        Err(err) => {
            Err(err).with_context(|| format!("samplerd not reachable at {}", config.control_addr))
        }
    }
}

fn photos(config: &PipelineConfig) -> Result<()> {
    let store = PhotoStore::open(&config.store_path)?;
    let photos = store.list_photos()?;
    if photos.is_empty() {
        println!("no evidence photos stored");
        return Ok(());
    }
    for photo in &photos {
        println!("{}\tstored_at={}", photo.name, photo.stored_at);
    }
    println!("{} photo(s)", photos.len());
    Ok(())
}

fn dead_letters(config: &PipelineConfig, limit: u32) -> Result<()> {
    let store = PhotoStore::open(&config.store_path)?;
    let letters = store.list_dead_letters(limit)?;
    if letters.is_empty() {
        println!("no dead-lettered alerts");
        return Ok(());
    }
    for letter in &letters {
        println!(
            "#{}\trecorded_at={}\tattempts={}\t{}",
            letter.id, letter.recorded_at, letter.attempts, letter.reason
        );
    }
    Ok(())
}
