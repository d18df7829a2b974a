//! Alert delivery with bounded retries.
//!
//! Each alert names a stored photo; delivery is the text message followed
//! by the photo upload, and the alert is acknowledged only when both have
//! gone out. A failure after the text means the text is sent again on the
//! retry, which is the accepted cost of at-least-once delivery. Alerts
//! that keep failing are written to the dead letter table and
//! acknowledged so one bad alert cannot wedge the queue.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;

use crate::notify::MessageTransport;
use crate::now_s;
use crate::queue::{AlertMessage, Disposition};
use crate::store::PhotoStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchStats {
    pub delivered: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
}

pub struct AlertDispatcher<T: MessageTransport> {
    transport: T,
    store: PhotoStore,
    /// Delivery attempts per photo name. Cleared on success or dead
    /// letter; a process restart starts the count over.
    attempts: HashMap<String, u32>,
    max_attempts: u32,
    stats: DispatchStats,
}

impl<T: MessageTransport> AlertDispatcher<T> {
    pub fn new(transport: T, store: PhotoStore, max_attempts: u32) -> Self {
        Self {
            transport,
            store,
            attempts: HashMap::new(),
            max_attempts,
            stats: DispatchStats::default(),
        }
    }

    /// Decide the fate of one queued alert payload.
    pub fn handle(&mut self, payload: &[u8]) -> Disposition {
        let alert = match AlertMessage::from_json(payload) {
            Ok(alert) => alert,
            Err(err) => {
                // A payload that does not parse can never deliver, so it
                // goes straight to the dead letter table.
                log::warn!("dead lettering undeliverable alert: {err:#}");
                self.dead_letter(payload, &format!("{err:#}"), 1);
                return Disposition::Ack;
            }
        };
        match self.deliver(&alert) {
            Ok(()) => {
                self.attempts.remove(&alert.photo_name);
                self.stats.delivered += 1;
                log::info!(
                    "alert delivered: chat {} photo {}",
                    alert.chat_id,
                    alert.photo_name
                );
                Disposition::Ack
            }
            Err(err) => {
                let seen = self.attempts.entry(alert.photo_name.clone()).or_insert(0);
                *seen += 1;
                let seen = *seen;
                if seen >= self.max_attempts {
                    log::error!(
                        "giving up on alert for photo {} after {} attempts: {err:#}",
                        alert.photo_name,
                        seen
                    );
                    self.attempts.remove(&alert.photo_name);
                    self.dead_letter(payload, &format!("{err:#}"), seen);
                    Disposition::Ack
                } else {
                    log::warn!(
                        "alert delivery failed (attempt {seen}/{}): {err:#}",
                        self.max_attempts
                    );
                    self.stats.requeued += 1;
                    Disposition::Requeue
                }
            }
        }
    }

    fn deliver(&mut self, alert: &AlertMessage) -> Result<()> {
        self.transport
            .send_text(&alert.bot_token, &alert.chat_id, &alert.text)
            .context("text send failed")?;
        let photo = self
            .store
            .load_photo(&alert.photo_name)?
            .ok_or_else(|| anyhow!("photo {} not in the store yet", alert.photo_name))?;
        self.transport
            .send_photo(&alert.bot_token, &alert.chat_id, &alert.photo_name, &photo)
            .context("photo send failed")?;
        Ok(())
    }

    fn dead_letter(&mut self, payload: &[u8], reason: &str, attempts: u32) {
        let recorded_at = now_s().unwrap_or(0);
        if let Err(err) = self
            .store
            .record_dead_letter(recorded_at, payload, reason, attempts)
        {
            log::error!("failed to record dead letter: {err:#}");
        }
        self.stats.dead_lettered += 1;
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}
