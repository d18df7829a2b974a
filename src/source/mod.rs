//! Frame acquisition.
//!
//! A `FrameSource` hides three backends behind one capture call:
//!
//! - `stub://<pattern>`: synthetic frames, no hardware. `scene` renders a
//!   moving gradient, `flat` renders a uniform image that the quality
//!   screen rejects.
//! - `http://` / `https://`: a camera endpoint. Multipart MJPEG streams and
//!   single-shot snapshot URLs are both handled; the mode is probed on the
//!   first capture.
//! - a filesystem directory: still images replayed in name order, one per
//!   capture, rescanned after each pass.
//!
//! Sources (re)open themselves on demand. A capture that cannot produce a
//! frame returns a `SourceUnavailable` error and the caller moves on; the
//! next capture attempts a fresh connection. `Ok(None)` means the source
//! ran out of material for this pass, which only finite sources report.

mod http;
mod still;
mod stub;

use anyhow::{anyhow, Result};
use std::path::Path;

use http::HttpSource;
use still::StillDirSource;
use stub::StubScene;

/// Typed capture failure. Transient by definition: the source will try to
/// reconnect on the next capture.
#[derive(Debug)]
pub struct SourceUnavailable {
    pub detail: String,
}

impl SourceUnavailable {
    pub(crate) fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for SourceUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source unavailable: {}", self.detail)
    }
}

impl std::error::Error for SourceUnavailable {}

/// Capture counters for the health log.
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceStats {
    pub frames: u64,
    pub failures: u64,
}

enum SourceBackend {
    Stub(StubScene),
    Http(HttpSource),
    StillDir(StillDirSource),
}

/// One video source behind a uniform capture interface.
pub struct FrameSource {
    descriptor: String,
    backend: SourceBackend,
    stats: SourceStats,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("descriptor", &self.descriptor)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl FrameSource {
    /// Open a source from its descriptor. The descriptor decides the
    /// backend; anything without a scheme is treated as a still directory.
    pub fn open(descriptor: &str) -> Result<Self> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(anyhow!("source descriptor must not be empty"));
        }
        let backend = if let Some(pattern) = descriptor.strip_prefix("stub://") {
            SourceBackend::Stub(StubScene::new(pattern)?)
        } else if descriptor.starts_with("http://") || descriptor.starts_with("https://") {
            SourceBackend::Http(HttpSource::new(descriptor)?)
        } else if descriptor.contains("://") {
            return Err(anyhow!(
                "unsupported source scheme in '{}': expected stub://, http(s)://, or a directory path",
                descriptor
            ));
        } else {
            SourceBackend::StillDir(StillDirSource::new(Path::new(descriptor))?)
        };
        Ok(Self {
            descriptor: descriptor.to_string(),
            backend,
            stats: SourceStats::default(),
        })
    }

    /// Capture one encoded frame. `Ok(None)` is end of material for this
    /// pass; errors are transient and the next call retries from scratch.
    pub fn capture_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let result = match &mut self.backend {
            SourceBackend::Stub(stub) => stub.next_frame().map(Some),
            SourceBackend::Http(http) => http.next_frame().map(Some),
            SourceBackend::StillDir(dir) => dir.next_frame(),
        };
        match &result {
            Ok(Some(_)) => self.stats.frames += 1,
            Ok(None) => {}
            Err(_) => self.stats.failures += 1,
        }
        result
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }
}
