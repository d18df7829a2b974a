//! Still-image directory backend. Replays a directory of images in name
//! order, then reports end of pass and rescans.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub(crate) struct StillDirSource {
    dir: PathBuf,
    /// Reverse-sorted so `pop` walks names in ascending order.
    pending: Vec<PathBuf>,
    scanned: bool,
}

impl StillDirSource {
    pub(crate) fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!(
                "source directory '{}' does not exist or is not a directory",
                dir.display()
            ));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            pending: Vec::new(),
            scanned: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if !self.scanned {
            self.rescan()?;
            self.scanned = true;
        }
        match self.pending.pop() {
            Some(path) => {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("failed to read frame '{}'", path.display()))?;
                Ok(Some(bytes))
            }
            None => {
                // End of pass; pick up directory changes on the next call.
                self.scanned = false;
                Ok(None)
            }
        }
    }

    fn rescan(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list '{}'", self.dir.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list '{}'", self.dir.display()))?
                .path();
            if is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        paths.reverse();
        self.pending = paths;
        Ok(())
    }
}

fn is_image(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return false,
    };
    matches!(ext.as_str(), "jpg" | "jpeg" | "png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_come_back_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"second").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"first").unwrap();
        std::fs::write(dir.path().join("c.jpeg"), b"third").unwrap();

        let mut source = StillDirSource::new(dir.path()).unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap(), b"first");
        assert_eq!(source.next_frame().unwrap().unwrap(), b"second");
        assert_eq!(source.next_frame().unwrap().unwrap(), b"third");
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn non_image_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame.png"), b"frame").unwrap();
        std::fs::write(dir.path().join("README.md"), b"docs").unwrap();
        std::fs::write(dir.path().join("noext"), b"junk").unwrap();

        let mut source = StillDirSource::new(dir.path()).unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap(), b"frame");
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn files_added_between_passes_are_seen() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"one").unwrap();

        let mut source = StillDirSource::new(dir.path()).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());

        std::fs::write(dir.path().join("b.jpg"), b"two").unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap(), b"one");
        assert_eq!(source.next_frame().unwrap().unwrap(), b"two");
    }

    #[test]
    fn empty_directory_reports_end_of_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = StillDirSource::new(dir.path()).unwrap();
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }
}
