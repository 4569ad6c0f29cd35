//! PID rendezvous registry
//!
//! An append-only text file of `<TAG> <PID>\n` records. Every unit of the
//! simulation publishes its tag once at start-up; readers scan for a tag.
//!
//! Writers hold an exclusive lock for the duration of the append and emit
//! the whole record with a single `write_all`, readers hold a shared lock,
//! so a reader never observes a half-written record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Tag the supervisor publishes itself under
pub const SUPERVISOR_TAG: &str = "WD";

/// Default registry location
pub fn default_registry_path() -> PathBuf {
    std::env::temp_dir().join("dronenet").join("pids.txt")
}

/// One `<TAG> <PID>` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub tag: String,
    pub pid: u32,
}

impl Entry {
    /// Parse a single registry line, ignoring anything that is not `<TAG> <PID>`
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let tag = parts.next()?;
        let pid = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            tag: tag.to_string(),
            pid,
        })
    }
}

/// File-backed rendezvous registry
#[derive(Debug, Clone)]
pub struct PidRegistry {
    path: PathBuf,
}

impl PidRegistry {
    /// Open a registry at the given path (the file is created lazily)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "PidRegistry::new: called");
        Self { path }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the registry (done once by the launcher before any unit starts)
    pub fn reset(&self) -> Result<()> {
        debug!(?self.path, "PidRegistry::reset: called");
        self.ensure_parent()?;
        let file = File::create(&self.path).context("Failed to create registry file")?;
        file.lock_exclusive().context("Failed to lock registry")?;
        file.set_len(0).context("Failed to truncate registry")?;
        file.unlock().context("Failed to unlock registry")?;
        Ok(())
    }

    /// Append a `<TAG> <PID>` record under an exclusive lock
    pub fn publish(&self, tag: &str, pid: u32) -> Result<()> {
        debug!(tag, pid, "PidRegistry::publish: called");
        if tag.is_empty() || tag.contains(char::is_whitespace) {
            return Err(eyre::eyre!("Invalid registry tag: {:?}", tag));
        }
        self.ensure_parent()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open registry for append")?;

        file.lock_exclusive().context("Failed to lock registry")?;
        let record = format!("{} {}\n", tag, pid);
        let written = file.write_all(record.as_bytes()).and_then(|_| file.flush());
        file.unlock().context("Failed to unlock registry")?;
        written.context("Failed to write registry record")?;

        info!(tag, pid, path = ?self.path, "Published PID");
        Ok(())
    }

    /// All well-formed records in file order
    pub fn entries(&self) -> Result<Vec<Entry>> {
        debug!(?self.path, "PidRegistry::entries: called");
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).context("Failed to open registry")?;
        file.lock_shared().context("Failed to lock registry")?;
        let entries = BufReader::new(&file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| Entry::parse(&line))
            .collect();
        file.unlock().context("Failed to unlock registry")?;
        Ok(entries)
    }

    /// First PID published under `tag`
    pub fn lookup(&self, tag: &str) -> Result<Option<u32>> {
        debug!(tag, "PidRegistry::lookup: called");
        let pid = self.entries()?.into_iter().find(|e| e.tag == tag).map(|e| e.pid);
        debug!(tag, ?pid, "PidRegistry::lookup: returning");
        Ok(pid)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create registry directory")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_parse() {
        assert_eq!(
            Entry::parse("DRONE 4242"),
            Some(Entry {
                tag: "DRONE".to_string(),
                pid: 4242
            })
        );
        assert_eq!(Entry::parse("DRONE"), None);
        assert_eq!(Entry::parse("DRONE abc"), None);
        assert_eq!(Entry::parse("DRONE 1 2"), None);
        assert_eq!(Entry::parse(""), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = PidRegistry::new(temp.path().join("none.txt"));
        assert!(registry.entries().unwrap().is_empty());
        assert_eq!(registry.lookup("WD").unwrap(), None);
    }

    #[test]
    fn test_publish_and_lookup() {
        let temp = TempDir::new().unwrap();
        let registry = PidRegistry::new(temp.path().join("sub").join("pids.txt"));

        registry.publish(SUPERVISOR_TAG, 100).unwrap();
        registry.publish("DRONE", 200).unwrap();
        registry.publish("BB", 300).unwrap();

        assert_eq!(registry.lookup("DRONE").unwrap(), Some(200));
        assert_eq!(registry.lookup(SUPERVISOR_TAG).unwrap(), Some(100));
        assert_eq!(registry.lookup("TARGET").unwrap(), None);

        let contents = std::fs::read_to_string(registry.path()).unwrap();
        assert_eq!(contents, "WD 100\nDRONE 200\nBB 300\n");
    }

    #[test]
    fn test_lookup_returns_first_record() {
        let temp = TempDir::new().unwrap();
        let registry = PidRegistry::new(temp.path().join("pids.txt"));

        registry.publish("DRONE", 1).unwrap();
        registry.publish("DRONE", 2).unwrap();
        assert_eq!(registry.lookup("DRONE").unwrap(), Some(1));
        assert_eq!(registry.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_publish_rejects_bad_tags() {
        let temp = TempDir::new().unwrap();
        let registry = PidRegistry::new(temp.path().join("pids.txt"));
        assert!(registry.publish("", 1).is_err());
        assert!(registry.publish("TWO WORDS", 1).is_err());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pids.txt");
        std::fs::write(&path, "garbage\nWD 7\nhalf").unwrap();

        let registry = PidRegistry::new(path);
        let entries = registry.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tag, "WD");
    }

    #[test]
    fn test_reset_truncates() {
        let temp = TempDir::new().unwrap();
        let registry = PidRegistry::new(temp.path().join("pids.txt"));
        registry.publish("WD", 1).unwrap();
        registry.reset().unwrap();
        assert!(registry.entries().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_publishers_never_interleave() {
        let temp = TempDir::new().unwrap();
        let registry = PidRegistry::new(temp.path().join("pids.txt"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let r = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        r.publish(&format!("W{}", i), j).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let contents = std::fs::read_to_string(registry.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|l| Entry::parse(l).is_some()));
    }
}
