//! Station storage
//!
//! The registry is one JSON document rewritten atomically on every save.
//! Attempt records go to a separate append-only JSON Lines file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use handgate_core::{AuditSink, AuthAttempt};

use crate::error::Result;
use crate::registry::AccessRegistry;

const REGISTRY_FILE: &str = "registry.json";
const AUDIT_FILE: &str = "audit.jsonl";

/// Station storage rooted at the data directory
#[derive(Debug, Clone)]
pub struct StationStorage {
    base_path: PathBuf,
}

impl StationStorage {
    /// Create a new storage instance, creating the directory if needed
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Data directory
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Load the registry, or an empty one if none was saved yet
    pub fn load_registry(&self) -> Result<AccessRegistry> {
        let path = self.registry_path();
        if !path.exists() {
            debug!(path = %path.display(), "No registry yet, starting empty");
            return Ok(AccessRegistry::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let registry: AccessRegistry = serde_json::from_str(&content)?;
        Ok(registry)
    }

    /// Save the registry
    pub fn save_registry(&self, registry: &AccessRegistry) -> Result<()> {
        let path = self.registry_path();
        let content = serde_json::to_string_pretty(registry)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Append-only audit log in this directory
    pub fn audit_log(&self) -> FileAuditLog {
        FileAuditLog::new(self.base_path.join(AUDIT_FILE))
    }

    fn registry_path(&self) -> PathBuf {
        self.base_path.join(REGISTRY_FILE)
    }
}

/// Audit records as JSON Lines, one record per line
#[derive(Debug, Clone)]
pub struct FileAuditLog {
    path: PathBuf,
}

impl FileAuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, oldest first. Unreadable lines are skipped.
    pub fn entries(&self) -> Result<Vec<AuthAttempt>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(attempt) => entries.push(attempt),
                Err(e) => warn!(line = number + 1, "Skipping unreadable audit record: {}", e),
            }
        }
        Ok(entries)
    }
}

impl AuditSink for FileAuditLog {
    fn append(&mut self, attempt: &AuthAttempt) -> std::io::Result<()> {
        let mut line = serde_json::to_string(attempt)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }
}
