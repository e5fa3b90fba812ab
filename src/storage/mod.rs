mod directory;

pub use directory::DirectoryStore;

use anyhow::Result;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Key-value sink for alert evidence (JPEG bytes and JSON reports)
pub trait EvidenceStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Storage keys for one alert's evidence image and report.
///
/// The alert id never repeats within a process, so keys never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceKeys {
    pub image: String,
    pub report: String,
}

impl EvidenceKeys {
    pub fn new(alert_id: u64, label: &str, at: &DateTime<Local>) -> Self {
        let stamp = at.format("%Y%m%d_%H%M%S");
        let label = sanitize(label);
        Self {
            image: format!("alert_{alert_id}_{label}_{stamp}.jpg"),
            report: format!("report_{alert_id}_{label}_{stamp}.json"),
        }
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Keeps evidence in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

impl EvidenceStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
