//! Most recent decision id per model name.
//!
//! Rewards sent without an explicit decision id are attributed to the last
//! decision tracked for the same model name. The ledger holds that mapping.
//! Slot updates are last-write-wins under a mutex; the whole ledger can be
//! snapshotted and restored (or saved to a JSON file) so attribution survives
//! a process restart.
//!
//! A ledger created with [`DecisionLedger::open`] is backed by a file and
//! rewrites it on every change, so no explicit save is needed. Each write
//! goes to a sibling temp file that is then renamed over the target.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::ksuid::Ksuid;

/// Serializable copy of a [`DecisionLedger`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Model name -> most recent decision id.
    pub latest: BTreeMap<String, Ksuid>,
}

impl LedgerSnapshot {
    fn of(latest: &HashMap<String, Ksuid>) -> Self {
        Self {
            latest: latest.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

/// Latest decision id per model name, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct DecisionLedger {
    latest: Mutex<HashMap<String, Ksuid>>,
    path: Option<PathBuf>,
}

impl DecisionLedger {
    /// Empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// File-backed ledger at `path`.
    ///
    /// An existing file is loaded; a missing one starts an empty ledger and
    /// is created on the first change. Every later `record`, `forget` and
    /// `restore` rewrites the file before returning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let latest = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let snapshot: LedgerSnapshot = serde_json::from_str(&raw)?;
            snapshot.latest.into_iter().collect()
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), models = latest.len(), "opened decision ledger");
        Ok(Self {
            latest: Mutex::new(latest),
            path: Some(path),
        })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Remember `id` as the latest decision of `model`, replacing any previous one.
    ///
    /// Fails only when a backing file can't be written; the in-memory slot is
    /// updated either way.
    pub fn record(&self, model: &str, id: Ksuid) -> Result<()> {
        let mut latest = self.latest.lock();
        latest.insert(model.to_string(), id);
        self.persist(&latest)
    }

    /// Latest decision id recorded for `model`.
    pub fn latest(&self, model: &str) -> Option<Ksuid> {
        self.latest.lock().get(model).copied()
    }

    /// Drop the slot for `model`, returning what it held.
    pub fn forget(&self, model: &str) -> Result<Option<Ksuid>> {
        let mut latest = self.latest.lock();
        let old = latest.remove(model);
        if old.is_some() {
            self.persist(&latest)?;
        }
        Ok(old)
    }

    /// Number of models with a recorded decision.
    pub fn len(&self) -> usize {
        self.latest.lock().len()
    }

    /// True when no decision has been recorded.
    pub fn is_empty(&self) -> bool {
        self.latest.lock().is_empty()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::of(&self.latest.lock())
    }

    /// Replace the ledger contents with `snapshot`.
    pub fn restore(&self, snapshot: LedgerSnapshot) -> Result<()> {
        let n = snapshot.latest.len();
        let mut latest = self.latest.lock();
        *latest = snapshot.latest.into_iter().collect();
        debug!(models = n, "restored decision ledger");
        self.persist(&latest)
    }

    /// In-memory ledger holding `snapshot`.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            latest: Mutex::new(snapshot.latest.into_iter().collect()),
            path: None,
        }
    }

    /// Write the current snapshot as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_snapshot(path.as_ref(), &self.snapshot())
    }

    /// Read a ledger previously written by [`DecisionLedger::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    // Called with the lock held so file writes land in update order.
    fn persist(&self, latest: &HashMap<String, Ksuid>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_snapshot(path, &LedgerSnapshot::of(latest)).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to persist decision ledger");
        })
    }
}

fn write_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(t: i64, b: u8) -> Ksuid {
        Ksuid::from_parts(t, [b; 16]).unwrap()
    }

    #[test]
    fn last_write_wins_per_name() {
        let ledger = DecisionLedger::new();
        assert!(ledger.latest("m").is_none());
        ledger.record("m", id(1_500_000_000, 1)).unwrap();
        ledger.record("m", id(1_500_000_001, 2)).unwrap();
        ledger.record("other", id(1_500_000_000, 3)).unwrap();
        assert_eq!(ledger.latest("m"), Some(id(1_500_000_001, 2)));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.forget("m").unwrap(), Some(id(1_500_000_001, 2)));
        assert!(ledger.latest("m").is_none());
    }

    #[test]
    fn snapshot_restore() {
        let a = DecisionLedger::new();
        a.record("greetings", id(1_600_000_000, 9)).unwrap();
        let snap = a.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        let b = DecisionLedger::from_snapshot(back);
        assert_eq!(b.latest("greetings"), a.latest("greetings"));
    }

    #[test]
    fn opened_ledger_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let a = DecisionLedger::open(&path).unwrap();
        assert!(a.is_empty());
        assert!(!path.exists());
        a.record("m", id(1_500_000_000, 4)).unwrap();
        a.record("n", id(1_500_000_002, 5)).unwrap();
        assert_eq!(DecisionLedger::load(&path).unwrap().latest("m"), Some(id(1_500_000_000, 4)));

        a.forget("m").unwrap();
        let b = DecisionLedger::open(&path).unwrap();
        assert_eq!(b.path(), Some(path.as_path()));
        assert!(b.latest("m").is_none());
        assert_eq!(b.latest("n"), Some(id(1_500_000_002, 5)));
    }

    #[test]
    fn unwritable_backing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DecisionLedger::open(dir.path().join("missing").join("ledger.json")).unwrap();
        assert!(ledger.record("m", id(1_500_000_000, 6)).is_err());
        assert_eq!(ledger.latest("m"), Some(id(1_500_000_000, 6)));
    }
}
