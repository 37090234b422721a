//! Persisted set of spent card signatures.
//!
//! [`NullifierStore::merge`] is the only mutation. Every backend implements it
//! as a single read-merge-write so that two sessions finishing at the same time
//! compose by union instead of overwriting each other.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use questgate_common::{GoalId, GoalKind, NullifierSet};
use sled::Db;

use crate::error::StoreError;

#[derive(Clone)]
pub struct NullifierStore {
    backend: Arc<NullifierBackend>,
}

enum NullifierBackend {
    InMemory(Mutex<NullifierSet>),
    Sled(Db),
    JsonFile(JsonFileBackend),
}

impl NullifierStore {
    pub fn in_memory() -> Self {
        Self::from_set(NullifierSet::new())
    }

    /// In-memory store seeded with existing nullifiers.
    pub fn from_set(set: NullifierSet) -> Self {
        Self {
            backend: Arc::new(NullifierBackend::InMemory(Mutex::new(set))),
        }
    }

    /// Sled-backed store: one key per goal, holding its sorted signature list.
    pub fn sled(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let db = sled::open(path)?;
        Ok(Self {
            backend: Arc::new(NullifierBackend::Sled(db)),
        })
    }

    /// JSON document store using the two-group `{"quests": .., "powers": ..}` layout.
    ///
    /// Nothing is created on disk until the first [`Self::merge`].
    pub fn json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        Ok(Self {
            backend: Arc::new(NullifierBackend::JsonFile(JsonFileBackend {
                path: path.to_path_buf(),
                guard: Mutex::new(()),
            })),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match &*self.backend {
            NullifierBackend::InMemory(_) => "memory",
            NullifierBackend::Sled(_) => "sled",
            NullifierBackend::JsonFile(_) => "json",
        }
    }

    /// Every spent signature. Missing storage reads as an empty set.
    pub fn load(&self) -> Result<NullifierSet, StoreError> {
        match &*self.backend {
            NullifierBackend::InMemory(set) => {
                Ok(set.lock().map_err(|_| StoreError::Poisoned)?.clone())
            }
            NullifierBackend::Sled(db) => {
                let mut set = NullifierSet::new();
                for entry in db.iter() {
                    let (key, value) = entry?;
                    let Some((kind, goal_id)) = decode_key(&key) else {
                        tracing::warn!(
                            key = %hex::encode(&key),
                            "skipping unrecognised nullifier key"
                        );
                        continue;
                    };
                    let sigs: BTreeSet<String> = serde_json::from_slice(&value)?;
                    set.merge(kind, goal_id, sigs);
                }
                Ok(set)
            }
            NullifierBackend::JsonFile(file) => file.read_shared(),
        }
    }

    /// Spent signatures for one goal.
    pub fn query(&self, kind: GoalKind, goal_id: GoalId) -> Result<BTreeSet<String>, StoreError> {
        match &*self.backend {
            NullifierBackend::InMemory(set) => Ok(set
                .lock()
                .map_err(|_| StoreError::Poisoned)?
                .spent(kind, goal_id)),
            NullifierBackend::Sled(db) => match db.get(encode_key(kind, goal_id))? {
                Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
                None => Ok(BTreeSet::new()),
            },
            NullifierBackend::JsonFile(file) => Ok(file.read_shared()?.spent(kind, goal_id)),
        }
    }

    /// Record `signatures` as spent for one goal. Returns how many were new.
    pub fn merge<I, S>(
        &self,
        kind: GoalKind,
        goal_id: GoalId,
        signatures: I,
    ) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let incoming: BTreeSet<String> = signatures.into_iter().map(Into::into).collect();
        if incoming.is_empty() {
            return Ok(0);
        }

        let added = match &*self.backend {
            NullifierBackend::InMemory(set) => set
                .lock()
                .map_err(|_| StoreError::Poisoned)?
                .merge(kind, goal_id, incoming),
            NullifierBackend::Sled(db) => merge_sled(db, kind, goal_id, incoming)?,
            NullifierBackend::JsonFile(file) => file.merge(kind, goal_id, incoming)?,
        };

        tracing::debug!(
            backend = self.backend_name(),
            %kind,
            goal_id,
            added,
            "merged nullifiers"
        );
        Ok(added)
    }
}

fn merge_sled(
    db: &Db,
    kind: GoalKind,
    goal_id: GoalId,
    incoming: BTreeSet<String>,
) -> Result<usize, StoreError> {
    let key = encode_key(kind, goal_id);
    loop {
        let current = db.get(key)?;
        let mut sigs: BTreeSet<String> = match &current {
            Some(bytes) => serde_json::from_slice(bytes)?,
            None => BTreeSet::new(),
        };
        let before = sigs.len();
        sigs.extend(incoming.iter().cloned());
        let added = sigs.len() - before;
        if added == 0 {
            return Ok(0);
        }

        let next = serde_json::to_vec(&sigs)?;
        match db.compare_and_swap(key, current, Some(next))? {
            Ok(()) => {
                db.flush()?;
                return Ok(added);
            }
            // Another writer got in between the read and the swap; merge again.
            Err(_) => continue,
        }
    }
}

fn encode_key(kind: GoalKind, goal_id: GoalId) -> [u8; 9] {
    let mut buf = [0u8; 9];
    buf[0] = match kind {
        GoalKind::Quest => b'q',
        GoalKind::Power => b'p',
    };
    buf[1..].copy_from_slice(&goal_id.to_be_bytes());
    buf
}

fn decode_key(key: &[u8]) -> Option<(GoalKind, GoalId)> {
    if key.len() != 9 {
        return None;
    }
    let kind = match key[0] {
        b'q' => GoalKind::Quest,
        b'p' => GoalKind::Power,
        _ => return None,
    };
    let mut id = [0u8; 8];
    id.copy_from_slice(&key[1..]);
    Some((kind, GoalId::from_be_bytes(id)))
}

fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| StoreError::File {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON DOCUMENT BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

struct JsonFileBackend {
    path: PathBuf,
    /// Serializes writers inside this process; the lock file covers other processes.
    guard: Mutex<()>,
}

impl JsonFileBackend {
    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn create_lock(&self) -> Result<File, StoreError> {
        let lock_path = self.lock_path();
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::File {
                path: lock_path.display().to_string(),
                source,
            })
    }

    fn existing_lock(&self) -> Result<Option<File>, StoreError> {
        let lock_path = self.lock_path();
        match File::open(&lock_path) {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::File {
                path: lock_path.display().to_string(),
                source,
            }),
        }
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::File {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Reads never create the lock file; without one no writer has run yet.
    fn read_shared(&self) -> Result<NullifierSet, StoreError> {
        let Some(lock) = self.existing_lock()? else {
            return self.read_document();
        };
        lock.lock_shared().map_err(|e| self.io_err(e))?;
        let result = self.read_document();
        let _ = lock.unlock();
        result
    }

    fn read_document(&self) -> Result<NullifierSet, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(NullifierSet::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(NullifierSet::new()),
            Err(err) => Err(self.io_err(err)),
        }
    }

    fn merge(
        &self,
        kind: GoalKind,
        goal_id: GoalId,
        incoming: BTreeSet<String>,
    ) -> Result<usize, StoreError> {
        let _guard = self.guard.lock().map_err(|_| StoreError::Poisoned)?;
        ensure_parent_dir(&self.path)?;
        let lock = self.create_lock()?;
        lock.lock_exclusive().map_err(|e| self.io_err(e))?;

        let result = self.read_document().and_then(|mut document| {
            let added = document.merge(kind, goal_id, incoming);
            if added > 0 {
                self.write_document(&document)?;
            }
            Ok(added)
        });

        let _ = lock.unlock();
        result
    }

    fn write_document(&self, document: &NullifierSet) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut tmp = File::create(&tmp_path).map_err(|e| self.io_err(e))?;
        tmp.write_all(&bytes).map_err(|e| self.io_err(e))?;
        tmp.sync_all().map_err(|e| self.io_err(e))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))
    }
}
