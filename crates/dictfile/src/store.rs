//! File-backed dictionary store
//!
//! [`DictFile`] keeps a key/value mapping in memory, bound to exactly one
//! backing file. Persistence is explicit: nothing touches disk until
//! [`save`](DictFile::save) or [`load`](DictFile::load) is called, and a
//! `synced` flag records whether memory and disk are known to agree.
//! Overwrites keep the displaced value in a single-level revert journal.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, OpenOptions};
use std::hash::Hash;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::codec;
use crate::error::{Error, Result};
use crate::path::{TEMP_EXTENSION, create_anonymous};

/// Whether the backing file outlives the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// The backing file is left in place when the store is dropped.
    Persistent,
    /// The backing file is deleted when the store is dropped.
    Ephemeral,
}

/// A key/value mapping bound to a backing file.
///
/// Keys and values are any serde-serializable types; each is stored as a
/// length-prefixed UTF-8 JSON document behind a little-endian pair count.
/// All mutation goes through [`set`](Self::set)
/// and [`remove`](Self::remove) so the sync flag and revert journal stay
/// consistent.
///
/// Save and load are synchronous and blocking, and the store assumes
/// exclusive ownership of its backing file while they run. Save rewrites
/// the file in place, so an interrupted save leaves a truncated file;
/// callers needing crash-atomicity must write to a fresh path and rename.
#[derive(Debug)]
pub struct DictFile<K, V> {
    memory: HashMap<K, V>,
    revert: HashMap<K, V>,
    synced: bool,
    target: PathBuf,
    retention: Retention,
    bytes_read: u64,
    bytes_written: u64,
}

impl<K, V> DictFile<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Bind a store to an explicit path. No I/O happens here; call
    /// [`load`](Self::load) to read existing contents.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let target = path.into();
        trace!("Binding store to {:?} (exists: {})", target, target.exists());
        Self::bound(target, Retention::Persistent)
    }

    /// Bind a store to a freshly reserved anonymous file in the system
    /// temp directory. The file is deleted when the store is dropped.
    pub fn temporary() -> Result<Self> {
        Self::temporary_in(std::env::temp_dir())
    }

    /// Like [`temporary`](Self::temporary), with an explicit directory.
    pub fn temporary_in(dir: impl AsRef<Path>) -> Result<Self> {
        let target = create_anonymous(dir.as_ref(), TEMP_EXTENSION)?;
        debug!("Created temporary store at {:?}", target);
        Ok(Self::bound(target, Retention::Ephemeral))
    }

    /// Build a temp-backed store seeded with a fresh copy of `map`.
    ///
    /// The store starts out of sync; nothing is written until
    /// [`save`](Self::save).
    pub fn from_map(map: HashMap<K, V>) -> Result<Self> {
        let mut store = Self::temporary()?;
        store.memory = map;
        Ok(store)
    }

    fn bound(target: PathBuf, retention: Retention) -> Self {
        Self {
            memory: HashMap::new(),
            revert: HashMap::new(),
            synced: false,
            target,
            retention,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Look up the current value for `key`.
    pub fn get(&self, key: &K) -> Result<&V> {
        self.memory
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(describe_key(key)))
    }

    /// Insert or overwrite a pair. On overwrite the displaced value goes
    /// into the revert journal. Memory and disk are out of sync afterwards.
    pub fn set(&mut self, key: K, value: V) {
        match self.memory.entry(key) {
            Entry::Occupied(mut slot) => {
                let journal_key = slot.key().clone();
                let previous = slot.insert(value);
                self.revert.insert(journal_key, previous);
            }
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
        self.synced = false;
        trace!("Set pair, {} now in memory", self.memory.len());
    }

    /// Remove a pair. Returns whether anything was removed; the store only
    /// goes out of sync when it was.
    pub fn remove(&mut self, key: &K) -> bool {
        let removed = self.memory.remove(key).is_some();
        if removed {
            self.synced = false;
            trace!("Removed pair, {} remain in memory", self.memory.len());
        }
        removed
    }

    /// Whether `key` currently has a value. Pure query.
    pub fn contains_key(&self, key: &K) -> bool {
        self.memory.contains_key(key)
    }

    /// Whether any key currently maps to `value`.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.memory.values().any(|v| v == value)
    }

    /// The journalled previous value of `key`, if it was ever overwritten.
    pub fn previous(&self, key: &K) -> Option<&V> {
        self.revert.get(key)
    }

    /// Restore the journalled previous value of `key`. The value displaced
    /// by the revert becomes the new journal entry, so reverting twice
    /// toggles between the two most recent values.
    pub fn revert(&mut self, key: &K) -> bool {
        match self.revert.remove(key) {
            Some(previous) => {
                self.set(key.clone(), previous);
                true
            }
            None => false,
        }
    }

    /// Merge entries into the store through the normal [`set`](Self::set)
    /// path, journalling any overwrites.
    pub fn merge<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Remove every listed key, returning how many were present.
    pub fn remove_all<'a, I>(&mut self, keys: I) -> usize
    where
        K: 'a,
        I: IntoIterator<Item = &'a K>,
    {
        keys.into_iter().filter(|key| self.remove(key)).count()
    }

    /// Drop every pair from memory. The backing file is untouched.
    pub fn clear(&mut self) {
        if !self.memory.is_empty() {
            self.synced = false;
        }
        self.memory.clear();
    }

    /// Number of pairs in memory.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether memory holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Iterate over the in-memory pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.memory.iter()
    }

    /// A fresh, independent copy of the in-memory mapping.
    pub fn to_map(&self) -> HashMap<K, V>
    where
        V: Clone,
    {
        self.memory.clone()
    }

    /// Whether memory and disk are known to agree.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Whether the backing file is deleted when the store is dropped.
    pub fn is_temporary(&self) -> bool {
        self.retention == Retention::Ephemeral
    }

    /// The backing file's retention policy.
    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.target
    }

    /// Bytes read from the backing file so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes written to the backing file so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Total I/O volume, both directions.
    pub fn bytes_total(&self) -> u64 {
        self.bytes_read + self.bytes_written
    }

    /// Write the mapping to the backing file, truncating whatever was
    /// there. Skipped entirely while memory and disk already agree.
    pub fn save(&mut self) -> Result<()> {
        if self.synced {
            trace!("Save skipped, memory and disk already agree");
            return Ok(());
        }
        let buf = codec::encode_pairs(&self.memory)?;
        fs::write(&self.target, &buf)?;
        self.bytes_written += buf.len() as u64;
        self.synced = true;
        debug!(
            "Wrote {} pairs ({} bytes) to {:?}",
            self.memory.len(),
            buf.len(),
            self.target
        );
        Ok(())
    }

    /// Read the backing file (creating it empty if absent) and merge every
    /// stored pair into memory through the [`set`](Self::set) path.
    ///
    /// The store is marked synced only when the in-memory pair count ends
    /// up equal to the file's declared count. Any undecodable count,
    /// length, or payload aborts with [`Error::Corrupt`], leaving memory
    /// partially merged.
    pub fn load(&mut self) -> Result<()> {
        let data = self.read_target()?;
        if data.is_empty() {
            self.synced = self.memory.is_empty();
            debug!("Backing file {:?} is empty (synced: {})", self.target, self.synced);
            return Ok(());
        }
        self.bytes_read += data.len() as u64;

        let mut cursor = Cursor::new(data.as_slice());
        let declared = codec::decode_count(&mut cursor)?;
        for index in 0..declared {
            let (key, value) = codec::decode_pair(&mut cursor, index)?;
            self.set(key, value);
        }
        self.synced = self.memory.len() == declared;
        debug!(
            "Read {declared} pairs from {:?} (synced: {})",
            self.target, self.synced
        );
        Ok(())
    }

    /// Check the backing file's declared pair count against memory without
    /// decoding pairs or touching the sync flag.
    ///
    /// An empty file passes only for an empty memory; an unreadable count
    /// is reported as a mismatch, not an error.
    pub fn validate(&self) -> Result<bool> {
        let data = self.read_target()?;
        if data.is_empty() {
            return Ok(self.memory.is_empty());
        }
        let mut cursor = Cursor::new(data.as_slice());
        match codec::decode_count(&mut cursor) {
            Ok(declared) => Ok(declared == self.memory.len()),
            Err(Error::Corrupt(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Swap the backing file reference.
    ///
    /// If the new path does not exist yet, an implicit [`load`](Self::load)
    /// runs so the sync flag reflects the new target. An ephemeral old
    /// backing file is deleted on the way out and the store becomes
    /// persistent, since the caller now owns the named path.
    pub fn rebind(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let new_target = path.into();
        if self.retention == Retention::Ephemeral {
            remove_if_exists(&self.target)?;
            self.retention = Retention::Persistent;
        }
        debug!("Rebinding store from {:?} to {:?}", self.target, new_target);
        self.target = new_target;
        if !self.target.exists() {
            self.load()?;
        }
        Ok(())
    }

    /// Clear memory and delete the backing file, regardless of retention.
    pub fn destroy(&mut self) -> Result<()> {
        debug!("Destroying store at {:?}", self.target);
        self.memory.clear();
        self.revert.clear();
        self.synced = false;
        remove_if_exists(&self.target)?;
        Ok(())
    }

    /// Open the backing file (creating it empty if absent) and slurp its
    /// contents, so decoding can bounds-check against the full length.
    fn read_target(&self) -> Result<Vec<u8>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.target)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl DictFile<String, String> {
    /// Build a temp-backed store from a flat alternating key/value list.
    pub fn from_interleaved<I>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let items: Vec<String> = items.into_iter().collect();
        if items.len() % 2 != 0 {
            return Err(Error::InvalidArgument(format!(
                "interleaved pair list has odd length {}",
                items.len()
            )));
        }
        let mut store = Self::temporary()?;
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            store.set(key, value);
        }
        Ok(store)
    }
}

impl<K, V> Drop for DictFile<K, V> {
    fn drop(&mut self) {
        if self.retention == Retention::Ephemeral {
            match remove_if_exists(&self.target) {
                Ok(()) => trace!("Removed ephemeral backing file {:?}", self.target),
                Err(e) => trace!(
                    "Could not remove ephemeral backing file {:?}: {e}",
                    self.target
                ),
            }
        }
    }
}

fn describe_key<K: Serialize>(key: &K) -> String {
    serde_json::to_string(key).unwrap_or_else(|_| "<unencodable key>".to_string())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
