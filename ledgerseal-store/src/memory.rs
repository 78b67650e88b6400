use crate::{join, name_of, normalize, parent_of, ObjectStore, StoreError, TYPE_DIRECTORY, TYPE_FILE};
use ledgerseal_meta::{Metadata, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
enum Kind {
    File(Vec<u8>),
    Directory,
}

#[derive(Clone, Debug)]
struct Entry {
    kind: Kind,
    created: u64,
    modified: u64,
    attributes: Metadata,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    // logical clock, bumped on every mutation
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn make_dirs(&mut self, directory: &str) -> Result<bool, StoreError> {
        if directory == "/" {
            return Ok(false);
        }
        match self.entries.get(directory).map(|e| &e.kind) {
            Some(Kind::Directory) => return Ok(false),
            Some(Kind::File(_)) => return Err(StoreError::NotADirectory(directory.to_string())),
            None => {}
        }
        if let Some(parent) = parent_of(directory) {
            self.make_dirs(parent)?;
        }
        let now = self.tick();
        self.entries.insert(
            directory.to_string(),
            Entry { kind: Kind::Directory, created: now, modified: now, attributes: Metadata::new() },
        );
        Ok(true)
    }
}

/// In-process object store. Listing order is creation order; every write
/// advances `modificationTime`, so rewriting identical bytes still changes metadata.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: RwLock<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self { Self::default() }

    /// Sets a custom metadata attribute without touching content or modification time.
    pub fn set_attribute(&self, identity: &str, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        let id = normalize(identity)?;
        let mut inner = self.inner.write();
        let entry = inner.entries.get_mut(&id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry.attributes.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn remove(&self, identity: &str) -> Result<(), StoreError> {
        let id = normalize(identity)?;
        let mut inner = self.inner.write();
        if inner.entries.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        let prefix = format!("{}/", id);
        inner.entries.retain(|k, _| !k.starts_with(&prefix));
        tracing::debug!(identity = %id, "removed object");
        Ok(())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn list(&self, directory: &str) -> Result<Vec<String>, StoreError> {
        let dir = normalize(directory)?;
        let inner = self.inner.read();
        if dir != "/" {
            match inner.entries.get(&dir).map(|e| &e.kind) {
                Some(Kind::Directory) => {}
                Some(Kind::File(_)) => return Err(StoreError::NotADirectory(dir)),
                None => return Err(StoreError::NotFound(dir)),
            }
        }
        let mut children: Vec<(&String, u64)> = inner
            .entries
            .iter()
            .filter(|(id, _)| parent_of(id) == Some(dir.as_str()))
            .map(|(id, e)| (id, e.created))
            .collect();
        children.sort_by_key(|(_, created)| *created);
        Ok(children.into_iter().map(|(id, _)| join(&dir, name_of(id))).collect())
    }

    fn stat(&self, identity: &str) -> Result<Metadata, StoreError> {
        let id = normalize(identity)?;
        let inner = self.inner.read();
        let entry = inner.entries.get(&id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut meta = entry.attributes.clone();
        let (length, kind) = match &entry.kind {
            Kind::File(bytes) => (bytes.len() as u64, TYPE_FILE),
            Kind::Directory => (0, TYPE_DIRECTORY),
        };
        meta.insert("length".into(), Value::UInt(length));
        meta.insert("modificationTime".into(), Value::UInt(entry.modified));
        meta.insert("pathSuffix".into(), Value::from(name_of(&id)));
        meta.insert("type".into(), Value::from(kind));
        Ok(meta)
    }

    fn read(&self, identity: &str) -> Result<Vec<u8>, StoreError> {
        let id = normalize(identity)?;
        let inner = self.inner.read();
        match inner.entries.get(&id).map(|e| &e.kind) {
            Some(Kind::File(bytes)) => Ok(bytes.clone()),
            Some(Kind::Directory) => Err(StoreError::IsADirectory(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn write(&self, identity: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let id = normalize(identity)?;
        let parent = parent_of(&id).ok_or_else(|| StoreError::IsADirectory(id.clone()))?;
        let mut inner = self.inner.write();
        inner.make_dirs(parent)?;
        let now = inner.tick();
        match inner.entries.get_mut(&id) {
            Some(Entry { kind: Kind::Directory, .. }) => return Err(StoreError::IsADirectory(id)),
            Some(entry) => {
                entry.kind = Kind::File(bytes.to_vec());
                entry.modified = now;
            }
            None => {
                inner.entries.insert(
                    id.clone(),
                    Entry { kind: Kind::File(bytes.to_vec()), created: now, modified: now, attributes: Metadata::new() },
                );
            }
        }
        tracing::debug!(identity = %id, len = bytes.len(), "wrote object");
        Ok(())
    }

    fn ensure_directory(&self, directory: &str) -> Result<bool, StoreError> {
        let dir = normalize(directory)?;
        self.inner.write().make_dirs(&dir)
    }
}
