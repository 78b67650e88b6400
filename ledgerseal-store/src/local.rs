use crate::{join, name_of, normalize, ObjectStore, StoreError, TYPE_DIRECTORY, TYPE_FILE};
use ledgerseal_meta::{Metadata, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Object store over a local directory tree. Identity `/a/b` maps to `<root>/a/b`.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

fn io_error(identity: &str, source: io::Error) -> StoreError {
    if source.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(identity.to_string())
    } else {
        StoreError::Io { identity: identity.to_string(), source }
    }
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }
    pub fn root(&self) -> &Path { &self.root }

    fn resolve(&self, identity: &str) -> Result<(String, PathBuf), StoreError> {
        let id = normalize(identity)?;
        let path = id.split('/').filter(|s| !s.is_empty()).fold(self.root.clone(), |p, seg| p.join(seg));
        Ok((id, path))
    }
}

impl ObjectStore for FsObjectStore {
    /// Entries sorted by name, matching a namenode listing.
    fn list(&self, directory: &str) -> Result<Vec<String>, StoreError> {
        let (dir, path) = self.resolve(directory)?;
        let meta = fs::metadata(&path).map_err(|e| io_error(&dir, e))?;
        if !meta.is_dir() {
            return Err(StoreError::NotADirectory(dir));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| io_error(&dir, e))? {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let name = entry
                .file_name()
                .into_string()
                .map_err(|raw| StoreError::InvalidIdentity(join(&dir, &raw.to_string_lossy())))?;
            names.push(name);
        }
        names.sort();
        Ok(names.iter().map(|n| join(&dir, n)).collect())
    }

    fn stat(&self, identity: &str) -> Result<Metadata, StoreError> {
        let (id, path) = self.resolve(identity)?;
        let meta = fs::metadata(&path).map_err(|e| io_error(&id, e))?;
        let modified = meta
            .modified()
            .map_err(|e| io_error(&id, e))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut out = Metadata::new();
        out.insert("length".into(), Value::UInt(if meta.is_dir() { 0 } else { meta.len() }));
        out.insert("modificationTime".into(), Value::UInt(modified));
        out.insert("pathSuffix".into(), Value::from(name_of(&id)));
        out.insert("type".into(), Value::from(if meta.is_dir() { TYPE_DIRECTORY } else { TYPE_FILE }));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            out.insert("permission".into(), Value::Text(format!("{:o}", meta.permissions().mode() & 0o777)));
        }
        Ok(out)
    }

    fn read(&self, identity: &str) -> Result<Vec<u8>, StoreError> {
        let (id, path) = self.resolve(identity)?;
        if path.is_dir() {
            return Err(StoreError::IsADirectory(id));
        }
        fs::read(&path).map_err(|e| io_error(&id, e))
    }

    fn write(&self, identity: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let (id, path) = self.resolve(identity)?;
        if path.is_dir() {
            return Err(StoreError::IsADirectory(id));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(&id, e))?;
        }
        fs::write(&path, bytes).map_err(|e| io_error(&id, e))?;
        tracing::debug!(identity = %id, len = bytes.len(), "wrote object");
        Ok(())
    }

    fn ensure_directory(&self, directory: &str) -> Result<bool, StoreError> {
        let (dir, path) = self.resolve(directory)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(false),
            Ok(_) => Err(StoreError::NotADirectory(dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&path).map_err(|e| io_error(&dir, e))?;
                tracing::info!(directory = %dir, "created directory");
                Ok(true)
            }
            Err(e) => Err(io_error(&dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerseal_hash::sha256;

    #[test]
    fn write_list_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());
        store.write("/data/project3/test.csv", b"x,y\n").unwrap();
        store.write("/data/project3/a.txt", b"aaa").unwrap();
        assert!(tmp.path().join("data/project3/test.csv").is_file());
        assert_eq!(
            store.list("/data/project3").unwrap(),
            vec!["/data/project3/a.txt", "/data/project3/test.csv"]
        );
        assert_eq!(sha256(&store.read("/data/project3/a.txt").unwrap()), sha256(b"aaa"));
    }

    #[test]
    fn stat_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());
        store.write("/d/f.bin", &[0u8; 17]).unwrap();
        let meta = store.stat("/d/f.bin").unwrap();
        assert_eq!(meta["length"], Value::UInt(17));
        assert_eq!(meta["pathSuffix"], Value::from("f.bin"));
        assert_eq!(meta["type"], Value::from(TYPE_FILE));
        assert!(meta.contains_key("modificationTime"));
        assert_eq!(store.stat("/d").unwrap()["type"], Value::from(TYPE_DIRECTORY));
    }

    #[test]
    fn errors_map_to_store_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());
        assert!(matches!(store.stat("/missing"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.list("/missing"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.read("/../etc/passwd"), Err(StoreError::InvalidIdentity(_))));
        store.write("/f", b"1").unwrap();
        assert!(matches!(store.list("/f"), Err(StoreError::NotADirectory(_))));
        assert!(matches!(store.ensure_directory("/f"), Err(StoreError::NotADirectory(_))));
    }

    #[test]
    fn ensure_directory_creates_once() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());
        assert!(store.ensure_directory("/data/project3").unwrap());
        assert!(!store.ensure_directory("/data/project3").unwrap());
        assert!(store.list("/data/project3").unwrap().is_empty());
        assert!(matches!(store.read("/data"), Err(StoreError::IsADirectory(_))));
    }
}
