// File: ledgerseal-store/src/lib.rs
//! Object store capability consumed by the detector, plus two backends:
//! an in-process map and a local directory tree.
//!
//! Identities are `/`-separated absolute paths such as `/data/project3/a.csv`.
use ledgerseal_meta::Metadata;
use std::sync::Arc;

pub mod local;
pub mod memory;

pub use local::FsObjectStore;
pub use memory::MemoryObjectStore;

pub const TYPE_FILE: &str = "FILE";
pub const TYPE_DIRECTORY: &str = "DIRECTORY";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("invalid object identity `{0}`")]
    InvalidIdentity(String),
    #[error("i/o error on {identity}: {source}")]
    Io {
        identity: String,
        #[source]
        source: std::io::Error,
    },
}

pub trait ObjectStore: Send + Sync {
    /// Identities of the entries directly under `directory`, in the store's natural order.
    fn list(&self, directory: &str) -> Result<Vec<String>, StoreError>;
    fn stat(&self, identity: &str) -> Result<Metadata, StoreError>;
    fn read(&self, identity: &str) -> Result<Vec<u8>, StoreError>;
    fn write(&self, identity: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// Creates `directory` and its ancestors when missing. Returns whether anything was created.
    fn ensure_directory(&self, directory: &str) -> Result<bool, StoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn list(&self, directory: &str) -> Result<Vec<String>, StoreError> { (**self).list(directory) }
    fn stat(&self, identity: &str) -> Result<Metadata, StoreError> { (**self).stat(identity) }
    fn read(&self, identity: &str) -> Result<Vec<u8>, StoreError> { (**self).read(identity) }
    fn write(&self, identity: &str, bytes: &[u8]) -> Result<(), StoreError> { (**self).write(identity, bytes) }
    fn ensure_directory(&self, directory: &str) -> Result<bool, StoreError> { (**self).ensure_directory(directory) }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn list(&self, directory: &str) -> Result<Vec<String>, StoreError> { (**self).list(directory) }
    fn stat(&self, identity: &str) -> Result<Metadata, StoreError> { (**self).stat(identity) }
    fn read(&self, identity: &str) -> Result<Vec<u8>, StoreError> { (**self).read(identity) }
    fn write(&self, identity: &str, bytes: &[u8]) -> Result<(), StoreError> { (**self).write(identity, bytes) }
    fn ensure_directory(&self, directory: &str) -> Result<bool, StoreError> { (**self).ensure_directory(directory) }
}

/// Canonical form of an identity: leading `/`, no empty, `.` or `..` segments.
pub fn normalize(identity: &str) -> Result<String, StoreError> {
    let mut out = String::with_capacity(identity.len() + 1);
    for seg in identity.trim().split('/').filter(|s| !s.is_empty()) {
        if seg == "." || seg == ".." {
            return Err(StoreError::InvalidIdentity(identity.to_string()));
        }
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// `directory` + `/` + `name`, for a normalized directory.
pub fn join(directory: &str, name: &str) -> String {
    format!("{}/{}", directory.trim_end_matches('/'), name)
}

/// Parent of a normalized identity; `None` for the root.
pub fn parent_of(identity: &str) -> Option<&str> {
    if identity == "/" {
        return None;
    }
    match identity.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&identity[..i]),
        None => None,
    }
}

/// Last segment of a normalized identity.
pub fn name_of(identity: &str) -> &str {
    identity.rsplit('/').next().unwrap_or(identity)
}
