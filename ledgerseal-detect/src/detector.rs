use crate::{DetectError, DetectorOptions, DigestSource, ObjectProof, Scope, TamperReport};
use ledgerseal_hash::{sha256, Digest};
use ledgerseal_ledger::Ledger;
use ledgerseal_merkle::MerkleTree;
use ledgerseal_meta::metadata_digest;
use ledgerseal_store::{normalize, ObjectStore, StoreError};

/// Stateless over its collaborators: every call re-reads the store and the
/// ledger, so concurrent runs share nothing but the collaborators themselves.
pub struct Detector<S, L> {
    store: S,
    ledger: L,
    options: DetectorOptions,
}

impl<S: ObjectStore, L: Ledger> Detector<S, L> {
    pub fn new(store: S, ledger: L) -> Self { Self::with_options(store, ledger, DetectorOptions::default()) }

    pub fn with_options(store: S, ledger: L, options: DetectorOptions) -> Self { Self { store, ledger, options } }

    pub fn options(&self) -> &DetectorOptions { &self.options }
    pub fn store(&self) -> &S { &self.store }
    pub fn ledger(&self) -> &L { &self.ledger }

    /// Under [`DigestSource::Content`] a directory has no bytes to hash and is
    /// digested by its metadata instead.
    pub fn file_digest(&self, identity: &str) -> Result<Digest, DetectError> {
        if self.options.digest_source == DigestSource::Content {
            match self.store.read(identity) {
                Ok(bytes) => return Ok(sha256(&bytes)),
                Err(StoreError::IsADirectory(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(metadata_digest(&self.store.stat(identity)?)?)
    }

    /// `(identity, digest)` for every entry of `directory`, in leaf order.
    pub fn directory_leaves(&self, directory: &str) -> Result<Vec<(String, Digest)>, DetectError> {
        let mut ids = self.store.list(directory)?;
        self.options.leaf_order.arrange(&mut ids);
        ids.into_iter()
            .map(|id| {
                let digest = self.file_digest(&id)?;
                tracing::debug!(identity = %id, %digest, "leaf");
                Ok((id, digest))
            })
            .collect()
    }

    /// Fails with `MerkleError::EmptyTree` for an empty directory.
    pub fn directory_tree(&self, directory: &str) -> Result<MerkleTree, DetectError> {
        Ok(MerkleTree::from_named_leaves(self.directory_leaves(directory)?)?)
    }

    pub fn directory_root(&self, directory: &str) -> Result<Digest, DetectError> {
        Ok(self.directory_tree(directory)?.root())
    }

    /// An empty stored value counts as absent.
    pub fn anchored_digest(&self, key: &str) -> Result<Option<Digest>, DetectError> {
        match self.ledger.get(key)? {
            Some(value) if !value.trim().is_empty() => Digest::from_hex(&value)
                .map(Some)
                .map_err(|source| DetectError::InvalidAnchor { key: key.to_string(), source }),
            _ => Ok(None),
        }
    }

    pub fn detect_file_tampering(&self, identity: &str) -> Result<TamperReport, DetectError> {
        let id = normalize(identity)?;
        let current = self.file_digest(&id)?;
        let anchored = self.anchored_digest(&id)?;
        Ok(log_report(TamperReport::classify(Scope::File, id, Some(current), anchored)))
    }

    /// An anchored directory with no entries left is `Tampered` with no current
    /// digest. An empty directory that was never anchored is `EmptyTree`.
    pub fn detect_directory_tampering(&self, directory: &str) -> Result<TamperReport, DetectError> {
        let dir = normalize(directory)?;
        let leaves = self.directory_leaves(&dir)?;
        let anchored = self.anchored_digest(&dir)?;
        let current = if leaves.is_empty() && anchored.is_some() {
            None
        } else {
            Some(MerkleTree::from_named_leaves(leaves)?.root())
        };
        Ok(log_report(TamperReport::classify(Scope::Directory, dir, current, anchored)))
    }

    /// File-level check of every entry of `directory`, in leaf order.
    pub fn scan_directory_files(&self, directory: &str) -> Result<Vec<TamperReport>, DetectError> {
        let dir = normalize(directory)?;
        self.directory_leaves(&dir)?
            .into_iter()
            .map(|(id, current)| {
                let anchored = self.anchored_digest(&id)?;
                Ok(log_report(TamperReport::classify(Scope::File, id, Some(current), anchored)))
            })
            .collect()
    }

    pub fn anchor_file(&self, identity: &str) -> Result<Digest, DetectError> {
        let id = normalize(identity)?;
        let digest = self.file_digest(&id)?;
        self.ledger.put(&id, &digest.to_hex())?;
        tracing::info!(identity = %id, %digest, "anchored file");
        Ok(digest)
    }

    pub fn anchor_directory(&self, directory: &str) -> Result<Digest, DetectError> {
        let dir = normalize(directory)?;
        let tree = self.directory_tree(&dir)?;
        let root = tree.root();
        self.ledger.put(&dir, &root.to_hex())?;
        tracing::info!(directory = %dir, %root, leaves = tree.leaf_count(), "anchored directory");
        Ok(root)
    }

    /// Anchors every entry of `directory` individually.
    pub fn anchor_directory_files(&self, directory: &str) -> Result<Vec<(String, Digest)>, DetectError> {
        let dir = normalize(directory)?;
        let leaves = self.directory_leaves(&dir)?;
        for (id, digest) in &leaves {
            self.ledger.put(id, &digest.to_hex())?;
            tracing::info!(identity = %id, %digest, "anchored file");
        }
        Ok(leaves)
    }

    /// Membership proof for `identity` within the current tree of `directory`.
    pub fn prove_object(&self, directory: &str, identity: &str) -> Result<ObjectProof, DetectError> {
        let dir = normalize(directory)?;
        let id = normalize(identity)?;
        let tree = self.directory_tree(&dir)?;
        let index = tree
            .index_of(&id)
            .ok_or_else(|| DetectError::NotInDirectory { identity: id.clone(), directory: dir.clone() })?;
        let proof = tree.prove(index)?;
        let leaf = tree.leaves()[index];
        Ok(ObjectProof { directory: dir, identity: id, index, leaf_count: tree.leaf_count(), leaf, root: tree.root(), proof })
    }

    /// Checks a proof against the directory's anchored root; `None` when the
    /// directory was never anchored.
    pub fn verify_anchored(&self, proof: &ObjectProof) -> Result<Option<bool>, DetectError> {
        Ok(self.anchored_digest(&proof.directory)?.map(|root| proof.verify_against(&root)))
    }
}

fn log_report(report: TamperReport) -> TamperReport {
    match report.status {
        crate::Status::Tampered => tracing::warn!(
            scope = %report.scope,
            identity = %report.identity,
            current = ?report.current_digest,
            "tampering detected"
        ),
        crate::Status::Untracked => tracing::warn!(scope = %report.scope, identity = %report.identity, "not tracked in ledger"),
        crate::Status::Matched => tracing::info!(scope = %report.scope, identity = %report.identity, "integrity verified"),
    }
    report
}
