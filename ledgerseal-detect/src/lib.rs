// File: ledgerseal-detect/src/lib.rs
//! Tamper detection over an object store, anchored in an integrity ledger.
//!
//! Anchoring writes `identity -> digest hex` into the ledger. Detection
//! recomputes the digest from the store and compares it with the anchor:
//!
//! * file level: the object's metadata digest (or content digest),
//! * directory level: the Merkle root over the digests of every listed entry,
//!   which also changes when entries are added or removed.
//!
//! Directory detection is shallow: only the direct entries of a directory
//! become leaves. A subdirectory entry is digested by its own metadata, even
//! under [`DigestSource::Content`], so a change deep inside it shows up only
//! as far as it alters that metadata. Anchor nested directories separately to
//! cover them.
//!
//! An anchored directory whose entries are all gone reports `Tampered` with no
//! current digest, rather than an empty-tree error.
//!
//! Detection never writes to either collaborator.
use ledgerseal_hash::DigestError;
use ledgerseal_ledger::LedgerError;
use ledgerseal_merkle::MerkleError;
use ledgerseal_meta::MetadataError;
use ledgerseal_store::{name_of, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

mod detector;
mod report;

pub use detector::Detector;
pub use report::{ObjectProof, Scope, Status, TamperReport};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("ledger value for `{key}` is not a digest: {source}")]
    InvalidAnchor {
        key: String,
        #[source]
        source: DigestError,
    },
    #[error("`{identity}` is not listed under `{directory}`")]
    NotInDirectory { identity: String, directory: String },
}

/// Order in which a directory's entries become Merkle leaves. Must be the
/// same at anchoring and at verification time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafOrder {
    /// Whatever order the store lists entries in.
    Listing,
    /// Sorted by identity, byte-wise.
    #[default]
    Lexicographic,
    /// Listing order, stably sorted by an agreed rank. A rank is looked up by
    /// full identity first, then by entry name; unranked entries rank 0.
    Ranked(BTreeMap<String, usize>),
}

impl LeafOrder {
    /// Puts listed identities into leaf order.
    pub fn arrange(&self, ids: &mut [String]) {
        match self {
            Self::Listing => {}
            Self::Lexicographic => ids.sort(),
            Self::Ranked(ranks) => ids.sort_by_key(|id| rank_of(ranks, id)),
        }
    }
}

fn rank_of(ranks: &BTreeMap<String, usize>, identity: &str) -> usize {
    ranks.get(identity).or_else(|| ranks.get(name_of(identity))).copied().unwrap_or(0)
}

/// What a per-object digest covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestSource {
    #[default]
    Metadata,
    Content,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectorOptions {
    pub leaf_order: LeafOrder,
    pub digest_source: DigestSource,
}

impl FromStr for LeafOrder {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listing" => Ok(Self::Listing),
            "lexicographic" => Ok(Self::Lexicographic),
            other => match other.strip_prefix("ranked:") {
                Some(list) => list
                    .split(',')
                    .filter(|pair| !pair.trim().is_empty())
                    .map(|pair| {
                        let (id, rank) =
                            pair.split_once('=').ok_or_else(|| format!("rank `{pair}` is not identity=rank"))?;
                        let rank = rank.trim().parse::<usize>().map_err(|e| format!("rank `{pair}`: {e}"))?;
                        Ok((id.trim().to_string(), rank))
                    })
                    .collect::<Result<BTreeMap<_, _>, String>>()
                    .map(Self::Ranked),
                None => Err(format!(
                    "unknown leaf order `{other}` (expected listing, lexicographic or ranked:id=rank,...)"
                )),
            },
        }
    }
}

impl fmt::Display for LeafOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing => f.write_str("listing"),
            Self::Lexicographic => f.write_str("lexicographic"),
            Self::Ranked(ranks) => {
                f.write_str("ranked:")?;
                for (i, (id, rank)) in ranks.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{id}={rank}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for DigestSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata" => Ok(Self::Metadata),
            "content" => Ok(Self::Content),
            other => Err(format!("unknown digest source `{other}` (expected metadata or content)")),
        }
    }
}

impl fmt::Display for DigestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Metadata => "metadata", Self::Content => "content" })
    }
}
