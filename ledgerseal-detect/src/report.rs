use ledgerseal_hash::Digest;
use ledgerseal_merkle::{verify_proof, Proof};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    File,
    Directory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// No anchor exists for the identity.
    Untracked,
    Matched,
    Tampered,
}

/// Outcome of comparing a recomputed digest with its anchor. A tampered
/// outcome is a normal result, not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperReport {
    pub scope: Scope,
    pub identity: String,
    pub status: Status,
    /// `None` only for an anchored directory that no longer has any entries.
    pub current_digest: Option<Digest>,
    pub anchored_digest: Option<Digest>,
}

impl TamperReport {
    pub(crate) fn classify(scope: Scope, identity: String, current: Option<Digest>, anchored: Option<Digest>) -> Self {
        let status = match anchored {
            None => Status::Untracked,
            Some(a) if current == Some(a) => Status::Matched,
            Some(_) => Status::Tampered,
        };
        Self { scope, identity, status, current_digest: current, anchored_digest: anchored }
    }

    pub fn is_tampered(&self) -> bool { self.status == Status::Tampered }
    pub fn is_matched(&self) -> bool { self.status == Status::Matched }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Scope::File => "file", Scope::Directory => "directory" })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Untracked => "untracked",
            Status::Matched => "matched",
            Status::Tampered => "tampered",
        })
    }
}

impl fmt::Display for TamperReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.status, self.scope, self.identity)?;
        match &self.current_digest {
            Some(c) => write!(f, " current={c}")?,
            None => f.write_str(" current=-")?,
        }
        match &self.anchored_digest {
            Some(a) => write!(f, " anchored={a}"),
            None => f.write_str(" anchored=-"),
        }
    }
}

/// Membership claim for one object of a directory, checkable without the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectProof {
    pub directory: String,
    pub identity: String,
    pub index: usize,
    pub leaf_count: usize,
    pub leaf: Digest,
    pub root: Digest,
    pub proof: Proof,
}

impl ObjectProof {
    /// Checks the path against the root recorded at proving time.
    pub fn verify(&self) -> bool { verify_proof(&self.leaf, &self.proof, &self.root) }

    pub fn verify_against(&self, root: &Digest) -> bool { verify_proof(&self.leaf, &self.proof, root) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerseal_hash::sha256;

    #[test]
    fn classification() {
        let cur = sha256(b"now");
        let r = TamperReport::classify(Scope::File, "/a".into(), Some(cur), None);
        assert_eq!(r.status, Status::Untracked);
        assert_eq!(r.to_string(), format!("untracked file /a current={cur} anchored=-"));
        assert!(TamperReport::classify(Scope::File, "/a".into(), Some(cur), Some(cur)).is_matched());
        let t = TamperReport::classify(Scope::Directory, "/d".into(), Some(cur), Some(sha256(b"then")));
        assert!(t.is_tampered());
        assert!(t.to_string().starts_with("tampered directory /d"));
    }

    #[test]
    fn missing_current_digest_never_matches() {
        let then = sha256(b"then");
        assert!(TamperReport::classify(Scope::Directory, "/d".into(), None, Some(then)).is_tampered());
        assert_eq!(TamperReport::classify(Scope::Directory, "/d".into(), None, None).status, Status::Untracked);
    }
}
