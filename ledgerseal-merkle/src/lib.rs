// File: ledgerseal-merkle/src/lib.rs
use ledgerseal_hash::{digest_pair, sha256, Digest};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Levels at least this wide are combined on the rayon pool.
const PAR_MIN_LEVEL: usize = 1 << 12;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a Merkle tree over zero leaves")]
    EmptyTree,
    #[error("leaf index {index} out of range for a tree of {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("duplicate leaf identity `{0}`")]
    DuplicateIdentity(String),
}

/// One named unit of data contributing a leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub identity: String,
    pub payload: Vec<u8>,
}

impl LeafRecord {
    pub fn new(identity: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { identity: identity.into(), payload: payload.into() }
    }
    pub fn digest(&self) -> Digest { sha256(&self.payload) }
}

/// Side of the pair occupied by the sibling digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub position: Position,
}

/// Authentication path from a leaf up to the root, leaf side first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub steps: Vec<ProofStep>,
}

impl Proof {
    pub fn len(&self) -> usize { self.steps.len() }
    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    /// Root implied by combining `leaf` with every step in order.
    pub fn fold(&self, leaf: &Digest) -> Digest {
        self.steps.iter().fold(*leaf, |acc, step| match step.position {
            Position::Left => digest_pair(&step.sibling, &acc),
            Position::Right => digest_pair(&acc, &step.sibling),
        })
    }
}

/// Binary Merkle tree stored level by level; `levels[0]` holds the leaves and
/// the last level holds only the root. A trailing odd node is paired with itself.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
    // empty when built from bare digests
    identities: Vec<String>,
}

impl MerkleTree {
    pub fn build(leaves: &[Digest]) -> Result<Self, MerkleError> {
        Self::grow(leaves.to_vec(), Vec::new())
    }

    /// Leaves are `sha256(payload)` of each record, in record order.
    pub fn from_records(records: &[LeafRecord]) -> Result<Self, MerkleError> {
        let identities = unique_identities(records.iter().map(|r| r.identity.as_str()))?;
        let leaves: Vec<Digest> = records.par_iter().map(LeafRecord::digest).collect();
        Self::grow(leaves, identities)
    }

    /// Leaves given as precomputed digests, each tagged with its identity.
    pub fn from_named_leaves(named: Vec<(String, Digest)>) -> Result<Self, MerkleError> {
        unique_identities(named.iter().map(|(id, _)| id.as_str()))?;
        let (identities, leaves) = named.into_iter().unzip();
        Self::grow(leaves, identities)
    }

    fn grow(leaves: Vec<Digest>, identities: Vec<String>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        let mut levels = Vec::with_capacity(usize::BITS as usize);
        let mut current = leaves;
        while current.len() > 1 {
            let next = next_level(&current);
            levels.push(current);
            current = next;
        }
        levels.push(current);
        Ok(Self { levels, identities })
    }

    pub fn root(&self) -> Digest { self.levels[self.levels.len() - 1][0] }
    pub fn height(&self) -> usize { self.levels.len() - 1 }
    pub fn leaf_count(&self) -> usize { self.levels[0].len() }
    pub fn leaves(&self) -> &[Digest] { &self.levels[0] }
    pub fn leaf(&self, index: usize) -> Option<&Digest> { self.levels[0].get(index) }
    pub fn levels(&self) -> &[Vec<Digest>] { &self.levels }

    pub fn identity(&self, index: usize) -> Option<&str> {
        self.identities.get(index).map(String::as_str)
    }
    pub fn index_of(&self, identity: &str) -> Option<usize> {
        self.identities.iter().position(|id| id == identity)
    }

    pub fn prove(&self, index: usize) -> Result<Proof, MerkleError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(MerkleError::IndexOutOfRange { index, len });
        }
        let mut idx = index;
        let mut steps = Vec::with_capacity(self.height());
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if idx % 2 == 0 {
                // trailing odd node pairs with itself
                let sibling = *level.get(idx + 1).unwrap_or(&level[idx]);
                ProofStep { sibling, position: Position::Right }
            } else {
                ProofStep { sibling: level[idx - 1], position: Position::Left }
            };
            steps.push(step);
            idx /= 2;
        }
        Ok(Proof { steps })
    }

    /// Proof for the first leaf equal to `leaf`, with its index.
    pub fn prove_leaf(&self, leaf: &Digest) -> Option<(usize, Proof)> {
        let index = self.leaves().iter().position(|l| l == leaf)?;
        self.prove(index).ok().map(|proof| (index, proof))
    }

    pub fn verify(leaf: &Digest, proof: &Proof, root: &Digest) -> bool {
        proof.fold(leaf) == *root
    }
}

/// Stateless membership check; needs no tree.
pub fn verify_proof(leaf: &Digest, proof: &Proof, claimed_root: &Digest) -> bool {
    MerkleTree::verify(leaf, proof, claimed_root)
}

/// Root over `leaves` without keeping the tree; `None` for no leaves.
pub fn merkle_root(leaves: &[Digest]) -> Option<Digest> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    Some(level[0])
}

fn combine(pair: &[Digest]) -> Digest {
    let left = &pair[0];
    let right = pair.get(1).unwrap_or(left);
    digest_pair(left, right)
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    if level.len() >= PAR_MIN_LEVEL {
        level.par_chunks(2).map(combine).collect()
    } else {
        level.chunks(2).map(combine).collect()
    }
}

fn unique_identities<'a>(ids: impl Iterator<Item = &'a str>) -> Result<Vec<String>, MerkleError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(MerkleError::DuplicateIdentity(id.to_string()));
        }
        out.push(id.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(i: u8) -> Digest { sha256(&[i]) }

    fn flip(d: &Digest) -> Digest {
        let mut b = *d.as_bytes();
        b[0] ^= 1;
        Digest::from_bytes(b)
    }

    // Straight recursive fold, kept independent of the level-array builder.
    fn reference_root(hashes: &[Digest]) -> Digest {
        if hashes.len() == 1 {
            return hashes[0];
        }
        let next: Vec<Digest> = (0..hashes.len())
            .step_by(2)
            .map(|i| {
                let right = if i + 1 < hashes.len() { hashes[i + 1] } else { hashes[i] };
                digest_pair(&hashes[i], &right)
            })
            .collect();
        reference_root(&next)
    }

    fn kv_records(values: &[(&str, &str)]) -> Vec<LeafRecord> {
        values.iter().map(|(k, v)| LeafRecord::new(*k, v.as_bytes())).collect()
    }

    #[test]
    fn single_leaf_root_is_its_digest() {
        let mt = MerkleTree::from_records(&[LeafRecord::new("x", "payload")]).unwrap();
        assert_eq!(mt.root(), sha256(b"payload"));
        assert_eq!(mt.height(), 0);
        let proof = mt.prove(0).unwrap();
        assert!(proof.is_empty());
        assert!(verify_proof(&sha256(b"payload"), &proof, &mt.root()));
    }

    #[test]
    fn three_leaves_duplicate_trailing_node() {
        let recs = kv_records(&[("a", "a"), ("b", "b"), ("c", "c")]);
        let mt = MerkleTree::from_records(&recs).unwrap();
        let (a, b, c) = (sha256(b"a"), sha256(b"b"), sha256(b"c"));
        let expected = digest_pair(&digest_pair(&a, &b), &digest_pair(&c, &c));
        assert_eq!(mt.root(), expected);
        assert_eq!(mt.height(), 2);

        let proof = mt.prove(2).unwrap();
        assert_eq!(proof.steps[0], ProofStep { sibling: c, position: Position::Right });
        assert_eq!(proof.steps[1], ProofStep { sibling: digest_pair(&a, &b), position: Position::Left });
    }

    #[test]
    fn order_matters() {
        let ab = MerkleTree::build(&[leaf(1), leaf(2)]).unwrap();
        let ba = MerkleTree::build(&[leaf(2), leaf(1)]).unwrap();
        assert_ne!(ab.root(), ba.root());
    }

    #[test]
    fn height_is_ceil_log2() {
        let expected = [0, 1, 2, 2, 3, 3, 3, 3, 4, 4];
        for (i, h) in expected.iter().enumerate() {
            let leaves: Vec<Digest> = (0..=i as u8).map(leaf).collect();
            let mt = MerkleTree::build(&leaves).unwrap();
            assert_eq!(mt.height(), *h, "n = {}", i + 1);
            assert_eq!(mt.leaf_count(), i + 1);
            assert_eq!(mt.levels().last().map(Vec::len), Some(1));
        }
    }

    #[test]
    fn empty_input_rejected() {
        assert_eq!(MerkleTree::build(&[]).unwrap_err(), MerkleError::EmptyTree);
        assert_eq!(MerkleTree::from_records(&[]).unwrap_err(), MerkleError::EmptyTree);
        assert_eq!(merkle_root(&[]), None);
    }

    #[test]
    fn out_of_range_and_duplicates() {
        let mt = MerkleTree::build(&[leaf(1), leaf(2), leaf(3)]).unwrap();
        assert_eq!(mt.prove(3).unwrap_err(), MerkleError::IndexOutOfRange { index: 3, len: 3 });
        let dup = kv_records(&[("a", "1"), ("a", "2")]);
        assert_eq!(MerkleTree::from_records(&dup).unwrap_err(), MerkleError::DuplicateIdentity("a".into()));
    }

    #[test]
    fn key_value_store_scenario() {
        let clean = kv_records(&[("A", "10"), ("B", "20"), ("C", "30"), ("D", "40")]);
        let mt = MerkleTree::from_records(&clean).unwrap();
        let anchored = mt.root();
        assert_eq!(mt.index_of("B"), Some(1));
        assert_eq!(mt.identity(3), Some("D"));

        let proof = mt.prove(1).unwrap();
        assert!(verify_proof(&sha256(b"20"), &proof, &anchored));

        let tampered = kv_records(&[("A", "10"), ("B", "100"), ("C", "30"), ("D", "40")]);
        let mt2 = MerkleTree::from_records(&tampered).unwrap();
        assert_ne!(mt2.root(), anchored);
        // the modified value still proves against its own tree but not the anchor
        let proof2 = mt2.prove(1).unwrap();
        assert!(verify_proof(&sha256(b"100"), &proof2, &mt2.root()));
        assert!(!verify_proof(&sha256(b"100"), &proof2, &anchored));
        assert!(!verify_proof(&sha256(b"100"), &proof, &anchored));
    }

    #[test]
    fn adding_a_leaf_changes_root() {
        let four: Vec<Digest> = (0..4).map(leaf).collect();
        let five: Vec<Digest> = (0..5).map(leaf).collect();
        assert_ne!(merkle_root(&four), merkle_root(&five));
        assert_ne!(MerkleTree::build(&four).unwrap().height(), MerkleTree::build(&five).unwrap().height());
    }

    #[test]
    fn prove_by_leaf_value() {
        let leaves: Vec<Digest> = (0..6).map(leaf).collect();
        let mt = MerkleTree::build(&leaves).unwrap();
        let (idx, proof) = mt.prove_leaf(&leaf(4)).unwrap();
        assert_eq!(idx, 4);
        assert!(MerkleTree::verify(&leaf(4), &proof, &mt.root()));
        assert!(mt.prove_leaf(&leaf(9)).is_none());
        assert_eq!(mt.identity(0), None);
    }

    #[test]
    fn named_leaves_keep_identities() {
        let named = vec![("/d/a".to_string(), leaf(1)), ("/d/b".to_string(), leaf(2))];
        let mt = MerkleTree::from_named_leaves(named).unwrap();
        assert_eq!(mt.root(), digest_pair(&leaf(1), &leaf(2)));
        assert_eq!(mt.index_of("/d/b"), Some(1));
        assert!(MerkleTree::from_named_leaves(vec![("x".into(), leaf(1)), ("x".into(), leaf(2))]).is_err());
    }

    #[test]
    fn wide_level_matches_sequential_reference() {
        let leaves: Vec<Digest> = (0..(PAR_MIN_LEVEL + 3) as u32).map(|i| sha256(&i.to_le_bytes())).collect();
        let mt = MerkleTree::build(&leaves).unwrap();
        assert_eq!(mt.root(), reference_root(&leaves));
        assert_eq!(merkle_root(&leaves), Some(mt.root()));
        let last = leaves.len() - 1;
        assert!(verify_proof(&leaves[last], &mt.prove(last).unwrap(), &mt.root()));
    }

    #[test]
    fn rejects_tampered_leaf_or_path() {
        let leaves: Vec<Digest> = (0..7).map(leaf).collect();
        let mt = MerkleTree::build(&leaves).unwrap();
        let root = mt.root();
        let mut proof = mt.prove(2).unwrap();
        assert!(!verify_proof(&leaf(0), &proof, &root));
        assert!(!verify_proof(&leaves[2], &proof, &flip(&root)));
        proof.steps[1].sibling = flip(&proof.steps[1].sibling);
        assert!(!verify_proof(&leaves[2], &proof, &root));
    }

    proptest! {
        #[test]
        fn every_index_proves(payloads in proptest::collection::vec(any::<Vec<u8>>(), 1..40)) {
            let leaves: Vec<Digest> = payloads.iter().map(|p| sha256(p)).collect();
            let mt = MerkleTree::build(&leaves).unwrap();
            prop_assert_eq!(mt.root(), reference_root(&leaves));
            prop_assert_eq!(MerkleTree::build(&leaves).unwrap().root(), mt.root());
            for (i, l) in leaves.iter().enumerate() {
                let proof = mt.prove(i).unwrap();
                prop_assert_eq!(proof.len(), mt.height());
                prop_assert!(verify_proof(l, &proof, &mt.root()));
            }
        }

        #[test]
        fn mutated_sibling_fails(n in 2usize..40, pick in any::<proptest::sample::Index>(), step in any::<proptest::sample::Index>()) {
            let leaves: Vec<Digest> = (0..n as u32).map(|i| sha256(&i.to_be_bytes())).collect();
            let mt = MerkleTree::build(&leaves).unwrap();
            let i = pick.index(n);
            let mut proof = mt.prove(i).unwrap();
            let s = step.index(proof.len());
            proof.steps[s].sibling = flip(&proof.steps[s].sibling);
            prop_assert!(!verify_proof(&leaves[i], &proof, &mt.root()));
        }
    }
}
