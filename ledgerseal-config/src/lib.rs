use ledgerseal_detect::{DetectorOptions, DigestSource, LeafOrder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_LEDGER_PATH: &str = "ledger.jsonl";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Params {
    /// Directory standing in for the object store root
    pub store_root: Option<PathBuf>,
    /// Append-only ledger journal
    pub ledger_path: Option<PathBuf>,
    /// Leaf order for directory trees: "listing", "lexicographic" or a
    /// `[leaf_order.ranked]` table of identity or name to rank
    pub leaf_order: Option<LeafOrder>,
    /// Per-object digest: "metadata" or "content"
    pub digest_source: Option<DigestSource>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            store_root: Some(PathBuf::from(".")),
            ledger_path: Some(PathBuf::from(DEFAULT_LEDGER_PATH)),
            leaf_order: Some(LeafOrder::default()),
            digest_source: Some(DigestSource::default()),
        }
    }
}

impl Params {
    pub fn empty() -> Self { Self { store_root: None, ledger_path: None, leaf_order: None, digest_source: None } }

    /// Fields set in `over` win over fields set in `self`.
    pub fn merge(self, over: Params) -> Params {
        Params {
            store_root: over.store_root.or(self.store_root),
            ledger_path: over.ledger_path.or(self.ledger_path),
            leaf_order: over.leaf_order.or(self.leaf_order),
            digest_source: over.digest_source.or(self.digest_source),
        }
    }

    pub fn store_root(&self) -> PathBuf { self.store_root.clone().unwrap_or_else(|| PathBuf::from(".")) }
    pub fn ledger_path(&self) -> PathBuf { self.ledger_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)) }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            leaf_order: self.leaf_order.clone().unwrap_or_default(),
            digest_source: self.digest_source.unwrap_or_default(),
        }
    }
}

/// Parse parameters from TOML text
pub fn load_params_toml(input: &str) -> Result<Params, toml::de::Error> {
    toml::from_str::<Params>(input)
}

pub fn load_params_file(path: &Path) -> Result<Params, ConfigError> {
    let txt = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    load_params_toml(&txt).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}
