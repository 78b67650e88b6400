// File: ledgerseal-cli/src/main.rs
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ledgerseal_config::{load_params_file, Params};
use ledgerseal_detect::{Detector, DigestSource, LeafOrder, ObjectProof, Status, TamperReport};
use ledgerseal_hash::{sha256, Digest};
use ledgerseal_ledger::FileLedger;
use ledgerseal_merkle::MerkleTree;
use ledgerseal_store::{FsObjectStore, ObjectStore};
use std::process::ExitCode;
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledgerseal", version, about = "Anchor object-store digests in an append-only ledger and detect tampering")]
struct Cli {
    /// Params file (toml); flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Local directory acting as the object store root
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,
    /// Ledger journal path
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,
    /// Directory leaf order: listing | lexicographic | ranked:ID=RANK,...
    #[arg(long, global = true)]
    order: Option<LeafOrder>,
    /// Per-object digest: metadata | content
    #[arg(long, global = true)]
    source: Option<DigestSource>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Anchor one object's digest
    AnchorFile { identity: String },
    /// Anchor a directory's Merkle root
    AnchorDir {
        directory: String,
        /// Also anchor every object in the directory
        #[arg(long)]
        files: bool,
    },
    /// Compare one object against its anchor
    CheckFile { identity: String },
    /// Compare a directory's current root against its anchor
    CheckDir { directory: String },
    /// Check every object of a directory against its own anchor
    Scan { directory: String },
    /// Print a directory's current Merkle root
    Root { directory: String },
    /// Write a membership proof for an object of a directory
    Prove {
        directory: String,
        identity: String,
        #[arg(long, default_value = "proof.bin")]
        out: PathBuf,
    },
    /// Verify a membership proof
    Verify {
        #[arg(long, default_value = "proof.bin")]
        proof: PathBuf,
        /// Check against this root instead of the one in the proof
        #[arg(long)]
        root: Option<String>,
        /// Check against the directory's anchored root
        #[arg(long, conflicts_with = "root")]
        anchored: bool,
    },
    /// Create a directory if missing
    Mkdir { directory: String },
    /// Overwrite an object (tampering simulation)
    Tamper {
        identity: String,
        #[arg(long, default_value = "This is malicious content!")]
        content: String,
    },
    /// SHA-256 of the given input
    Hash {
        input: String,
        /// Treat input as hex-encoded bytes
        #[arg(long)]
        hex: bool,
    },
    /// Merkle root over hex leaf digests, in the given order
    MerkleRoot {
        #[arg(required = true)]
        leaves: Vec<String>,
    },
}

type LocalDetector = Detector<FsObjectStore, FileLedger>;

fn params(cli: &Cli) -> anyhow::Result<Params> {
    let mut params = Params::default();
    if let Some(path) = &cli.config {
        params = params.merge(load_params_file(path)?);
    }
    Ok(params.merge(Params {
        store_root: cli.store_root.clone(),
        ledger_path: cli.ledger.clone(),
        leaf_order: cli.order.clone(),
        digest_source: cli.source,
    }))
}

fn detector(params: &Params) -> anyhow::Result<LocalDetector> {
    let ledger_path = params.ledger_path();
    let ledger = FileLedger::open(&ledger_path).with_context(|| format!("open ledger {}", ledger_path.display()))?;
    let store = FsObjectStore::new(params.store_root());
    tracing::debug!(store = %store.root().display(), ledger = %ledger_path.display(), options = ?params.detector_options(), "detector ready");
    Ok(Detector::with_options(store, ledger, params.detector_options()))
}

fn report_code(report: &TamperReport) -> ExitCode {
    match report.status {
        Status::Matched => ExitCode::SUCCESS,
        Status::Tampered => ExitCode::from(1),
        Status::Untracked => ExitCode::from(2),
    }
}

fn parse_digest(hex: &str) -> anyhow::Result<Digest> {
    Digest::from_hex(hex).with_context(|| format!("bad digest `{hex}`"))
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let params = params(&cli)?;
    match cli.cmd {
        Cmd::AnchorFile { identity } => {
            let d = detector(&params)?.anchor_file(&identity)?;
            println!("anchored {identity} {d}");
        }
        Cmd::AnchorDir { directory, files } => {
            let det = detector(&params)?;
            if files {
                for (id, d) in det.anchor_directory_files(&directory)? {
                    println!("anchored {id} {d}");
                }
            }
            let root = det.anchor_directory(&directory)?;
            println!("anchored {directory} {root}");
        }
        Cmd::CheckFile { identity } => {
            let report = detector(&params)?.detect_file_tampering(&identity)?;
            println!("{report}");
            return Ok(report_code(&report));
        }
        Cmd::CheckDir { directory } => {
            let report = detector(&params)?.detect_directory_tampering(&directory)?;
            println!("{report}");
            if report.is_tampered() {
                println!("possible causes: an object was added, deleted or modified");
            }
            return Ok(report_code(&report));
        }
        Cmd::Scan { directory } => {
            let reports = detector(&params)?.scan_directory_files(&directory)?;
            let mut tampered = 0usize;
            for r in &reports {
                println!("{r}");
                tampered += usize::from(r.is_tampered());
            }
            println!("scanned={} tampered={}", reports.len(), tampered);
            if tampered > 0 {
                return Ok(ExitCode::from(1));
            }
        }
        Cmd::Root { directory } => {
            let tree = detector(&params)?.directory_tree(&directory)?;
            println!("root={} leaves={} height={}", tree.root(), tree.leaf_count(), tree.height());
        }
        Cmd::Prove { directory, identity, out } => {
            let proof = detector(&params)?.prove_object(&directory, &identity)?;
            let f = fs::File::create(&out).with_context(|| format!("create {}", out.display()))?;
            bincode::serialize_into(f, &proof).context("encode proof")?;
            println!("wrote {}", out.display());
            println!("index={} leaf={} root={}", proof.index, proof.leaf, proof.root);
        }
        Cmd::Verify { proof, root, anchored } => {
            let f = fs::File::open(&proof).with_context(|| format!("open {}", proof.display()))?;
            let proof: ObjectProof = bincode::deserialize_from(f).context("decode proof")?;
            let ok = if anchored {
                match detector(&params)?.verify_anchored(&proof)? {
                    Some(ok) => ok,
                    None => bail!("directory {} is not anchored", proof.directory),
                }
            } else if let Some(hex) = root {
                proof.verify_against(&parse_digest(&hex)?)
            } else {
                proof.verify()
            };
            println!("{} {}", proof.identity, if ok { "valid" } else { "invalid" });
            if !ok {
                return Ok(ExitCode::from(1));
            }
        }
        Cmd::Mkdir { directory } => {
            let created = FsObjectStore::new(params.store_root()).ensure_directory(&directory)?;
            println!("{} {directory}", if created { "created" } else { "exists" });
        }
        Cmd::Tamper { identity, content } => {
            FsObjectStore::new(params.store_root()).write(&identity, content.as_bytes())?;
            println!("overwrote {identity}");
        }
        Cmd::Hash { input, hex } => {
            let bytes = if hex { hex::decode(input.trim()).context("decode hex input")? } else { input.into_bytes() };
            println!("{}", sha256(&bytes));
        }
        Cmd::MerkleRoot { leaves } => {
            let leaves = leaves.iter().map(|h| parse_digest(h)).collect::<anyhow::Result<Vec<_>>>()?;
            let tree = MerkleTree::build(&leaves)?;
            println!("root={} leaves={} height={}", tree.root(), tree.leaf_count(), tree.height());
        }
    }
    Ok(ExitCode::SUCCESS)
}
