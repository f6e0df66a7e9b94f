//! Checkpoint manager
//!
//! A snapshot is a directory holding everything needed to resume a run:
//!
//! ```text
//! <checkpoint dir>/20240101_120000_000003/
//!     graph.bin       vertex count + edge list
//!     addresses.bin   addresses in vertex-id order
//!     utxos.bin       unspent outputs
//!     pending.bin     unresolved inputs kept for merging
//!     metadata.json   run metadata
//!     raw.edges       "<from> <to>" per edge, only with raw edge export on
//! ```
//!
//! Names sort lexically in creation order: the run start timestamp, then a
//! sequence number. Snapshots are written under a hidden temporary name and
//! renamed into place, so a half-written snapshot is never picked up.

use crate::graph::{AddressGraph, AddressIndex, GraphState, PendingSpend, UtxoTable, VertexId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub mod metadata;

pub use metadata::{BLOCK_HISTORY, RunMetadata};

const GRAPH_FILE: &str = "graph.bin";
const ADDRESSES_FILE: &str = "addresses.bin";
const UTXOS_FILE: &str = "utxos.bin";
const PENDING_FILE: &str = "pending.bin";
const METADATA_FILE: &str = "metadata.json";
const RAW_EDGES_FILE: &str = "raw.edges";

/// Per-run values fixed when the run starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(started_at: DateTime<Utc>) -> Self {
        Self { started_at }
    }

    fn label(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of a snapshot directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    fn new(context: &RunContext, seq: u32) -> Self {
        Self(format!("{}_{:06}", context.label(), seq))
    }

    /// Accepts `YYYYmmdd_HHMMSS_NNNNNN`
    pub fn parse(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('_').collect();
        let valid = parts.len() == 3
            && parts
                .iter()
                .zip([8, 6, 6])
                .all(|(p, len)| p.len() == len && p.bytes().all(|b| b.is_ascii_digit()));
        valid.then(|| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A restored snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub state: GraphState,
    pub metadata: RunMetadata,
}

#[derive(Serialize, Deserialize)]
struct GraphRecord {
    vertex_count: u32,
    edges: Vec<(VertexId, VertexId)>,
}

/// Writes and restores snapshots under one directory
#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
    context: RunContext,
    next_seq: u32,
    raw_edges: bool,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, context: RunContext) -> Self {
        Self {
            dir: dir.into(),
            context,
            next_seq: 0,
            raw_edges: false,
        }
    }

    /// Also write each snapshot's edges as a plain address list
    pub fn with_raw_edges(mut self, raw_edges: bool) -> Self {
        self.raw_edges = raw_edges;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Write a new snapshot; existing snapshots are never touched
    pub fn flush(&mut self, state: &GraphState, metadata: &RunMetadata) -> Result<SnapshotId> {
        fs::create_dir_all(&self.dir)?;

        let mut id = SnapshotId::new(&self.context, self.next_seq);
        while self.dir.join(id.as_str()).exists() {
            self.next_seq += 1;
            id = SnapshotId::new(&self.context, self.next_seq);
        }
        self.next_seq += 1;

        let tmp = self.dir.join(format!(".tmp-{}", id));
        if tmp.exists() {
            fs::remove_dir_all(&tmp)?;
        }
        fs::create_dir(&tmp)?;

        let graph = GraphRecord {
            vertex_count: state.graph.vertex_count() as u32,
            edges: state.graph.edges().collect(),
        };
        write_bin(&tmp.join(GRAPH_FILE), &graph)?;
        write_bin(&tmp.join(ADDRESSES_FILE), &state.graph.index().addresses())?;
        write_bin(&tmp.join(UTXOS_FILE), &state.utxos)?;
        write_bin(&tmp.join(PENDING_FILE), &state.pending)?;

        let mut writer = BufWriter::new(File::create(tmp.join(METADATA_FILE))?);
        serde_json::to_writer_pretty(&mut writer, metadata)?;
        writer.flush()?;

        if self.raw_edges {
            write_raw_edges(&tmp.join(RAW_EDGES_FILE), state)?;
        }

        fs::rename(&tmp, self.dir.join(id.as_str()))?;

        tracing::info!(
            "Saved snapshot {} ({} vertices, {} edges, {} unspent txs)",
            id,
            state.graph.vertex_count(),
            state.graph.edge_count(),
            state.utxos.len()
        );
        Ok(id)
    }

    /// Snapshot ids in creation order
    pub fn list(&self) -> Result<Vec<SnapshotId>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(SnapshotId::parse) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Restore the most recent snapshot
    pub fn restore_latest(&self) -> Result<Snapshot> {
        let latest = self
            .list()?
            .pop()
            .ok_or_else(|| Error::NoSnapshot(self.dir.clone()))?;
        self.restore(&latest)
    }

    pub fn restore(&self, id: &SnapshotId) -> Result<Snapshot> {
        let path = self.dir.join(id.as_str());
        tracing::info!("Loading snapshot {:?}", path);

        let graph: GraphRecord = read_bin(&path.join(GRAPH_FILE))?;
        let addresses: Vec<String> = read_bin(&path.join(ADDRESSES_FILE))?;
        let mut utxos: UtxoTable = read_bin(&path.join(UTXOS_FILE))?;
        utxos.recount();
        let pending: Vec<PendingSpend> = read_bin(&path.join(PENDING_FILE))?;

        if graph.vertex_count as usize != addresses.len() {
            return Err(Error::snapshot(format!(
                "{}: graph has {} vertices but index lists {} addresses",
                id,
                graph.vertex_count,
                addresses.len()
            )));
        }
        let index = AddressIndex::from_addresses(addresses)?;
        let graph = AddressGraph::from_parts(index, &graph.edges)?;

        let reader = BufReader::new(open(&path.join(METADATA_FILE))?);
        let metadata: RunMetadata = serde_json::from_reader(reader)
            .map_err(|e| Error::snapshot(format!("{}: {}", METADATA_FILE, e)))?;

        Ok(Snapshot {
            id: id.clone(),
            state: GraphState {
                graph,
                utxos,
                pending,
            },
            metadata,
        })
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::snapshot(format!("cannot open {:?}: {}", path, e)))
}

fn write_bin<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn write_raw_edges(path: &Path, state: &GraphState) -> Result<()> {
    let graph = &state.graph;
    let mut writer = BufWriter::new(File::create(path)?);
    for (from, to) in graph.edges() {
        writeln!(writer, "{} {}", graph.address_of(from)?, graph.address_of(to)?)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(open(path)?);
    bincode::deserialize_from(reader).map_err(|e| Error::snapshot(format!("{:?}: {}", path, e)))
}
