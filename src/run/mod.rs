//! Run controller
//!
//! Drives one build over a file set: scan records, decode blocks, apply the
//! range filters, feed transactions to the graph builder and checkpoint.
//!
//! ```text
//! Idle -> Scanning -> (Filtering) -> Building -> Checkpointing -> Building
//!                                                              -> Finished
//!                                                              -> Aborted
//! ```

use crate::blocks::{Block, BlockDecoder, BlockFile, FileSet, TxId, files::file_name};
use crate::checkpoint::{CheckpointManager, RunContext, RunMetadata, SnapshotId};
use crate::graph::{BuildStats, GraphBuilder};
use crate::{Config, Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod shard;

pub use shard::{merge_checkpoints, run_shards};

/// Cooperative cancellation flag shared with signal handlers and workers
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scanning,
    /// Consuming transactions until the start transaction shows up
    Filtering,
    Building,
    Checkpointing,
    Finished,
    Aborted,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StopReason {
    /// Every selected file was scanned
    Completed,
    /// The configured end transaction was built
    EndTransaction,
    /// Cancellation was requested
    Interrupted,
}

/// Terminal state of a run and the reason it got there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: RunState,
    pub reason: StopReason,
}

impl RunOutcome {
    fn from_reason(reason: StopReason) -> Self {
        let state = match reason {
            StopReason::Interrupted => RunState::Aborted,
            StopReason::Completed | StopReason::EndTransaction => RunState::Finished,
        };
        Self { state, reason }
    }
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub blocks_processed: u64,
    pub blocks_skipped: u64,
    pub transactions_seen: u64,
    pub snapshots: Vec<SnapshotId>,
    pub stats: BuildStats,
}

/// Resolved settings of one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub blocks_dir: PathBuf,
    pub start_file: Option<String>,
    pub end_file: Option<String>,
    /// Record delimiter
    pub magic: [u8; 4],
    pub start_tx: Option<TxId>,
    pub end_tx: Option<TxId>,
    pub end_timestamp: Option<u32>,
    pub checkpoint_dir: PathBuf,
    pub every_blocks: u64,
    /// Export a plain edge list with every snapshot
    pub raw_edges: bool,
    pub keep_unresolved: bool,
    pub progress_every: u64,
    /// Continue from the latest snapshot in `checkpoint_dir`
    pub resume: bool,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            blocks_dir: config.blocks_dir(),
            start_file: config.source.start_file.clone(),
            end_file: config.source.end_file.clone(),
            magic: config.network()?.magic().to_bytes(),
            start_tx: config.range.start_tx.clone(),
            end_tx: config.range.end_tx.clone(),
            end_timestamp: config.range.end_timestamp,
            checkpoint_dir: config.checkpoint_dir(),
            every_blocks: config.checkpoint.every_blocks.max(1),
            raw_edges: config.checkpoint.raw_edges,
            keep_unresolved: config.build.keep_unresolved,
            progress_every: config.logging.progress_every,
            resume: false,
        })
    }
}

/// Position of the last transaction of a previous run
#[derive(Debug, Clone)]
struct ResumeCursor {
    tx_id: TxId,
    block_hash: String,
}

/// Owns the graph state for the duration of a run
pub struct RunController {
    options: RunOptions,
    decoder: Arc<dyn BlockDecoder>,
    cancel: CancelToken,
    files: Option<FileSet>,
    state: RunState,
}

impl RunController {
    pub fn new(options: RunOptions, decoder: Arc<dyn BlockDecoder>) -> Self {
        Self {
            options,
            decoder,
            cancel: CancelToken::new(),
            files: None,
            state: RunState::Idle,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scan exactly these files instead of resolving them from the options
    pub fn with_files(mut self, files: FileSet) -> Self {
        self.files = Some(files);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        self.state = RunState::Scanning;

        let files = match self.files.take() {
            Some(files) => files,
            None => FileSet::resolve(
                &self.options.blocks_dir,
                self.options.start_file.as_deref(),
                self.options.end_file.as_deref(),
            )?,
        };

        let context = RunContext::new();
        let checkpoints = CheckpointManager::new(&self.options.checkpoint_dir, context)
            .with_raw_edges(self.options.raw_edges);

        let (mut pass, files) = if self.options.resume {
            let snapshot = checkpoints.restore_latest()?;
            tracing::info!(
                "Resuming from snapshot {} (last transaction {:?})",
                snapshot.id,
                snapshot.metadata.last_tx_id
            );

            let files = match snapshot.metadata.last_file.as_deref() {
                Some(name) => files.starting_at(name).ok_or_else(|| {
                    Error::ResumeMismatch(format!("{} is not among the selected block files", name))
                })?,
                None => files,
            };
            let cursor = match (&snapshot.metadata.last_tx_id, &snapshot.metadata.last_block_hash) {
                (Some(tx_id), Some(block_hash)) => {
                    if !snapshot.metadata.is_recent(block_hash) {
                        return Err(Error::ResumeMismatch(format!(
                            "snapshot {} does not list block {} in its history",
                            snapshot.id, block_hash
                        )));
                    }
                    Some(ResumeCursor {
                        tx_id: tx_id.clone(),
                        block_hash: block_hash.clone(),
                    })
                }
                (Some(tx_id), None) => {
                    return Err(Error::ResumeMismatch(format!(
                        "snapshot {} records transaction {} without a block",
                        snapshot.id, tx_id
                    )));
                }
                (None, _) => None,
            };
            let builder = GraphBuilder::with_state(snapshot.state)
                .keep_unresolved(self.options.keep_unresolved);
            let mut pass = Pass::new(builder, snapshot.metadata, checkpoints, cursor);
            pass.resumed = true;
            (pass, files)
        } else {
            let mut metadata = RunMetadata::new(context.started_at);
            metadata.pending_start_tx = self.options.start_tx.clone();
            let builder = GraphBuilder::new().keep_unresolved(self.options.keep_unresolved);
            (Pass::new(builder, metadata, checkpoints, None), files)
        };

        tracing::info!("Scanning {} block files", files.len());
        let result = self.scan(&mut pass, &files);

        match result {
            Ok(reason) => {
                self.state = RunState::Checkpointing;
                pass.flush()?;
                let outcome = RunOutcome::from_reason(reason);
                self.state = outcome.state;
                tracing::info!(
                    "Run stopped ({:?}): {} blocks processed, {} skipped, {} transactions, {} edges",
                    reason,
                    pass.blocks_processed,
                    pass.blocks_skipped,
                    pass.transactions_seen,
                    pass.builder.graph().edge_count()
                );
                Ok(pass.into_summary(outcome))
            }
            Err(e) => {
                tracing::error!("Run failed: {}", e);
                self.state = RunState::Aborted;
                if let Err(flush_err) = pass.flush() {
                    tracing::warn!("Could not save snapshot after failure: {}", flush_err);
                }
                Err(e)
            }
        }
    }

    fn scan(&mut self, pass: &mut Pass, files: &FileSet) -> Result<StopReason> {
        for path in files.files() {
            let name = file_name(path);
            let file = BlockFile::open(path)?;
            tracing::info!("Scanning {} ({} bytes)", name, file.len());

            for raw in file.blocks(self.options.magic) {
                if self.cancel.is_cancelled() {
                    return Ok(StopReason::Interrupted);
                }
                let block = self.decoder.decode(raw?)?;
                if let Some(reason) = self.process_block(pass, &block, &name)? {
                    return Ok(reason);
                }
            }
        }

        if let Some(cursor) = &pass.cursor {
            return Err(Error::ResumeMismatch(format!(
                "block {} with transaction {} was not found",
                cursor.block_hash, cursor.tx_id
            )));
        }
        Ok(StopReason::Completed)
    }

    fn process_block(
        &mut self,
        pass: &mut Pass,
        block: &Block,
        file: &str,
    ) -> Result<Option<StopReason>> {
        if self.cancel.is_cancelled() {
            return Ok(Some(StopReason::Interrupted));
        }

        let first = match pass.cursor.take() {
            Some(cursor) if cursor.block_hash != block.hash => {
                pass.cursor = Some(cursor);
                return Ok(None);
            }
            Some(cursor) => {
                let position = block
                    .transactions
                    .iter()
                    .position(|tx| tx.id == cursor.tx_id)
                    .ok_or_else(|| {
                        Error::ResumeMismatch(format!(
                            "block {} does not contain transaction {}",
                            block.hash, cursor.tx_id
                        ))
                    })?;
                tracing::info!("Resume point found in block {}", block.hash);
                position + 1
            }
            None => {
                pass.metadata.last_block_timestamp = Some(block.timestamp);
                if self
                    .options
                    .end_timestamp
                    .is_some_and(|end| block.timestamp > end)
                {
                    tracing::debug!("Skipping block {} at {}", block.hash, block.timestamp);
                    pass.blocks_skipped += 1;
                    return Ok(None);
                }
                if pass.resumed && pass.metadata.is_recent(&block.hash) {
                    return Err(Error::ResumeMismatch(format!(
                        "block {} was already processed before the resume point",
                        block.hash
                    )));
                }
                // the recorded block must hold the recorded transaction
                if !block.transactions.is_empty() {
                    pass.metadata.record_block(&block.hash, file);
                }
                pass.blocks_processed += 1;
                0
            }
        };

        // a recorded block always gets its first transaction handled
        for (i, tx) in block.transactions.iter().enumerate().skip(first) {
            if i > 0 && self.cancel.is_cancelled() {
                return Ok(Some(StopReason::Interrupted));
            }
            pass.transactions_seen += 1;

            if let Some(start) = pass.metadata.pending_start_tx.as_deref() {
                if tx.id != start {
                    self.state = RunState::Filtering;
                    pass.metadata.record_transaction(&tx.id);
                    continue;
                }
                tracing::info!("Reached start transaction {}", tx.id);
                pass.metadata.pending_start_tx = None;
            }

            self.state = RunState::Building;
            pass.builder.apply_transaction(tx)?;
            pass.metadata.record_transaction(&tx.id);

            if self.options.end_tx.as_deref() == Some(tx.id.as_str()) {
                tracing::info!("Reached end transaction {}", tx.id);
                return Ok(Some(StopReason::EndTransaction));
            }
        }

        if first == 0 {
            if self.options.progress_every > 0
                && pass.blocks_processed % self.options.progress_every == 0
            {
                let graph = pass.builder.graph();
                tracing::info!(
                    "Processed {} blocks: {} vertices, {} edges, {} unspent txs",
                    pass.blocks_processed,
                    graph.vertex_count(),
                    graph.edge_count(),
                    pass.builder.utxos().len()
                );
            }
            if pass.blocks_processed % self.options.every_blocks == 0 {
                let previous = self.state;
                self.state = RunState::Checkpointing;
                pass.flush()?;
                self.state = previous;
            }
        }
        Ok(None)
    }
}

/// Mutable progress of one run
struct Pass {
    builder: GraphBuilder,
    metadata: RunMetadata,
    checkpoints: CheckpointManager,
    cursor: Option<ResumeCursor>,
    /// Continues a snapshot, so blocks in its history must not come back
    resumed: bool,
    blocks_processed: u64,
    blocks_skipped: u64,
    transactions_seen: u64,
    snapshots: Vec<SnapshotId>,
}

impl Pass {
    fn new(
        builder: GraphBuilder,
        metadata: RunMetadata,
        checkpoints: CheckpointManager,
        cursor: Option<ResumeCursor>,
    ) -> Self {
        Self {
            builder,
            metadata,
            checkpoints,
            cursor,
            resumed: false,
            blocks_processed: 0,
            blocks_skipped: 0,
            transactions_seen: 0,
            snapshots: Vec::new(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        let id = self.checkpoints.flush(self.builder.state(), &self.metadata)?;
        self.snapshots.push(id);
        Ok(())
    }

    fn into_summary(self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            outcome,
            blocks_processed: self.blocks_processed,
            blocks_skipped: self.blocks_skipped,
            transactions_seen: self.transactions_seen,
            snapshots: self.snapshots,
            stats: self.builder.stats(),
        }
    }
}
