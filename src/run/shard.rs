//! Sharded builds
//!
//! The file set is cut into contiguous partitions, each built by its own
//! controller on a blocking worker with its own checkpoint directory
//! (`<checkpoint dir>/shard-NN`). Shards keep their unresolved inputs so
//! [`merge_checkpoints`] can link them afterwards.
//!
//! Start and end transactions are rejected when there is more than one
//! partition: a shard cannot tell whether its range lies before or after a
//! transaction that another shard has yet to reach.

use super::{CancelToken, RunController, RunOptions, RunSummary};
use crate::blocks::{BlockDecoder, FileSet};
use crate::checkpoint::{CheckpointManager, RunContext, RunMetadata, SnapshotId};
use crate::graph::{MergeReport, merge_shards};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Checkpoint directory of shard `index`
pub fn shard_dir(base: &Path, index: usize) -> PathBuf {
    base.join(format!("shard-{:02}", index))
}

/// Build up to `shards` partitions concurrently; summaries come back in file order
pub async fn run_shards(
    options: RunOptions,
    decoder: Arc<dyn BlockDecoder>,
    shards: usize,
    cancel: CancelToken,
) -> Result<Vec<RunSummary>> {
    let files = FileSet::resolve(
        &options.blocks_dir,
        options.start_file.as_deref(),
        options.end_file.as_deref(),
    )?;
    let partitions = files.partition(shards);
    if partitions.len() > 1 && (options.start_tx.is_some() || options.end_tx.is_some()) {
        return Err(Error::Config(
            "start and end transactions cannot be combined with more than one shard".to_string(),
        ));
    }
    tracing::info!(
        "Building {} block files in {} shards",
        files.len(),
        partitions.len()
    );

    let mut handles = Vec::with_capacity(partitions.len());
    for (i, part) in partitions.into_iter().enumerate() {
        let mut opts = options.clone();
        opts.checkpoint_dir = shard_dir(&options.checkpoint_dir, i);
        opts.keep_unresolved = true;
        // only the merged snapshot gets an edge list
        opts.raw_edges = false;

        let decoder = decoder.clone();
        let cancel = cancel.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            RunController::new(opts, decoder)
                .with_files(part)
                .with_cancel(cancel)
                .run()
        }));
    }

    let mut summaries = Vec::with_capacity(handles.len());
    let mut failure = None;
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle
            .await
            .map_err(|e| Error::custom(format!("shard {} worker failed: {}", i, e)))
            .and_then(|r| r);
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                tracing::error!("Shard {} failed: {}", i, e);
                cancel.cancel();
                failure.get_or_insert(e);
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(summaries),
    }
}

/// Merge the latest snapshots of `dirs` (in file order) into a new snapshot under `output`
pub fn merge_checkpoints(
    dirs: &[PathBuf],
    output: &Path,
    raw_edges: bool,
) -> Result<(SnapshotId, MergeReport)> {
    let mut states = Vec::with_capacity(dirs.len());
    let mut metadata = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let snapshot = CheckpointManager::new(dir, RunContext::new()).restore_latest()?;
        states.push(snapshot.state);
        metadata.push(snapshot.metadata);
    }

    let metadata = merged_metadata(metadata)
        .ok_or_else(|| Error::custom("no checkpoint directories to merge"))?;
    let (state, report) = merge_shards(states)?;

    let mut manager = CheckpointManager::new(output, RunContext::new()).with_raw_edges(raw_edges);
    let id = manager.flush(&state, &metadata)?;
    Ok((id, report))
}

/// Progress markers of the last shard, creation time of the oldest
fn merged_metadata(shards: Vec<RunMetadata>) -> Option<RunMetadata> {
    let created_at = shards.iter().map(|m| m.created_at).min()?;
    let pending_start_tx = shards.first()?.pending_start_tx.clone();
    let mut merged = shards.into_iter().last()?;
    merged.created_at = created_at;
    merged.pending_start_tx = pending_start_tx;
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::StopReason;
    use crate::run::tests::{JsonDecoder, chain, options, write_chain};

    fn edge_addresses(dir: &Path) -> Vec<(String, String)> {
        let snapshot = CheckpointManager::new(dir, RunContext::new())
            .restore_latest()
            .unwrap();
        let graph = &snapshot.state.graph;
        let mut edges: Vec<_> = graph
            .edges()
            .map(|(f, t)| {
                (
                    graph.address_of(f).unwrap().clone(),
                    graph.address_of(t).unwrap().clone(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    #[tokio::test]
    async fn test_sharded_build_merges_to_sequential_result() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = write_chain(dir.path(), &chain());
        let out = dir.path().join("sharded");

        let summaries = run_shards(
            options(blocks.clone(), out.clone()),
            Arc::new(JsonDecoder::default()),
            2,
            CancelToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.outcome.reason == StopReason::Completed));
        // t2 and t3 spend an output built by the first shard
        assert_eq!(summaries[1].stats.unknown_transaction, 2);

        let dirs = vec![shard_dir(&out, 0), shard_dir(&out, 1)];
        let (_, report) = merge_checkpoints(&dirs, &out.join("merged"), false).unwrap();
        assert_eq!(report.resolved_pending, 2);
        assert_eq!(report.remaining_pending, 0);

        let sequential = dir.path().join("sequential");
        RunController::new(options(blocks, sequential.clone()), Arc::new(JsonDecoder::default()))
            .run()
            .unwrap();
        assert_eq!(edge_addresses(&out.join("merged")), edge_addresses(&sequential));
    }

    #[tokio::test]
    async fn test_transaction_bounds_need_a_single_shard() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = write_chain(dir.path(), &chain());
        let out = dir.path().join("sharded");

        for (start, end) in [(Some("t2"), None), (None, Some("t1"))] {
            let mut opts = options(blocks.clone(), out.clone());
            opts.start_tx = start.map(str::to_string);
            opts.end_tx = end.map(str::to_string);
            let err = run_shards(opts, Arc::new(JsonDecoder::default()), 2, CancelToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }
        assert!(!out.exists());

        // one shard honours the bound like a sequential run
        let mut opts = options(blocks.clone(), out.clone());
        opts.start_tx = Some("t2".to_string());
        let summaries = run_shards(opts, Arc::new(JsonDecoder::default()), 1, CancelToken::new())
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);

        let sequential = dir.path().join("sequential");
        let mut opts = options(blocks, sequential.clone());
        opts.start_tx = Some("t2".to_string());
        RunController::new(opts, Arc::new(JsonDecoder::default()))
            .run()
            .unwrap();
        assert_eq!(edge_addresses(&shard_dir(&out, 0)), edge_addresses(&sequential));
    }

    #[tokio::test]
    async fn test_merged_snapshot_exports_raw_edges() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = write_chain(dir.path(), &chain());
        let out = dir.path().join("sharded");
        let mut opts = options(blocks, out.clone());
        opts.raw_edges = true;

        run_shards(opts, Arc::new(JsonDecoder::default()), 2, CancelToken::new())
            .await
            .unwrap();
        let dirs = vec![shard_dir(&out, 0), shard_dir(&out, 1)];
        let (id, _) = merge_checkpoints(&dirs, &out, true).unwrap();

        let text = std::fs::read_to_string(out.join(id.as_str()).join("raw.edges")).unwrap();
        assert_eq!(text.lines().count(), 8);
    }

    #[test]
    fn test_merge_without_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(merge_checkpoints(&[], dir.path(), false).is_err());
    }
}
