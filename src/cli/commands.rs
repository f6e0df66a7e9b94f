//! CLI command implementations
//!
//! This module contains the implementation for each CLI command.

use crate::cli::OutputFormat;
use crate::cli::output::{
    SnapshotReport, output_neighborhood_json, output_neighborhood_table, output_runs_json,
    output_runs_table, output_stats_json, output_stats_table,
};
use crate::{Error, Result};
use std::path::PathBuf;

/// Build command implementation
pub mod build {
    use super::*;
    use crate::blocks::{BitcoinDecoder, BlockDecoder};
    use crate::cli::BuildArgs;
    use crate::run::{
        CancelToken, RunController, RunOptions, RunSummary, StopReason, merge_checkpoints,
        run_shards, shard::shard_dir,
    };
    use crate::Config;
    use std::sync::Arc;

    /// Execute the build command
    pub async fn execute(args: BuildArgs, mut config: Config, cancel: CancelToken) -> Result<()> {
        args.apply(&mut config);
        config.validate()?;

        let decoder: Arc<dyn BlockDecoder> = Arc::new(BitcoinDecoder::new(config.network()?));
        let mut options = RunOptions::from_config(&config)?;
        options.resume = args.resume;

        tracing::info!(
            "Building address graph from {:?} into {:?}",
            options.blocks_dir,
            options.checkpoint_dir
        );

        let summaries = if args.shards > 1 {
            let base = options.checkpoint_dir.clone();
            let raw_edges = options.raw_edges;
            let summaries = run_shards(options, decoder, args.shards, cancel).await?;

            if interrupted(&summaries) {
                tracing::warn!(
                    "Build interrupted, shard snapshots left unmerged under {:?}",
                    base
                );
                return output_runs(&summaries, args.format);
            }

            let dirs: Vec<PathBuf> = (0..summaries.len()).map(|i| shard_dir(&base, i)).collect();
            let (id, report) =
                tokio::task::spawn_blocking(move || merge_checkpoints(&dirs, &base, raw_edges))
                    .await
                    .map_err(|e| Error::custom(format!("merge worker failed: {}", e)))??;
            tracing::info!(
                "Merged snapshot {}: {} pending spends linked, {} left unresolved",
                id,
                report.resolved_pending,
                report.remaining_pending
            );
            summaries
        } else {
            let mut controller = RunController::new(options, decoder).with_cancel(cancel);
            let summary = tokio::task::spawn_blocking(move || controller.run())
                .await
                .map_err(|e| Error::custom(format!("build worker failed: {}", e)))??;
            vec![summary]
        };

        output_runs(&summaries, args.format)
    }

    /// Partial shards must not be merged into the base directory
    fn interrupted(summaries: &[RunSummary]) -> bool {
        summaries
            .iter()
            .any(|s| s.outcome.reason == StopReason::Interrupted)
    }

    fn output_runs(summaries: &[RunSummary], format: OutputFormat) -> Result<()> {
        let mut stdout = std::io::stdout();
        match format {
            OutputFormat::Json => output_runs_json(&mut stdout, summaries),
            OutputFormat::Table => output_runs_table(&mut stdout, summaries),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::run::tests::{JsonDecoder, chain, options, write_chain};

        #[tokio::test]
        async fn test_interrupted_shards_are_detected() {
            let dir = tempfile::tempdir().unwrap();
            let blocks = write_chain(dir.path(), &chain());
            let cancel = CancelToken::new();
            cancel.cancel();

            let summaries = run_shards(
                options(blocks, dir.path().join("out")),
                Arc::new(JsonDecoder::default()),
                2,
                cancel,
            )
            .await
            .unwrap();
            assert!(interrupted(&summaries));
        }
    }
}

/// Inspect command implementation
pub mod inspect {
    use super::*;
    use crate::checkpoint::{CheckpointManager, RunContext};
    use crate::graph::GraphAnalyzer;

    /// Execute the inspect command
    pub fn execute(
        dir: PathBuf,
        address: Option<String>,
        radius: usize,
        directed: bool,
        communities: Option<usize>,
        output: OutputFormat,
    ) -> Result<()> {
        let snapshot = CheckpointManager::new(&dir, RunContext::new()).restore_latest()?;
        let graph = &snapshot.state.graph;
        let mut analyzer = GraphAnalyzer::new(graph);
        let mut stdout = std::io::stdout();

        if let Some(address) = address {
            let neighborhood = analyzer.neighborhood(&address, radius, directed)?;
            return match output {
                OutputFormat::Json => output_neighborhood_json(&mut stdout, &neighborhood),
                OutputFormat::Table => output_neighborhood_table(&mut stdout, &neighborhood),
            };
        }

        let communities = match communities {
            Some(n) => Some(analyzer.communities()?.largest(n)),
            None => None,
        };
        let report = SnapshotReport {
            id: snapshot.id.clone(),
            stats: graph.stats(),
            unspent_transactions: snapshot.state.utxos.len(),
            unspent_outputs: snapshot.state.utxos.output_count(),
            pending_spends: snapshot.state.pending.len(),
            metadata: snapshot.metadata.clone(),
            communities,
        };

        match output {
            OutputFormat::Json => output_stats_json(&mut stdout, &report),
            OutputFormat::Table => output_stats_table(&mut stdout, &report),
        }
    }
}

/// Merge command implementation
pub mod merge {
    use super::*;
    use crate::run::merge_checkpoints;

    /// Execute the merge command
    pub fn execute(dirs: Vec<PathBuf>, output: PathBuf, raw_edges: bool) -> Result<()> {
        tracing::info!("Merging {} checkpoint directories into {:?}", dirs.len(), output);

        let (id, report) = merge_checkpoints(&dirs, &output, raw_edges)?;

        println!("Merged {} shards into snapshot {}", report.shards, id);
        println!("  Pending spends linked:  {}", report.resolved_pending);
        println!("  Edges added:            {}", report.edges_linked);
        println!("  Still unresolved:       {}", report.remaining_pending);
        Ok(())
    }
}
