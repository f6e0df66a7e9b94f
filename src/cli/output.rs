//! Output formatting module
//!
//! This module renders run summaries, snapshot statistics and neighborhoods
//! as JSON or as plain text tables.

use crate::Result;
use crate::checkpoint::{RunMetadata, SnapshotId};
use crate::graph::{GraphStats, Neighborhood};
use crate::run::RunSummary;
use serde_json::json;

/// Everything `inspect` reports about a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    pub id: SnapshotId,
    pub stats: GraphStats,
    pub unspent_transactions: usize,
    pub unspent_outputs: usize,
    pub pending_spends: usize,
    pub metadata: RunMetadata,
    /// (community, size) by descending size
    pub communities: Option<Vec<(u32, usize)>>,
}

/// Output run summaries as JSON
pub fn output_runs_json(w: &mut impl std::io::Write, summaries: &[RunSummary]) -> Result<()> {
    let output = json!({
        "runs": summaries.iter().map(|s| {
            json!({
                "outcome": format!("{:?}", s.outcome.state),
                "reason": s.outcome.reason,
                "blocks_processed": s.blocks_processed,
                "blocks_skipped": s.blocks_skipped,
                "transactions_seen": s.transactions_seen,
                "snapshots": s.snapshots.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                "stats": s.stats,
            })
        }).collect::<Vec<_>>(),
    });

    serde_json::to_writer_pretty(&mut *w, &output)?;
    writeln!(w)?;
    Ok(())
}

/// Output run summaries as text table
pub fn output_runs_table(w: &mut impl std::io::Write, summaries: &[RunSummary]) -> Result<()> {
    writeln!(w, "Build Summary")?;
    writeln!(w, "{}", "=".repeat(96))?;
    writeln!(
        w,
        "{:<6} {:<16} {:>10} {:>9} {:>12} {:>12} {:>12} {:>10}",
        "Run", "Stopped", "Blocks", "Skipped", "Txs", "Edges", "Unresolved", "Snapshots"
    )?;
    writeln!(w, "{:-<96}", "")?;

    for (i, s) in summaries.iter().enumerate() {
        writeln!(
            w,
            "{:<6} {:<16} {:>10} {:>9} {:>12} {:>12} {:>12} {:>10}",
            i,
            format!("{:?}", s.outcome.reason),
            s.blocks_processed,
            s.blocks_skipped,
            s.transactions_seen,
            s.stats.edges,
            s.stats.unresolved(),
            s.snapshots.len()
        )?;
    }
    writeln!(w)?;

    if let Some(last) = summaries.iter().rev().find_map(|s| s.snapshots.last()) {
        writeln!(w, "Last snapshot: {}", last)?;
    }
    Ok(())
}

/// Output snapshot statistics as JSON
pub fn output_stats_json(w: &mut impl std::io::Write, report: &SnapshotReport) -> Result<()> {
    let output = json!({
        "snapshot": report.id.to_string(),
        "graph": report.stats,
        "unspent_transactions": report.unspent_transactions,
        "unspent_outputs": report.unspent_outputs,
        "pending_spends": report.pending_spends,
        "metadata": report.metadata,
        "communities": report.communities.as_ref().map(|c| {
            c.iter().map(|(id, size)| json!({ "id": id, "size": size })).collect::<Vec<_>>()
        }),
    });

    serde_json::to_writer_pretty(&mut *w, &output)?;
    writeln!(w)?;
    Ok(())
}

/// Output snapshot statistics as text table
pub fn output_stats_table(w: &mut impl std::io::Write, report: &SnapshotReport) -> Result<()> {
    let meta = &report.metadata;
    writeln!(w, "Snapshot {}", report.id)?;
    writeln!(w, "{}", "=".repeat(60))?;
    writeln!(w)?;

    writeln!(w, "Graph:")?;
    writeln!(w, "  Vertices:          {}", report.stats.vertices)?;
    writeln!(w, "  Edges:             {}", report.stats.edges)?;
    writeln!(w, "  Sources:           {}", report.stats.sources)?;
    writeln!(w, "  Sinks:             {}", report.stats.sinks)?;
    writeln!(w, "  Max in-degree:     {}", report.stats.max_in_degree)?;
    writeln!(w, "  Max out-degree:    {}", report.stats.max_out_degree)?;
    writeln!(w)?;

    writeln!(w, "Unspent:")?;
    writeln!(w, "  Transactions:      {}", report.unspent_transactions)?;
    writeln!(w, "  Outputs:           {}", report.unspent_outputs)?;
    writeln!(w, "  Pending spends:    {}", report.pending_spends)?;
    writeln!(w)?;

    writeln!(w, "Progress:")?;
    writeln!(w, "  Created:           {}", meta.created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(w, "  Last file:         {}", meta.last_file.as_deref().unwrap_or("-"))?;
    writeln!(w, "  Last block:        {}", meta.last_block_hash.as_deref().unwrap_or("-"))?;
    writeln!(
        w,
        "  Last timestamp:    {}",
        meta.last_block_timestamp
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string())
    )?;
    writeln!(w, "  Last transaction:  {}", meta.last_tx_id.as_deref().unwrap_or("-"))?;
    if let Some(start) = &meta.pending_start_tx {
        writeln!(w, "  Waiting for:       {}", start)?;
    }
    writeln!(w)?;

    if let Some(communities) = &report.communities {
        writeln!(w, "Largest communities:")?;
        writeln!(w, "{:-<30}", "")?;
        writeln!(w, "{:<12} {:>16}", "Community", "Vertices")?;
        writeln!(w, "{:-<30}", "")?;
        for (id, size) in communities {
            writeln!(w, "{:<12} {:>16}", id, size)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Output a neighborhood as JSON
pub fn output_neighborhood_json(w: &mut impl std::io::Write, n: &Neighborhood) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, n)?;
    writeln!(w)?;
    Ok(())
}

/// Output a neighborhood as text table
pub fn output_neighborhood_table(w: &mut impl std::io::Write, n: &Neighborhood) -> Result<()> {
    writeln!(
        w,
        "Neighborhood of vertex {} (radius {}): {} vertices, {} edges",
        n.center,
        n.radius,
        n.vertices.len(),
        n.edges.len()
    )?;
    writeln!(w, "{:-<90}", "")?;
    writeln!(w, "{:<10} {:<62} {:>7} {:>7}", "Vertex", "Address", "In", "Out")?;
    writeln!(w, "{:-<90}", "")?;

    for v in &n.vertices {
        let address = if v.address.len() > 60 {
            format!("{}...", &v.address[..57])
        } else {
            v.address.clone()
        };
        writeln!(
            w,
            "{:<10} {:<62} {:>7} {:>7}",
            v.id, address, v.in_degree, v.out_degree
        )?;
    }
    writeln!(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexSummary;
    use chrono::Utc;

    fn neighborhood() -> Neighborhood {
        Neighborhood {
            center: 0,
            radius: 1,
            vertices: vec![
                VertexSummary {
                    id: 0,
                    address: "A".to_string(),
                    in_degree: 0,
                    out_degree: 1,
                },
                VertexSummary {
                    id: 1,
                    address: "B".to_string(),
                    in_degree: 1,
                    out_degree: 0,
                },
            ],
            edges: vec![(0, 1)],
        }
    }

    #[test]
    fn test_neighborhood_json() {
        let mut buf = Vec::new();
        output_neighborhood_json(&mut buf, &neighborhood()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["vertices"][1]["address"], "B");
        assert_eq!(value["edges"][0], json!([0, 1]));
    }

    #[test]
    fn test_neighborhood_table() {
        let mut buf = Vec::new();
        output_neighborhood_table(&mut buf, &neighborhood()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Neighborhood of vertex 0 (radius 1): 2 vertices, 1 edges"));
    }

    #[test]
    fn test_stats_table_lists_communities() {
        let report = SnapshotReport {
            id: SnapshotId::parse("20240101_000000_000000").unwrap(),
            stats: GraphStats::default(),
            unspent_transactions: 3,
            unspent_outputs: 4,
            pending_spends: 0,
            metadata: RunMetadata::new(Utc::now()),
            communities: Some(vec![(0, 5), (1, 2)]),
        };
        let mut buf = Vec::new();
        output_stats_table(&mut buf, &report).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Snapshot 20240101_000000_000000"));
        assert!(text.contains("Largest communities:"));

        let mut buf = Vec::new();
        output_stats_json(&mut buf, &report).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["unspent_outputs"], 4);
        assert_eq!(value["communities"][0]["size"], 5);
    }
}
