//! Search command - semantic search against the indexing API.

use std::path::Path;

use anyhow::Context;

use super::client_from;
use crate::api::SearchHit;

/// Run a search and print the ranked hits.
pub async fn run(query: &str, limit: usize, threshold: f64, config_path: &Path) -> anyhow::Result<()> {
    let client = client_from(config_path)?;

    let response = client
        .search(query, limit, threshold)
        .await
        .context("search failed")?;

    if response.results.is_empty() {
        println!("No results found");
        return Ok(());
    }

    println!("Found {} results:\n", response.results.len());
    for (i, hit) in response.results.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &SearchHit) {
    let payload = &hit.payload;
    println!("[{rank}] Score: {:.3} | File: {}", hit.score, payload.file_path);
    println!(
        "    Position: {}-{} | Chunk: {}",
        payload.start, payload.end, payload.chunk_index
    );
    println!("    Text: {}\n", payload.text);
}
