//! Quick start example for semstore.
//!
//! Writes a handful of company profiles, then runs a semantic query, a
//! hybrid (semantic + filter) query and a predicate scan.

use semstore::prelude::*;
use std::fs;

#[tokio::main]
async fn main() -> Result<()> {
    let data_path = "./quickstart_data";
    let _ = fs::remove_dir_all(data_path);

    println!("🌟 semstore Quick Start Example\n");

    // The local hashing embedder needs no network or credentials.
    let store = Store::open(StoreConfig::new(data_path).with_embedder(EmbedderConfig::hashing(256))).await?;

    let profiles = [
        ("AAPL", "Apple Inc designs consumer electronics and software", "technology"),
        ("MSFT", "Microsoft builds cloud platforms and productivity software", "technology"),
        ("JPM", "JPMorgan Chase provides banking and asset management", "financials"),
        ("XOM", "Exxon Mobil explores for and produces oil and natural gas", "energy"),
        ("PFE", "Pfizer develops vaccines and prescription medicines", "healthcare"),
    ];

    println!("📥 Writing {} profiles...", profiles.len());
    for (symbol, text, sector) in &profiles {
        let metadata = Metadata::new()
            .with_field("symbol", *symbol)
            .with_field("sector", *sector)
            .with_field("data_type", "profile");
        store
            .write("profiles", NewDocument::new(*text).with_metadata(metadata))
            .await?;
    }
    println!("✅ Collection holds {} rows\n", store.count_rows("profiles", None).await?);

    println!("🔍 Semantic search: 'consumer electronics company'\n");
    let hits = store
        .query(
            QueryRequest::semantic("consumer electronics company")
                .in_collection("profiles")
                .with_limit(3),
        )
        .await?;
    print_hits(&hits);

    println!("🔍 Hybrid search: 'software' within the technology sector\n");
    let hits = store
        .query(
            QueryRequest::semantic("software")
                .in_collection("profiles")
                .with_filter("metadata.sector = 'technology'"),
        )
        .await?;
    print_hits(&hits);

    println!("🔍 Predicate scan: text LIKE '%oil%'\n");
    let hits = store
        .query(QueryRequest::predicate("text LIKE '%oil%'").in_collection("profiles"))
        .await?;
    print_hits(&hits);

    let _ = fs::remove_dir_all(data_path);
    println!("✨ Done! semstore is working correctly.");
    Ok(())
}

fn print_hits(hits: &[QueryHit]) {
    println!("{:-<60}", "");
    for (rank, hit) in hits.iter().enumerate() {
        let symbol = hit
            .metadata
            .as_ref()
            .and_then(|m| m.get_str("symbol"))
            .unwrap_or("?");
        match hit.score {
            Some(score) => println!("  {}. [{}] {} (distance: {:.4})", rank + 1, symbol, hit.text.as_deref().unwrap_or(""), score),
            None => println!("  {}. [{}] {}", rank + 1, symbol, hit.text.as_deref().unwrap_or("")),
        }
    }
    println!("{:-<60}\n", "");
}
