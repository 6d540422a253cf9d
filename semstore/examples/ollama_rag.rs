//! Ollama RAG Example - Semantic search with local LLM embeddings
//!
//! This example demonstrates a retrieval pipeline using:
//! - Ollama for embedding generation (nomic-embed-text model)
//! - semstore for storage and semantic search
//!
//! Prerequisites:
//! 1. Install Ollama: https://ollama.ai
//! 2. Pull the embedding model: ollama pull nomic-embed-text
//! 3. Run with: cargo run --example ollama_rag

use semstore::prelude::*;
use semstore::RemoteEmbedderConfig;
use std::fs;

const EMBED_MODEL: &str = "nomic-embed-text";
const EMBED_DIM: usize = 768;

#[tokio::main]
async fn main() -> Result<()> {
    println!("🦙 Ollama RAG Example with semstore\n");

    let data_path = "./ollama_rag_data";
    let _ = fs::remove_dir_all(data_path);

    let embedder = EmbedderConfig::Remote(RemoteEmbedderConfig::ollama(EMBED_MODEL, EMBED_DIM));
    let store = Store::open(StoreConfig::new(data_path).with_embedder(embedder)).await?;

    let documents = [
        "Rust is a systems programming language focused on safety and performance.",
        "Python is popular for machine learning and data science applications.",
        "JavaScript runs in web browsers and powers interactive websites.",
        "Vector databases store embeddings for semantic similarity search.",
        "semstore keeps documents, embeddings and metadata in durable collections.",
    ];

    println!("📚 Writing {} documents...", documents.len());
    for (i, text) in documents.iter().enumerate() {
        let metadata = Metadata::new().with_field("doc_id", format!("doc{}", i + 1));
        match store.write("knowledge", NewDocument::new(*text).with_metadata(metadata)).await {
            Ok(id) => println!("   ✅ {}", id),
            Err(e) if e.is_transient() => {
                println!("   ❌ Error: {}", e);
                println!("\n⚠️  Make sure Ollama is running: ollama serve");
                println!("⚠️  And the model is pulled: ollama pull {}", EMBED_MODEL);
                let _ = fs::remove_dir_all(data_path);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }

    println!("\n🔍 Semantic Search Demo\n");
    let queries = [
        "What is a good language for building fast software?",
        "How do I build a website?",
        "Tell me about AI databases",
    ];

    for query in queries {
        println!("Query: \"{}\"", query);
        let hits = store
            .query(QueryRequest::semantic(query).in_collection("knowledge").with_limit(2))
            .await?;
        for (i, hit) in hits.iter().enumerate() {
            println!(
                "  {}. {} (similarity: {:.3})",
                i + 1,
                hit.text.as_deref().unwrap_or("?"),
                1.0 - hit.score.unwrap_or(1.0) // Cosine distance to similarity
            );
        }
        println!();
    }

    let _ = fs::remove_dir_all(data_path);
    println!("✨ RAG demo complete!");
    Ok(())
}
