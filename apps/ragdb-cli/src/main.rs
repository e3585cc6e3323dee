use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ragdb_core::chunker::chunk;
use ragdb_core::config::Config;
use ragdb_core::data_processor::DataProcessor;
use ragdb_hybrid::{QueryRequest, RetrievalCoordinator};

#[derive(Parser)]
#[command(name = "ragdb", about = "Hybrid vector + BM25 retrieval over local text files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the chunk boundaries of one text file
    Chunk {
        file: PathBuf,
        /// Chunk size in characters (overrides config)
        #[arg(long)]
        size: Option<usize>,
        /// Overlap in characters (overrides config)
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Ingest every .txt file under a directory and answer one question
    Ask {
        dir: PathBuf,
        question: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// 1.0 = pure vector, 0.0 = pure lexical
        #[arg(short, long)]
        alpha: Option<f32>,
        /// Drop results whose fused score is below this value
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Stop after this many files
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?.rag().context("loading configuration")?;

    match cli.command {
        Commands::Chunk { file, size, overlap } => {
            let doc = DataProcessor::new().load_file(&file)?;
            let size = size.unwrap_or(config.chunking.size);
            let overlap = overlap.unwrap_or(config.chunking.overlap);
            let chunks = chunk(&doc.id, &doc.text, size, overlap)?;
            println!("{} ({} chars): {} chunks", doc.filename, doc.text.chars().count(), chunks.len());
            for c in &chunks {
                let preview: String = c.text.chars().take(60).collect();
                println!("{:>5}  [{:>7}, {:>7})  {:?}", c.id.seq, c.start, c.end, preview);
            }
        }
        Commands::Ask { dir, question, top_k, alpha, threshold, limit, timeout_ms } => {
            let processor = DataProcessor::new();
            let docs = match limit {
                Some(n) => processor.load_directory_limited(&dir, n)?,
                None => processor.load_directory(&dir)?,
            };
            anyhow::ensure!(!docs.is_empty(), "no .txt files under {}", dir.display());

            let coordinator = RetrievalCoordinator::from_config(config).await?;
            let pb = ProgressBar::new(docs.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
                    .progress_chars("#>-"),
            );
            let mut failed = 0usize;
            for doc in docs {
                pb.set_message(doc.filename.clone());
                let id = doc.id.clone();
                if let Err(e) = coordinator.ingest(doc).await {
                    failed += 1;
                    pb.println(format!("skipped {id}: {e}"));
                }
                pb.inc(1);
            }
            pb.finish_with_message(format!("{} indexed, {failed} skipped", coordinator.documents().len()));

            let mut request = QueryRequest::new(question);
            request.top_k = top_k;
            request.alpha = alpha;
            request.similarity_threshold = threshold;
            request.timeout = timeout_ms.map(Duration::from_millis);
            let passages = coordinator.retrieve(&request).await?;
            if passages.is_empty() {
                println!("No passages matched.");
            }
            for p in &passages {
                println!(
                    "\n#{} {} [{}..{}]  fused={:.3} vector={:.3} lexical={:.3}",
                    p.rank, p.filename, p.start, p.end, p.result.fused_score, p.result.vector_score, p.result.lexical_score
                );
                println!("{}", p.text.trim());
            }
            coordinator.shutdown().await?;
        }
    }
    Ok(())
}
