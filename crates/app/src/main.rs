use clap::{Parser, Subcommand};
use chrono::Utc;
use legal_rag_core::{
    discover_pdf_files, document_id_for_path, load_config, Document, Engine, EngineConfig,
    IndexReport, QueryResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter, prelude::*};

const DEFAULT_INDEX_PATH: &str = "legal-rag-index.json";

#[derive(Parser)]
#[command(name = "legal-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML config file
    #[arg(long, env = "LEGAL_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Index snapshot file; overrides `[index].path`
    #[arg(long)]
    index_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one PDF or every PDF under a folder.
    Ingest {
        /// Single PDF file.
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Number of PDFs ingested in parallel.
        #[arg(long, default_value = "4")]
        workers: usize,
    },
    /// Answer a question with citations to the indexed documents.
    Query {
        /// Question text
        #[arg(long)]
        text: String,
        /// Number of passages to retrieve; defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Remove a document's units from the index.
    Remove {
        #[arg(long)]
        document_id: String,
    },
    /// Print index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), cli.index_path)?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index = ?config.index.path,
        "legal-rag boot"
    );

    let engine = Arc::new(tokio::task::spawn_blocking(move || Engine::from_config(&config)).await??);

    match cli.command {
        Command::Ingest {
            file,
            folder,
            workers,
        } => {
            let files = match (file, folder) {
                (Some(file), _) => vec![file],
                (None, Some(folder)) => discover_pdf_files(&folder),
                (None, None) => anyhow::bail!("either --file or --folder is required"),
            };
            if files.is_empty() {
                println!("0 documents ingested (no pdf files found)");
                return Ok(());
            }

            let (reports, failed) = ingest_files(&engine, files, workers.max(1)).await?;

            let engine_for_persist = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || engine_for_persist.persist()).await??;

            let chunks = reports.iter().map(|report| report.chunks_indexed).sum::<usize>();
            println!(
                "{} documents ingested ({} chunks, {} failed) at {}",
                reports.len(),
                chunks,
                failed,
                Utc::now().to_rfc3339()
            );
            for report in &reports {
                println!(
                    "  document_id={} chunks={} pages={} empty_pages={}",
                    report.document_id, report.chunks_indexed, report.pages, report.empty_pages
                );
            }
        }
        Command::Query { text, top_k, json } => {
            let worker = Arc::clone(&engine);
            let result = tokio::task::spawn_blocking(move || match top_k {
                Some(top_k) => worker.query_top(&text, top_k),
                None => worker.query(&text),
            })
            .await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Command::Remove { document_id } => {
            let worker = Arc::clone(&engine);
            let removed = tokio::task::spawn_blocking(move || {
                let removed = worker.remove(&document_id);
                worker.persist().map(|_| removed)
            })
            .await??;
            println!("{removed} units removed");
        }
        Command::Stats => {
            let stats = engine.stats();
            println!(
                "entries={} documents={} dimensions={}",
                stats.entries, stats.documents, stats.dimensions
            );
        }
    }

    Ok(())
}

fn resolve_config(path: Option<&Path>, index_path: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    if let Some(index_path) = index_path {
        config.index.path = Some(index_path);
    }
    if config.index.path.is_none() {
        config.index.path = Some(PathBuf::from(DEFAULT_INDEX_PATH));
    }

    Ok(config)
}

/// Ingests `files` on blocking workers, `workers` at a time. Failures are
/// logged and counted; they do not stop the remaining files.
async fn ingest_files(
    engine: &Arc<Engine>,
    files: Vec<PathBuf>,
    workers: usize,
) -> anyhow::Result<(Vec<IndexReport>, usize)> {
    let mut reports = Vec::new();
    let mut failed = 0usize;

    for batch in files.chunks(workers) {
        let handles = batch
            .iter()
            .cloned()
            .map(|path| {
                let engine = Arc::clone(engine);
                tokio::task::spawn_blocking(move || {
                    let outcome = ingest_file(&engine, &path);
                    (path, outcome)
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let (path, outcome) = handle.await?;
            match outcome {
                Ok(report) => reports.push(report),
                Err(error) => {
                    failed += 1;
                    warn!(path = %path.display(), error = %error, "skipped pdf");
                }
            }
        }
    }

    Ok((reports, failed))
}

fn ingest_file(engine: &Engine, path: &Path) -> anyhow::Result<IndexReport> {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut document = Document::with_id(document_id_for_path(&canonical), name);
    let file = std::fs::File::open(path)?;
    Ok(engine.ingest(&mut document, file)?)
}

fn print_result(result: &QueryResult) {
    println!("query: {}", result.query);
    println!("answer: {}", result.answer);
    println!("confidence={:.2}", result.confidence);

    for citation in &result.citations {
        let pages = if citation.page == citation.page_end {
            format!("page {}", citation.page)
        } else {
            format!("pages {}-{}", citation.page, citation.page_end)
        };
        match &citation.section {
            Some(section) => println!(
                "[{}] {} {} {} score={:.4}",
                citation.marker, citation.document_name, section, pages, citation.score
            ),
            None => println!(
                "[{}] {} {} score={:.4}",
                citation.marker, citation.document_name, pages, citation.score
            ),
        }
        println!("  document_id={} unit={}", citation.document_id, citation.unit_id);
    }
}
