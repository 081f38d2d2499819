use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsift::source::{self, SourceFormat};
use docsift::{api, BatchIndexer, Config, Error, IndexStore, Searcher};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

// CLI Arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Full-text search over extracted documents", long_about = None)]
struct Args {
    /// Index directory (overrides the config file)
    #[arg(short, long, global = true)]
    index: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add the documents of a source file to the index, creating it if needed
    Index {
        #[arg(short, long)]
        source: PathBuf,

        /// jsonl or wiki
        #[arg(short, long, default_value = "jsonl")]
        format: SourceFormat,

        /// Replace the whole index instead of merging into it
        #[arg(long)]
        rebuild: bool,
    },

    /// Run a query against an existing index
    Search {
        query: String,

        /// Maximum number of results (0 = all)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Serve the search API; builds the index from `--source` while it is empty
    Serve {
        #[arg(short, long)]
        source: Option<PathBuf>,

        #[arg(short, long, default_value = "jsonl")]
        format: SourceFormat,

        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

fn build(store: &IndexStore, source: &Path, format: SourceFormat, rebuild: bool) -> Result<()> {
    let documents = source::open(source, format)
        .with_context(|| format!("Failed to open source {}", source.display()))?;

    let indexer = BatchIndexer::new(store);
    let report = if rebuild {
        indexer.rebuild(documents)
    } else {
        indexer.index(documents)
    }
    .context("Indexing failed; the index was left unchanged")?;

    println!(
        "Indexed {} documents ({} replaced, {} terms) in {:?}",
        report.documents, report.replaced, report.terms, report.elapsed
    );
    Ok(())
}

fn run_index(config: &Config, source: &Path, format: SourceFormat, rebuild: bool) -> Result<()> {
    let (store, created) = IndexStore::open_or_create(&config.index_path, config.analyzer)
        .with_context(|| format!("Failed to open index {}", config.index_path.display()))?;
    if created {
        println!("Created new index at {}", config.index_path.display());
    }

    build(&store, source, format, rebuild)
}

fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let store = match IndexStore::open(&config.index_path) {
        Ok(store) => store,
        Err(Error::IndexNotFound(path)) => {
            anyhow::bail!("No index at {}; run `docsift index` first", path.display())
        }
        Err(err) => return Err(err).context("Failed to open index"),
    };
    let searcher = Searcher::new(Arc::new(store), config.search_settings());

    let results = searcher.search_results(query, limit)?;
    println!("Search found {} documents", results.len());
    println!();

    for (i, result) in results.iter().enumerate() {
        println!("{}. [Score: {:.4}] {}", i + 1, result.score, result.title);
        println!("   URL: {}", result.url);
        println!("   {}", result.snippet);
    }

    Ok(())
}

async fn serve(config: Config, source: Option<PathBuf>, format: SourceFormat) -> Result<()> {
    let (store, created) = IndexStore::open_or_create(&config.index_path, config.analyzer)
        .with_context(|| format!("Failed to open index {}", config.index_path.display()))?;

    // An empty index is built too, so a failed first build is retried on restart.
    let needs_build = created || store.is_empty()?;
    match (&source, needs_build) {
        (Some(source), true) => build(&store, source, format, false)?,
        (None, true) => tracing::warn!("index is empty; pass --source to build it"),
        (Some(_), false) => tracing::info!("index already built, ignoring --source"),
        (None, false) => {}
    }

    let searcher = Arc::new(Searcher::new(Arc::new(store), config.search_settings()));
    let app = api::create_router(searcher, config.default_limit);

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    tracing::info!(addr = %config.listen, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(index) = args.index {
        config.index_path = index;
    }

    match args.command {
        Command::Index {
            source,
            format,
            rebuild,
        } => run_index(&config, &source, format, rebuild),
        Command::Search { query, limit } => {
            run_search(&config, &query, limit.unwrap_or(config.default_limit))
        }
        Command::Serve {
            source,
            format,
            listen,
        } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }
            serve(config, source, format).await
        }
    }
}
