use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_research_core::stores::lightrag::DEFAULT_ENDPOINT;
use pdf_research_core::{
    list_indexed, resolve_mode, resolve_paths, stats, AnyIndex, Backend, ConfigStore,
    Configuration, EnvDefaults, IndexError, IndexReport, Indexer, Interrupt, LopdfExtractor,
    PreconditionError, QueryError, QueryRouter, ResolvedPaths, SearchMode, StorageStats,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";
const LISTED_DOCUMENTS: usize = 10;
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser)]
#[command(
    name = "pdf-research",
    version,
    about = "Index a folder of PDFs once, then search it in naive, local, global or hybrid mode"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Semantic index backend: lightrag (HTTP server) or local (offline store).
    #[arg(long, global = true, env = "PDF_RESEARCH_BACKEND", default_value = "lightrag")]
    backend: Backend,

    /// LightRAG server URL
    #[arg(long, global = true, env = "LIGHTRAG_URL", default_value = DEFAULT_ENDPOINT)]
    lightrag_url: String,

    /// Hide progress animation and decorative output.
    #[arg(long, short, global = true, default_value_t = false)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Index PDFs that are not in the storage yet.
    Index {
        /// Directory containing PDFs.
        pdf_dir: Option<PathBuf>,
        /// Storage directory for the index.
        #[arg(long, short)]
        storage: Option<PathBuf>,
    },
    /// Search indexed PDFs; omit the query for an interactive session.
    Search {
        /// Search query words.
        query: Vec<String>,
        /// Search mode: naive, local, global or hybrid.
        #[arg(long, short)]
        mode: Option<String>,
        /// Storage directory.
        #[arg(long, short)]
        storage: Option<PathBuf>,
    },
    /// Show configuration and storage statistics.
    Status {
        /// Storage directory.
        #[arg(long, short)]
        storage: Option<PathBuf>,
    },
    /// Configure default settings.
    Config {
        /// Default PDF directory.
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
        /// Default storage directory.
        #[arg(long)]
        storage_dir: Option<PathBuf>,
        /// Default search mode.
        #[arg(long)]
        mode: Option<String>,
        /// Index new PDFs automatically before searching.
        #[arg(long, value_name = "BOOL")]
        auto_index: Option<bool>,
    },
}

struct App {
    backend: Backend,
    lightrag_url: String,
    quiet: bool,
    store: ConfigStore,
    config: Configuration,
    interrupt: Interrupt,
}

impl App {
    fn paths(&self, pdf_dir: Option<&Path>, storage: Option<&Path>) -> ResolvedPaths {
        resolve_paths(
            pdf_dir,
            storage,
            &self.config,
            &EnvDefaults::from_env(),
            &self.store.fallback_storage_dir(),
        )
    }

    fn open_index(&self, storage_dir: &Path) -> anyhow::Result<AnyIndex> {
        AnyIndex::open(self.backend, storage_dir, &self.lightrag_url)
            .with_context(|| format!("unable to open the {} backend", self.backend))
    }

    fn indexer(&self, show_progress: bool) -> Indexer<LopdfExtractor> {
        Indexer::new(LopdfExtractor)
            .show_progress(show_progress && !self.quiet)
            .with_interrupt(self.interrupt.clone())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let interrupt = Interrupt::new();
    interrupt.listen_for_ctrl_c();

    let store = ConfigStore::default_location();
    let config = store.load();
    info!(
        version = app_version,
        backend = %cli.backend,
        config = %store.path().display(),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-research boot"
    );

    let ctx = App {
        backend: cli.backend,
        lightrag_url: cli.lightrag_url,
        quiet: cli.quiet,
        store,
        config,
        interrupt: interrupt.clone(),
    };

    let code = match run(ctx, cli.command).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    };

    if interrupt.is_triggered() {
        // A pending stdin read would otherwise hold runtime shutdown.
        std::process::exit(i32::from(INTERRUPTED_EXIT));
    }
    code
}

async fn run(mut ctx: App, command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Index { pdf_dir, storage } => {
            cmd_index(&mut ctx, pdf_dir.as_deref(), storage.as_deref()).await
        }
        Command::Search {
            query,
            mode,
            storage,
        } => cmd_search(&mut ctx, &query, mode.as_deref(), storage.as_deref()).await,
        Command::Status { storage } => Ok(cmd_status(&ctx, storage.as_deref())),
        Command::Config {
            pdf_dir,
            storage_dir,
            mode,
            auto_index,
        } => cmd_config(
            &mut ctx,
            pdf_dir.as_deref(),
            storage_dir.as_deref(),
            mode.as_deref(),
            auto_index,
        ),
    }
}

async fn cmd_index(
    ctx: &mut App,
    pdf_dir: Option<&Path>,
    storage: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let paths = ctx.paths(pdf_dir, storage);
    let Some(pdf_dir) = paths.pdf_dir else {
        return Ok(precondition_failure(&PreconditionError::PdfDirNotSet));
    };
    let storage_dir = paths.storage_dir;

    if !ctx.quiet {
        println!("{RULE}\n  PDF Indexing\n{RULE}");
        println!("PDF Directory: {}", pdf_dir.display());
        println!("Storage Directory: {}", storage_dir.display());
        println!("Backend: {}", ctx.backend);
        println!("{THIN_RULE}");
    }

    let service = ctx.open_index(&storage_dir)?;
    let report = match ctx.indexer(true).index(&pdf_dir, &storage_dir, &service).await {
        Ok(report) => report,
        Err(IndexError::Precondition(error)) => return Ok(precondition_failure(&error)),
        Err(error) => return Err(error.into()),
    };

    print_index_report(&report);
    print_storage_stats(&stats(&storage_dir));
    if !ctx.quiet {
        println!("{RULE}");
    }

    ctx.config.remember_paths(&pdf_dir, &storage_dir);
    ctx.store
        .save(&ctx.config)
        .context("unable to record the paths used")?;

    if report.interrupted {
        return Ok(ExitCode::from(INTERRUPTED_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_search(
    ctx: &mut App,
    query: &[String],
    mode: Option<&str>,
    storage: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let mode = match resolve_mode(mode, &ctx.config) {
        Ok(mode) => mode,
        Err(error) => return Ok(query_failure(&QueryError::from(error))),
    };

    let paths = ctx.paths(None, storage);
    let service = ctx.open_index(&paths.storage_dir)?;

    if ctx.config.auto_index {
        if let Some(pdf_dir) = paths.pdf_dir.clone().filter(|dir| dir.is_dir()) {
            match ctx.indexer(false).index(&pdf_dir, &paths.storage_dir, &service).await {
                Ok(report) => {
                    if report.pending > 0 && !ctx.quiet {
                        println!(
                            "Auto-indexed {} new document(s), {} failed.",
                            report.succeeded,
                            report.failed_count()
                        );
                    }
                    ctx.config.remember_paths(&pdf_dir, &paths.storage_dir);
                    ctx.store
                        .save(&ctx.config)
                        .context("unable to record the paths used")?;
                }
                Err(IndexError::Precondition(error)) => return Ok(precondition_failure(&error)),
                Err(error) => return Err(error.into()),
            }
        }
    }

    let router = QueryRouter::new(service, paths.storage_dir.clone());
    let text = query.join(" ");

    if !text.trim().is_empty() {
        return match router.query(&text, mode.as_str()).await {
            Ok(answer) => {
                println!("{answer}");
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => Ok(query_failure(&error)),
        };
    }

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    match router
        .session(mode, input, &mut stdout, &ctx.interrupt)
        .await
    {
        Ok(summary) => {
            info!(
                answered = summary.answered,
                failed = summary.failed,
                "interactive search finished"
            );
            println!("\nGoodbye!");
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => Ok(query_failure(&error)),
    }
}

fn cmd_status(ctx: &App, storage: Option<&Path>) -> ExitCode {
    let paths = ctx.paths(None, storage);

    println!("{RULE}\n  PDF Research Status\n{RULE}");
    println!("\nConfiguration:");
    print_configuration(&ctx.config, &paths.storage_dir.display().to_string());
    println!("  Backend: {}", ctx.backend);

    if !paths.storage_dir.is_dir() {
        println!("\nStorage Status: Not initialized");
        return precondition_failure(&PreconditionError::MissingStorage(paths.storage_dir));
    }

    print_storage_stats(&stats(&paths.storage_dir));

    let documents = list_indexed(&paths.storage_dir);
    if !documents.is_empty() {
        println!("\nIndexed Documents:");
        for name in documents.iter().take(LISTED_DOCUMENTS) {
            println!("  - {name}");
        }
        if documents.len() > LISTED_DOCUMENTS {
            println!("  ... and {} more", documents.len() - LISTED_DOCUMENTS);
        }
    }
    println!("{RULE}");
    ExitCode::SUCCESS
}

fn cmd_config(
    ctx: &mut App,
    pdf_dir: Option<&Path>,
    storage_dir: Option<&Path>,
    mode: Option<&str>,
    auto_index: Option<bool>,
) -> anyhow::Result<ExitCode> {
    if let Some(mode) = mode {
        match mode.parse::<SearchMode>() {
            Ok(mode) => ctx.config.search_mode = mode,
            Err(error) => return Ok(query_failure(&QueryError::from(error))),
        }
    }
    if let Some(pdf_dir) = pdf_dir {
        ctx.config.pdf_dir = absolutize_display(pdf_dir);
    }
    if let Some(storage_dir) = storage_dir {
        ctx.config.storage_dir = absolutize_display(storage_dir);
    }
    if let Some(auto_index) = auto_index {
        ctx.config.auto_index = auto_index;
    }

    ctx.store.save(&ctx.config).context("unable to save configuration")?;
    println!("Configuration saved to {}", ctx.store.path().display());

    println!("\nCurrent Configuration:");
    let storage = if ctx.config.storage_dir.is_empty() {
        "(not set)".to_string()
    } else {
        ctx.config.storage_dir.clone()
    };
    print_configuration(&ctx.config, &storage);
    Ok(ExitCode::SUCCESS)
}

fn absolutize_display(path: &Path) -> String {
    pdf_research_core::config::absolutize(path)
        .to_string_lossy()
        .into_owned()
}

fn print_configuration(config: &Configuration, storage: &str) {
    let pdf_dir = if config.pdf_dir.is_empty() {
        "(not set)"
    } else {
        config.pdf_dir.as_str()
    };
    println!("  PDF Directory: {pdf_dir}");
    println!("  Storage Directory: {storage}");
    println!("  Search Mode: {}", config.search_mode);
    println!("  Auto Index: {}", config.auto_index);
}

fn print_index_report(report: &IndexReport) {
    if report.pending == 0 {
        return;
    }

    println!("{THIN_RULE}");
    if report.interrupted {
        println!("Indexing Interrupted!");
    } else {
        println!("Indexing Complete!");
    }
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed: {}", report.failed_count());
    println!("  Total Indexed: {}", report.total_indexed());
    for failed in &report.failed {
        println!("    - {}: {}", failed.name, failed.reason);
    }
}

fn print_storage_stats(stats: &StorageStats) {
    println!("\nStorage Status:");
    println!("  Documents: {}", stats.document_count);
    println!("  Chunks: {}", stats.chunk_count);
    println!("  Entities: {}", stats.entity_count);
    println!("  Size: {:.2} MB", stats.storage_size_mb());
}

fn precondition_failure(error: &PreconditionError) -> ExitCode {
    eprintln!("Error: {error}");
    match error {
        PreconditionError::MissingCredential { .. } => {
            eprintln!("Or run against the offline store with: --backend local");
        }
        PreconditionError::PdfDirNotSet => {
            eprintln!("Use: pdf-research index <pdf_dir>");
            eprintln!("Or configure with: pdf-research config --pdf-dir <path>");
        }
        PreconditionError::MissingPdfDir(_) => {}
        PreconditionError::MissingStorage(_) => {
            eprintln!("Run indexing first: pdf-research index <pdf_dir>");
        }
    }
    warn!(%error, "precondition failed");
    ExitCode::FAILURE
}

fn query_failure(error: &QueryError) -> ExitCode {
    match error {
        QueryError::Precondition(error) => precondition_failure(error),
        other => {
            eprintln!("Error: {other}");
            ExitCode::FAILURE
        }
    }
}
