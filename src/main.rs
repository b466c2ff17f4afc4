//! # Dependency Advisor CLI (`depad`)
//!
//! The `depad` binary is the primary interface for Dependency Advisor. It
//! provides commands for database initialization, project ingestion,
//! question answering, raw retrieval, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! depad --config ./config/depad.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `depad init` | Write a default config and create the SQLite database |
//! | `depad ingest <path>` | Scan and index the project at `<path>` |
//! | `depad ask <project> "<query>"` | Ask one question about a project |
//! | `depad chat <project>` | Interactive session holding conversation state |
//! | `depad search <project> "<query>"` | Raw retrieval view (no completion) |
//! | `depad projects` | List ingested projects |
//! | `depad stats [project]` | Database statistics |
//! | `depad delete <project>` | Remove a project and its index data |
//! | `depad reembed` | Re-embed all chunks under the active model |
//! | `depad serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize config and database
//! depad init
//!
//! # Index a React project
//! depad ingest ~/work/storefront
//!
//! # One-shot question
//! depad ask 3f9a1c2b7d04 "remove redux, what should I check?"
//!
//! # Interactive follow-ups in one session
//! depad chat 3f9a1c2b7d04
//!
//! # Start the HTTP server for editor integrations
//! depad serve
//! ```

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use dep_advisor::advisor::Advisor;
use dep_advisor::config::{self, Config};
use dep_advisor::models::AskResponse;
use dep_advisor::{migrate, server, stats};

/// Dependency Advisor CLI — retrieval-augmented answers about the libraries
/// in your project.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; `depad init` writes a commented default.
#[derive(Parser)]
#[command(
    name = "depad",
    about = "Dependency Advisor — retrieval-augmented answers about the libraries in your project",
    version,
    long_about = "Dependency Advisor scans a project tree (React, Vue, or .NET), indexes its files \
    for semantic and keyword retrieval, and answers dependency questions by combining retrieved \
    code with targeted analysis functions (reference finding, compatibility checks, upgrade \
    suggestions), exposed via a CLI and a JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/depad.toml`. All storage, embedding, completion,
    /// and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/depad.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and initialize the database schema.
    ///
    /// Creates the config file at `--config` (unless it already exists),
    /// then creates the SQLite database and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Scan and index a project.
    ///
    /// Walks the project tree, detects the framework, extracts declared
    /// dependencies, chunks every classified file, and (when an embedding
    /// provider is configured) embeds the chunks. Re-running on the same
    /// path replaces the previous ingestion wholesale.
    Ingest {
        /// Project root directory.
        path: PathBuf,
    },

    /// Ask one question about an ingested project.
    ///
    /// Runs the full pipeline: retrieval, analysis functions, and answer
    /// composition. Prints the answer followed by its sources.
    Ask {
        /// Project id (as printed by `ingest` and `projects`).
        project: String,

        /// The question.
        query: String,
    },

    /// Interactive question-and-answer session.
    ///
    /// Like `ask`, but holds one conversation session so follow-up
    /// questions see recent turns. Type `exit` or press Ctrl-D to quit.
    Chat {
        /// Project id (as printed by `ingest` and `projects`).
        project: String,
    },

    /// Raw retrieval view: ranked chunks without answer composition.
    ///
    /// Useful for inspecting what the pipeline would ground an answer on.
    Search {
        /// Project id (as printed by `ingest` and `projects`).
        project: String,

        /// The search query string.
        query: String,

        /// Use keyword (FTS5) matching instead of semantic similarity.
        #[arg(long)]
        keyword: bool,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List ingested projects.
    Projects,

    /// Database statistics, optionally narrowed to one project.
    Stats {
        /// Project id to narrow to.
        project: Option<String>,
    },

    /// Remove a project and all its indexed data.
    Delete {
        /// Project id (as printed by `ingest` and `projects`).
        project: String,
    },

    /// Re-embed every stored chunk under the configured embedding model.
    ///
    /// Use after switching embedding models: search refuses to compare
    /// vectors produced by a different model until this has run.
    Reembed,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// JSON API (`/health`, `/projects`, `/ask`).
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // `init` runs before config loading so it can create the config file.
    if let Commands::Init = cli.command {
        if cli.config.exists() {
            println!("Config already exists at {}", cli.config.display());
        } else {
            if let Some(parent) = cli.config.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&cli.config, config::DEFAULT_CONFIG)?;
            println!("Wrote default config to {}", cli.config.display());
        }
        let cfg = config::load_config(&cli.config)?;
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { path } => {
            run_ingest(&cfg, &path).await?;
        }
        Commands::Ask { project, query } => {
            run_ask(&cfg, &project, &query).await?;
        }
        Commands::Chat { project } => {
            run_chat(&cfg, &project).await?;
        }
        Commands::Search {
            project,
            query,
            keyword,
            limit,
        } => {
            run_search(&cfg, &project, &query, keyword, limit).await?;
        }
        Commands::Projects => {
            run_projects(&cfg).await?;
        }
        Commands::Stats { project } => {
            stats::run_stats(&cfg, project.as_deref()).await?;
        }
        Commands::Delete { project } => {
            run_delete(&cfg, &project).await?;
        }
        Commands::Reembed => {
            run_reembed(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let advisor = Advisor::open(cfg.clone()).await?;
    let report = advisor.ingest_project(path).await?;

    println!("Ingested project {}", report.project_id);
    println!("  framework: {}", report.framework);
    println!("  files:     {}", report.files);
    println!("  chunks:    {}", report.chunks);
    println!(
        "  embedded:  {}",
        if report.embedded { "yes" } else { "no (keyword-only)" }
    );
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

async fn run_ask(cfg: &Config, project: &str, query: &str) -> anyhow::Result<()> {
    let advisor = Advisor::open(cfg.clone()).await?;
    let response = advisor.ask(None, project, query).await?;
    print_response(&response);
    Ok(())
}

async fn run_chat(cfg: &Config, project: &str) -> anyhow::Result<()> {
    let advisor = Advisor::open(cfg.clone()).await?;
    let profile = advisor
        .get_project(project)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Project not found: {}", project))?;

    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!(
            "Chatting about {} ({} project). Type a question, or 'exit' to quit.",
            profile.project_id,
            profile.detected_framework.as_str()
        );
    }

    let stdin = std::io::stdin();
    let mut session_id: Option<String> = None;
    let mut line = String::new();
    loop {
        if interactive {
            print!("you> ");
            std::io::stdout().flush()?;
        }
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            break;
        }

        match advisor.ask(session_id.as_deref(), project, query).await {
            Ok(response) => {
                session_id = Some(response.session_id.clone());
                println!();
                print_response(&response);
                println!();
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

async fn run_search(
    cfg: &Config,
    project: &str,
    query: &str,
    keyword: bool,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let advisor = Advisor::open(cfg.clone()).await?;
    let results = advisor.search(project, query, limit, keyword).await?;

    if results.is_empty() {
        println!("No results for \"{}\".", query);
        return Ok(());
    }
    println!("Found {} result(s) for \"{}\":", results.len(), query);
    for result in &results {
        println!(
            "  {}. {}  score {:.3}",
            result.rank, result.source_file, result.similarity_score
        );
        if !result.snippet.is_empty() {
            println!("     {}", result.snippet.replace('\n', " "));
        }
    }
    Ok(())
}

async fn run_projects(cfg: &Config) -> anyhow::Result<()> {
    let advisor = Advisor::open(cfg.clone()).await?;
    let projects = advisor.list_projects().await?;

    if projects.is_empty() {
        println!("No projects ingested yet. Run `depad ingest <path>` first.");
        return Ok(());
    }
    println!(
        "{:<14} {:<10} {:>6}  {:<18} {}",
        "PROJECT", "FRAMEWORK", "DEPS", "INGESTED", "ROOT"
    );
    for p in &projects {
        println!(
            "{:<14} {:<10} {:>6}  {:<18} {}",
            p.project_id,
            p.detected_framework.as_str(),
            p.dependencies.len(),
            p.created_at.format("%Y-%m-%d %H:%M"),
            p.root_path
        );
    }
    Ok(())
}

async fn run_delete(cfg: &Config, project: &str) -> anyhow::Result<()> {
    let advisor = Advisor::open(cfg.clone()).await?;
    if advisor.delete_project(project).await? {
        println!("Deleted project {}.", project);
        Ok(())
    } else {
        anyhow::bail!("Project not found: {}", project)
    }
}

async fn run_reembed(cfg: &Config) -> anyhow::Result<()> {
    let advisor = Advisor::open(cfg.clone()).await?;
    let report = advisor.reembed().await?;
    println!(
        "Re-embedded {} chunk(s) across {} project(s).",
        report.chunks, report.projects
    );
    Ok(())
}

/// Print one answer: the text, then where it came from.
fn print_response(response: &AskResponse) {
    println!("{}", response.answer_text);

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for s in &response.sources {
            println!(
                "  {}. {}  score {:.3}",
                s.rank, s.source_file, s.similarity_score
            );
        }
    }

    if !response.function_calls.is_empty() {
        println!();
        println!("Functions:");
        for call in &response.function_calls {
            let status = if call.success {
                "ok".to_string()
            } else {
                format!(
                    "failed: {}",
                    call.error_message.as_deref().unwrap_or("unknown error")
                )
            };
            println!("  {} — {}", call.function_name, status);
        }
    }

    let mut notes = Vec::new();
    if response.flags.retrieval_skipped {
        notes.push("retrieval skipped");
    }
    if response.flags.keyword_fallback {
        notes.push("keyword retrieval");
    }
    if response.flags.completion_fallback {
        notes.push("extractive answer");
    }
    println!();
    if notes.is_empty() {
        println!("confidence {:.2}", response.confidence);
    } else {
        println!(
            "confidence {:.2} ({})",
            response.confidence,
            notes.join(", ")
        );
    }
}
