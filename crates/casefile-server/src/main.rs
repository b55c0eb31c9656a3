//! Casefile — document investigation server and CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod routes;
mod state;
pub mod validate;

use casefile_core::CasefileConfig;
use casefile_runtime::{Orchestrator, RebuildTarget};
use casefile_store::SqliteStore;
use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("CASEFILE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn open_orchestrator(config: &CasefileConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let store = SqliteStore::open(&config.data_paths.db)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    Ok(Arc::new(Orchestrator::new(
        Arc::new(store),
        config.analysis.clone(),
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "serve" => {}
            "--validate" | "validate" => {
                let data_dir = if args.len() > 2 {
                    PathBuf::from(&args[2])
                } else {
                    resolve_data_dir()
                };
                let report = validate::validate(&data_dir);
                validate::print_report(&report);
                std::process::exit(if report.db_valid { 0 } else { 1 });
            }
            "rebuild" => {
                let target = match args.get(2) {
                    Some(raw) => match RebuildTarget::parse(raw) {
                        Some(t) => t,
                        None => {
                            eprintln!(
                                "Unknown rebuild target: {}. Expected cooccurrences, timeline, clusters or all.",
                                raw
                            );
                            std::process::exit(1);
                        }
                    },
                    None => RebuildTarget::All,
                };
                let config = CasefileConfig::from_env(resolve_data_dir())?;
                let orchestrator = open_orchestrator(&config)?;
                let report = orchestrator.rebuild(target)?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            "ingest" => {
                if args.len() < 3 {
                    eprintln!("Usage: casefile ingest <path>...");
                    std::process::exit(1);
                }
                let config = CasefileConfig::from_env(resolve_data_dir())?;
                let orchestrator = open_orchestrator(&config)?;
                let failures = run_ingest(&orchestrator, &args[2..]);
                std::process::exit(if failures == 0 { 0 } else { 1 });
            }
            "--help" | "-h" | "help" => {
                println!("Casefile — document investigation server");
                println!();
                println!("Usage: casefile [command]");
                println!();
                println!("Commands:");
                println!("  (none) | serve           Start the server");
                println!("  rebuild [target]         Rebuild derived tables (cooccurrences, timeline, clusters, all)");
                println!("  ingest <path>...         Ingest files or directories");
                println!("  validate [data-dir]      Validate an existing database");
                println!("  help                     Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'casefile help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    // Normal server startup
    let data_dir = resolve_data_dir();

    info!("Data directory: {}", data_dir.display());

    let config = CasefileConfig::from_env(&data_dir)?;
    let port = config.port;
    let orchestrator = open_orchestrator(&config)?;

    let state = Arc::new(AppState::new(config, orchestrator));
    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Casefile server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Ingest every file under the given paths. Returns the number of failures.
fn run_ingest(orchestrator: &Orchestrator, paths: &[String]) -> usize {
    let mut files = Vec::new();
    for raw in paths {
        collect_files(Path::new(raw), &mut files);
    }

    let (mut ingested, mut skipped, mut failures) = (0usize, 0usize, 0usize);
    for path in &files {
        match orchestrator.ingest_file(path) {
            Ok(Some(outcome)) => {
                ingested += 1;
                println!(
                    "{}: doc {} ({} mentions, {} entities)",
                    path.display(),
                    outcome.doc_id,
                    outcome.mentions,
                    outcome.entities
                );
            }
            Ok(None) => {
                skipped += 1;
                println!("{}: skipped (no readable text)", path.display());
            }
            Err(casefile_core::Error::DuplicateContent(_)) => {
                skipped += 1;
                println!("{}: skipped (duplicate content)", path.display());
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }
    println!();
    println!(
        "Ingested {}, skipped {}, failed {} (of {} files)",
        ingested,
        skipped,
        failures,
        files.len()
    );
    failures
}

fn collect_files(path: &Path, out: &mut Vec<PathBuf>) {
    if path.is_file() {
        out.push(path.to_path_buf());
        return;
    }
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            return;
        }
    };
    let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    children.sort();
    for child in children {
        let hidden = child
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if !hidden {
            collect_files(&child, out);
        }
    }
}
