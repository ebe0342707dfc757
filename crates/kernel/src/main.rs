//! Custode kernel server and maintenance commands.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use custode_kernel::catalog::{ManifestSource, MetadataCatalog};
use custode_kernel::menu::MenuNode;
use custode_kernel::permissions::ReconcileReport;
use custode_kernel::{AppState, Config, routes};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Reconcile declared permissions into the role store and exit.
    SyncPermissions,
    /// Build the menu tree from plugin manifests and print it.
    CheckMenus {
        /// Manifest directory (default: METADATA_DIR or ./plugins).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::SyncPermissions => sync_permissions().await,
        Command::CheckMenus { dir } => check_menus(dir).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "custode failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<()> {
    info!("Starting custode kernel");

    let config = Config::from_env().context("failed to load configuration")?;
    info!(port = config.port, "Configuration loaded");

    let state = AppState::new(&config)
        .await
        .context("failed to initialize application state")?;

    let report = state.reconciler().sync_from_catalog(state.catalog()).await;
    log_report(&report);

    let app = routes::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn sync_permissions() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let state = AppState::new(&config)
        .await
        .context("failed to initialize application state")?;

    let report = state.reconciler().sync_from_catalog(state.catalog()).await;
    log_report(&report);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn check_menus(dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(Config::metadata_dir_from_env);
    let catalog = MetadataCatalog::load(Arc::new(ManifestSource::new(dir.clone())))
        .await
        .with_context(|| format!("menu metadata in {} is invalid", dir.display()))?;

    let snapshot = catalog.snapshot();
    info!(
        menus = snapshot.menus().len(),
        permissions = snapshot.permissions().len(),
        "menu metadata is consistent"
    );
    for node in snapshot.tree().iter() {
        print_node(node, 0);
    }
    Ok(())
}

fn print_node(node: &MenuNode, depth: usize) {
    println!("{}{} ({}) {}", "  ".repeat(depth), node.title, node.id, node.path);
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn log_report(report: &ReconcileReport) {
    info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        role_assignments = report.role_assignments,
        role_assignment_conflicts = report.role_assignment_conflicts,
        "permissions reconciled"
    );
    if report.role_assignment_failures > 0 || report.skipped > 0 {
        warn!(
            skipped = report.skipped,
            failures = report.role_assignment_failures,
            "permission reconciliation was incomplete"
        );
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
