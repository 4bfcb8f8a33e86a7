use clap::{Parser, Subcommand};
use foodgram::commands::load_fixtures;
use foodgram::db::{self, schema};
use foodgram::server::config::ServerConfig;
use foodgram::services::media_storage::MediaStorage;
use foodgram::version::VERSION;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load ingredients from a `name,measurement_unit` CSV file
    LoadIngredients { path: PathBuf },
    /// Load tags from a `name,slug` CSV file
    LoadTags { path: PathBuf },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sea_orm=warn` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal.");
        return;
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Manually check for --version before full parsing to keep the original simple output.
    if std::env::args().any(|arg| arg == "--version") {
        println!("Server version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    // Logging needs the configured log directory, so configuration errors go to stderr.
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting server, version: {}", VERSION);

    // --- Database Pool Setup ---
    let db_pool = db::connect(&server_config.database_url, server_config.max_connections).await?;
    schema::create_tables(&db_pool).await?;

    match args.command {
        Some(Command::LoadIngredients { path }) => {
            let summary = load_fixtures::load_ingredients(&db_pool, &path).await?;
            println!("Ingredients loaded: {} created, {} already present.", summary.created, summary.existing);
            return Ok(());
        }
        Some(Command::LoadTags { path }) => {
            let summary = load_fixtures::load_tags(&db_pool, &path).await?;
            println!("Tags loaded: {} created, {} already present.", summary.created, summary.existing);
            return Ok(());
        }
        None => {}
    }

    let media = MediaStorage::new(&server_config.media_dir);
    tokio::fs::create_dir_all(media.root()).await?;

    // --- Axum HTTP Server Setup ---
    let app = foodgram::web::create_axum_router(db_pool, server_config.clone(), media);

    let addr: SocketAddr = server_config.listen_addr.parse()?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_keepalive(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    info!(address = %addr, "HTTP server listening with TCP Keepalive");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Box::new)?;

    info!("Server stopped.");
    Ok(())
}
