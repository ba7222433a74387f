//! CLI binary for docx2pdf.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig`, then either serves HTTP or converts one
//! local file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docx2pdf::{
    router, BackendKind, CorsPolicy, Orchestrator, RendererKind, ServiceConfig, ValidationPolicy,
};
use engine_locate::Engine;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve POST /convertFile on port 3000 with LibreOffice
  docx2pdf

  # Serve without an office suite (built-in renderer)
  docx2pdf --backend structural serve --port 8080

  # Convert one file locally
  docx2pdf convert letter.docx -o letter.pdf

  # Check which engines this host has
  docx2pdf doctor

ENVIRONMENT VARIABLES:
  PORT                  Listen port (default 3000)
  HOST                  Listen address (default 0.0.0.0)
  CLIENT_URL            Browser origin allowed by CORS
  DOCX2PDF_WORK_DIR     Temporary working directory
  DOCX2PDF_MAX_BYTES    Upload size limit in bytes (default 10485760)
  DOCX2PDF_EXTENSIONS   Allowed extensions, comma separated (default .doc,.docx)
  DOCX2PDF_BACKEND      native | structural
  DOCX2PDF_RENDERER     builtin | chromium (structural backend only)
  DOCX2PDF_TIMEOUT      Per-conversion timeout in seconds (default 30)
  SOFFICE_PATH          Path to LibreOffice's soffice binary
  CHROMIUM_PATH         Path to a Chromium / Chrome binary
  RUST_LOG              Log filter, overrides --verbose / --quiet

A .env file in the working directory is loaded first.
"#;

/// Convert Word documents to PDF over HTTP or from the command line.
#[derive(Parser, Debug)]
#[command(
    name = "docx2pdf",
    version,
    about = "Convert Word documents to PDF over HTTP or from the command line",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Temporary working directory for uploads and outputs.
    #[arg(long, env = "DOCX2PDF_WORK_DIR", global = true)]
    work_dir: Option<PathBuf>,

    /// Maximum upload size in bytes.
    #[arg(long, env = "DOCX2PDF_MAX_BYTES", global = true,
          default_value_t = docx2pdf::validate::DEFAULT_MAX_BYTES)]
    max_bytes: u64,

    /// Allowed file extensions, comma separated.
    #[arg(long, env = "DOCX2PDF_EXTENSIONS", global = true,
          value_delimiter = ',', default_value = ".doc,.docx")]
    extensions: Vec<String>,

    /// Conversion backend: native (LibreOffice) or structural.
    #[arg(long, env = "DOCX2PDF_BACKEND", global = true, default_value = "native")]
    backend: BackendKind,

    /// Renderer for the structural backend: builtin or chromium.
    #[arg(long, env = "DOCX2PDF_RENDERER", global = true, default_value = "builtin")]
    renderer: RendererKind,

    /// Per-conversion timeout in seconds.
    #[arg(long, env = "DOCX2PDF_TIMEOUT", global = true, default_value_t = 30)]
    timeout: u64,

    /// Path to the soffice binary.
    #[arg(long, env = "SOFFICE_PATH", global = true)]
    soffice_path: Option<PathBuf>,

    /// Path to the Chromium binary.
    #[arg(long, env = "CHROMIUM_PATH", global = true)]
    chromium_path: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2PDF_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCX2PDF_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve POST /convertFile (default).
    Serve(ServeArgs),
    /// Convert one local file and exit.
    Convert {
        /// Word document to convert.
        input: PathBuf,
        /// Destination PDF. Default: next to the input, `.pdf` extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report which conversion engines are installed.
    Doctor,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Browser origin allowed by CORS, in addition to the local dev server.
    #[arg(long, env = "CLIENT_URL")]
    client_url: Option<String>,

    /// Allow any origin (no credentials).
    #[arg(long)]
    cors_any: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            client_url: std::env::var("CLIENT_URL").ok(),
            cors_any: false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // One-off conversions only report problems; the server logs requests.
    let serving = matches!(cli.command, None | Some(Command::Serve(_)));
    let filter = if cli.verbose {
        "docx2pdf=debug,engine_locate=debug,tower_http=debug"
    } else if cli.quiet {
        "error"
    } else if serving {
        "docx2pdf=info,tower_http=info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = build_config(&cli)?;
    let quiet = cli.quiet;

    match cli.command {
        None => serve(config, ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(config, args).await,
        Some(Command::Convert { input, output }) => convert(config, &input, output, quiet).await,
        Some(Command::Doctor) => {
            doctor(&config);
            Ok(())
        }
    }
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .policy(ValidationPolicy::new(&cli.extensions, cli.max_bytes))
        .backend(cli.backend)
        .renderer(cli.renderer)
        .conversion_timeout_secs(cli.timeout);

    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref path) = cli.soffice_path {
        builder = builder.soffice_path(path);
    }
    if let Some(ref path) = cli.chromium_path {
        builder = builder.chromium_path(path);
    }

    builder.build().context("Invalid configuration")
}

async fn serve(config: ServiceConfig, args: ServeArgs) -> Result<()> {
    let orchestrator = Orchestrator::new(&config).context("Failed to prepare working directory")?;

    let cors = if args.cors_any {
        CorsPolicy::Permissive
    } else {
        CorsPolicy::from_client_url(args.client_url.as_deref())
    };
    let app = router(orchestrator, &cors);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.backend,
        cors = ?cors,
        "docx2pdf listening on {addr}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn convert(
    config: ServiceConfig,
    input: &Path,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::new(&config).context("Failed to prepare working directory")?;
    let started = Instant::now();

    let doc = orchestrator
        .convert_path(input)
        .await
        .with_context(|| format!("Conversion of {} failed", input.display()))?;

    let dest = output.unwrap_or_else(|| input.with_file_name(doc.download_name()));
    let bytes = doc
        .save_to(&dest)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    if !quiet {
        eprintln!(
            "{} → {}  ({} bytes, {}ms)",
            input.display(),
            dest.display(),
            bytes,
            started.elapsed().as_millis()
        );
    }
    Ok(())
}

fn doctor(config: &ServiceConfig) {
    let engines = [
        (Engine::LibreOffice, config.soffice_path.as_deref()),
        (Engine::Chromium, config.chromium_path.as_deref()),
    ];
    for (engine, explicit) in engines {
        match engine_locate::locate(engine, explicit) {
            Ok(path) => println!("{:<12} {}", engine.to_string(), path.display()),
            Err(e) => println!("{:<12} missing: {e}", engine.to_string()),
        }
    }
    println!("{:<12} {:?}", "backend", config.backend);
    println!("{:<12} {}", "work dir", config.work_dir.display());
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
