//! Mi Exporter - Xiaomi MIoT Fleet Metrics Binary
//!
//! Polls every configured device model on a fixed interval and serves the results
//! for Prometheus to scrape.

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mi_exporter::{
    cloud::{CloudConfig, CloudConnector},
    metrics::{traits::DeviceDirectory, traits::SpecSource, Context, PollLoop, ProfileSet},
    miot::{resolve, DeviceIndex, SpecTree},
    start_metrics_server, PrometheusSink, WebConfig, DEFAULT_INTERVAL_SECS, DEFAULT_WEB_HOST,
    DEFAULT_WEB_PORT,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "mi_exporter")]
#[command(about = "Prometheus exporter for Xiaomi MIoT devices")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Polls the devices of a Xiaomi account and exposes their properties as Prometheus gauges")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Xiaomi account id or e-mail
    #[arg(short, long, env = "MI_USER")]
    user_id: Option<String>,

    /// Xiaomi account password
    #[arg(short, long, env = "MI_PASS", hide_env_values = true)]
    password: Option<String>,

    /// Token file [default: ~/.mi.token]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Web server bind address
    #[arg(short, long, default_value = DEFAULT_WEB_HOST)]
    addr: String,

    /// Web server port
    #[arg(short = 'P', long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Polling interval in seconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// TOML file replacing the built-in model profiles
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Devices of one model read in parallel
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll devices and serve metrics (default)
    Serve,

    /// Download and show the descriptor of one model
    Spec(SpecArgs),

    /// List the devices of the account
    Devices,
}

#[derive(Args)]
struct SpecArgs {
    /// Model name or descriptor URN
    model: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    /// Resolve a `/`-separated description path instead of printing the descriptor
    #[arg(short, long)]
    resolve: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve) | None => serve_command(&cli).await,
        Some(Commands::Spec(args)) => spec_command(&cli, args).await,
        Some(Commands::Devices) => devices_command(&cli).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("Mi Exporter - Xiaomi MIoT Fleet Metrics");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn token_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(mi_exporter::default_token_path)
}

fn cloud_config(cli: &Cli) -> CloudConfig {
    CloudConfig::new(token_path(cli)).with_credentials(cli.user_id.clone(), cli.password.clone())
}

fn load_profiles(cli: &Cli) -> anyhow::Result<ProfileSet> {
    match &cli.profiles {
        Some(path) => ProfileSet::load(path)
            .with_context(|| format!("Failed to load profiles from {}", path.display())),
        None => Ok(ProfileSet::builtin()),
    }
}

/// Split a `/`-separated description path into its segments.
fn split_path(path: &str) -> Vec<&str> {
    path.split('/').map(str::trim).collect()
}

async fn serve_command(cli: &Cli) -> anyhow::Result<()> {
    print_banner();

    let profiles = load_profiles(cli)?;
    let connector = CloudConnector::new(cloud_config(cli))?;
    let sink = Arc::new(PrometheusSink::new()?);
    let interval = Duration::from_secs(cli.interval);

    info!("Configuration:");
    info!("  - Bind address: {}:{}", cli.addr, cli.port);
    info!("  - Interval: {}s", cli.interval);
    info!("  - Models: {}", profiles.len());
    info!("  - Token file: {}", token_path(cli).display());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let web_config = WebConfig::new(&cli.addr, cli.port);
    let mut server = tokio::spawn(start_metrics_server(
        web_config,
        sink.clone(),
        wait_for_shutdown(shutdown_rx.clone()),
    ));

    let poller = PollLoop::new(Arc::new(Context::new()), connector, sink, interval)
        .with_profiles(&profiles, cli.concurrency as usize);

    tokio::select! {
        summary = poller.run(wait_for_shutdown(shutdown_rx)) => {
            info!(cycles = summary.cycles, failed_cycles = summary.failed_cycles, "Poller finished");
        }
        served = &mut server => {
            // Only reached when the server could not start.
            served.context("Metrics server task panicked")??;
            return Ok(());
        }
    }

    server.await.context("Metrics server task panicked")??;
    info!("Exiting");
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    // A dropped sender also stops everything.
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn spec_command(cli: &Cli, args: &SpecArgs) -> anyhow::Result<()> {
    let connector = CloudConnector::new(cloud_config(cli))?;
    let raw = connector
        .catalog()
        .fetch_spec(&args.model)
        .await
        .with_context(|| format!("Failed to fetch descriptor of {}", args.model))?;

    if let Some(path) = &args.resolve {
        let tree = SpecTree::from_value(&args.model, raw)?;
        match resolve(&tree, &split_path(path)) {
            Ok(resolved) => println!("{} => {}", path, resolved),
            Err(failure) => anyhow::bail!("{}: {}", path, failure),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&raw)?),
        OutputFormat::Pretty => print!("{}", SpecTree::from_value(&args.model, raw)?.outline()),
    }

    Ok(())
}

async fn devices_command(cli: &Cli) -> anyhow::Result<()> {
    let connector = CloudConnector::new(cloud_config(cli))?;
    let raw = connector
        .session()
        .list_devices()
        .await
        .context("Failed to list devices")?;
    let index = DeviceIndex::from_raw(raw)?;

    println!("{:<14} {:<32} NAME", "DID", "MODEL");
    for device in index.iter() {
        println!("{:<14} {:<32} {}", device.did, device.model, device.name);
    }
    println!();
    println!("{} devices", index.len());

    Ok(())
}
