//! Vitalsync CLI
//!
//! Composition root for the aggregation-and-upload pipeline. The
//! pipeline services are constructed here and passed down by
//! reference; there is no global shared state.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitalsync::{
    Aggregator, AuthGate, Config, ExchangeCredentialProvider, HttpTokenRefresher, IdentityToken,
    IntervalBackgroundHost, MemoryHealthStore, ObjectStoreConfig, ProfileStore, Scheduler,
    SchedulerConfig, UploadClient,
};

#[derive(Parser)]
#[command(name = "vitalsync", about = "Health snapshot upload pipeline", version)]
struct Cli {
    /// Path to a config file (defaults to standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler: daily timer plus background windows
    Run,
    /// Trigger one collect-render-upload cycle and exit
    Upload,
    /// Store an identity token obtained from the external sign-in flow
    SignIn {
        /// The signed identity token string
        token: String,
    },
    /// Set the display name used in snapshots and storage keys
    SetUser { name: String },
    /// Print a default config file to stdout
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_logging(&config);

    match cli.command {
        Command::Run => run(&config, true).await,
        Command::Upload => run(&config, false).await,
        Command::SignIn { token } => sign_in(&config, token).await,
        Command::SetUser { name } => set_user(&config, &name),
        Command::Config => {
            print!("{}", vitalsync::config::generate_default_config());
            Ok(())
        }
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("vitalsync={}", config.logging.level)),
    );

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_profile(config: &Config) -> anyhow::Result<Arc<ProfileStore>> {
    let data_dir = PathBuf::from(&config.profile.data_dir);
    let store = ProfileStore::open(&data_dir)
        .with_context(|| format!("opening profile store in {data_dir:?}"))?;
    Ok(Arc::new(store))
}

fn build_scheduler(config: &Config) -> anyhow::Result<Arc<Scheduler>> {
    let profile = open_profile(config)?;

    let refresher = Arc::new(HttpTokenRefresher::new(
        config.upload.token_url.clone(),
        profile.clone(),
    ));
    let gate = Arc::new(AuthGate::new(refresher).with_profile(profile.clone()));

    let provider = Arc::new(ExchangeCredentialProvider::new(
        config.upload.credential_exchange_url.clone(),
        gate.clone(),
    ));
    let uploader = Arc::new(UploadClient::new(
        ObjectStoreConfig {
            endpoint: config.upload.endpoint.clone(),
            bucket: config.upload.bucket.clone(),
            request_timeout_ms: config.upload.request_timeout_ms,
        },
        provider,
    ));

    // No device health store exists off-device; collection runs
    // against the in-memory store until a platform backend is wired in
    let aggregator = Aggregator::new(Arc::new(MemoryHealthStore::new()));

    Ok(Arc::new(Scheduler::new(
        aggregator,
        gate,
        uploader,
        profile,
        SchedulerConfig {
            daily_hour: config.scheduler.daily_hour,
            daily_minute: config.scheduler.daily_minute,
        },
    )))
}

async fn run(config: &Config, keep_running: bool) -> anyhow::Result<()> {
    tracing::info!("Vitalsync v{}", env!("CARGO_PKG_VERSION"));
    let scheduler = build_scheduler(config)?;

    if !keep_running {
        let report = scheduler.trigger_now().await?;
        tracing::info!(
            cycle = %report.id,
            outcome = ?report.outcome,
            key = report.uploaded_key.as_deref().unwrap_or("-"),
            "Manual cycle finished"
        );
        return Ok(());
    }

    let daily = scheduler.clone().start_daily();
    let host = Arc::new(IntervalBackgroundHost::new(
        std::time::Duration::from_secs(config.scheduler.background_interval_hours * 3600),
        std::time::Duration::from_secs(config.scheduler.background_window_secs),
    ));
    let background = scheduler.clone().start_background(host);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    daily.abort();
    background.abort();
    Ok(())
}

async fn sign_in(config: &Config, token: String) -> anyhow::Result<()> {
    let profile = open_profile(config)?;
    let token = IdentityToken::new(token);
    if token.expiration().is_none() {
        tracing::warn!("Token payload did not decode; it will be treated as already expired");
    }
    profile.set_identity_token(token.as_str())?;
    tracing::info!("Identity token stored");
    Ok(())
}

fn set_user(config: &Config, name: &str) -> anyhow::Result<()> {
    let profile = open_profile(config)?;
    profile.set_user_name(name)?;
    tracing::info!(name, "Display name stored");
    Ok(())
}
