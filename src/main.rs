use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nullbak::core::{NullTransport, PackageInfo, orchestrator};
use nullbak::settings::{self, LocalSettingsService, Selection, SettingsOutcome};
use nullbak::{config, context, logging, rpc};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "nullbak")]
#[command(about = "Null backup transport: backs up to nowhere", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to load instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the transport to an orchestrator over JSON-RPC
    Serve,
    /// Query a running transport server
    Status,
    /// Drive a local transport through a backup and restore pass
    Simulate(SimulateArgs),
    /// View or change backup settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Enable,
    Disable,
    Select { transport: String },
}

#[derive(Args)]
struct SimulateArgs {
    /// Package names to back up and restore
    #[arg(default_values_t = vec!["com.example.app".to_string()])]
    packages: Vec<String>,

    /// Bytes of full-stream data per package
    #[arg(long, default_value_t = 1024 * 1024)]
    full_size: usize,

    /// Bytes announced per send_backup_data call
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: usize,
}

#[derive(Args, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    rpc_bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    settings_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::AppConfig::load(path, Some(&cli.overrides))?,
        None => config::AppConfig::new(Some(&cli.overrides))?,
    };
    logging::init(logging::LogConfig::from(&config));

    match cli.command {
        Commands::Serve => run_server(context::AppContext::new(config))
            .await
            .context("Failed to run transport server")?,
        Commands::Status => run_status(&config)
            .await
            .context("Failed to check status of transport server")?,
        Commands::Simulate(args) => run_simulation(args)?,
        Commands::Settings { action } => {
            run_settings(&config, action.unwrap_or(SettingsAction::Show))?
        }
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

async fn run_server(ctx: context::AppContext) -> Result<()> {
    let server = rpc::RpcServer::bind(ctx.clone(), ctx.config.rpc_bind).await?;

    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping transport server");
        }
    }

    Ok(())
}

async fn run_status(config: &config::AppConfig) -> Result<()> {
    let client = rpc::RpcClient::new(config.rpc_bind);
    let status = client.daemon_status().await?;
    let transport = client.transport_info().await?;

    println!("nullbak {} at {}", status.version, status.rpc_bind);
    println!("  up since:    {} ({}s)", status.started_at, status.uptime_secs);
    println!("  transport:   {}", transport.name);
    println!("  destination: {}", transport.destination);
    println!("  directory:   {}", transport.dir_name);
    Ok(())
}

fn run_simulation(args: SimulateArgs) -> Result<()> {
    let packages: Vec<PackageInfo> = args.packages.into_iter().map(PackageInfo::new).collect();
    let mut transport = NullTransport::new();

    let report =
        orchestrator::simulate_pass(&mut transport, &packages, args.full_size, args.chunk_size)?;

    println!("Key-value backup:");
    for name in &report.key_value.succeeded {
        println!("  {:<40} ok", name);
    }
    for (name, status) in &report.key_value.failed {
        println!("  {:<40} {}", name, status);
    }

    println!("Full backup:");
    for (name, outcome) in &report.full {
        println!("  {:<40} {:?}", name, outcome);
    }

    println!("Restore:");
    for (name, bytes) in &report.restore.restored {
        println!("  {:<40} {} bytes", name, bytes);
    }
    for name in &report.restore.abandoned {
        println!("  {:<40} abandoned", name);
    }
    Ok(())
}

fn run_settings(config: &config::AppConfig, action: SettingsAction) -> Result<()> {
    let action = match action {
        SettingsAction::Show => settings::SettingsAction::Show,
        SettingsAction::Enable => settings::SettingsAction::Enable,
        SettingsAction::Disable => settings::SettingsAction::Disable,
        SettingsAction::Select { transport } => settings::SettingsAction::Select(transport),
    };
    let service = LocalSettingsService::new(&config.settings_path);

    let outcome =
        settings::run(service, action).context("Failed to manage backup settings")?;
    let code = outcome.exit_code();

    match outcome {
        SettingsOutcome::Applied { view, selection } => {
            if selection == Some(Selection::Unchanged) {
                println!("{} is already the current transport.", view.current);
            }
            print!("{}", view);
            Ok(())
        }
        SettingsOutcome::Denied(e) => {
            eprintln!("{}", settings::PRIVILEGE_NOTICE);
            eprintln!("{}", e);
            std::process::exit(code);
        }
    }
}
