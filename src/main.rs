//! Snmpfleet main application

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use anyhow::Result;

use snmpfleet::{
    config::FleetConfig,
    core::{Fleet, FleetEvent},
    utils::setup_logging,
};

#[derive(Parser)]
#[command(name = "snmpfleet")]
#[command(about = "SNMP agent fleet simulator")]
#[command(version = snmpfleet::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent fleet
    Start,
    /// Validate configuration
    ValidateConfig,
    /// Generate default configuration
    GenerateConfig {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(&cli)?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    setup_logging(&config.logging)?;

    info!("Starting {} v{}", snmpfleet::NAME, snmpfleet::VERSION);

    match &cli.command {
        Some(Commands::Start) | None => run_fleet(config).await,
        Some(Commands::ValidateConfig) => validate_configuration(&config),
        Some(Commands::GenerateConfig { output }) => generate_default_config(output.clone()),
    }
}

fn load_configuration(cli: &Cli) -> Result<FleetConfig> {
    let config = if let Some(config_path) = &cli.config {
        FleetConfig::load_from_file(config_path)?
    } else {
        match FleetConfig::load_from_env() {
            Ok(config) => config,
            Err(_) => FleetConfig::default_config(),
        }
    };

    config.validate()?;
    Ok(config)
}

async fn run_fleet(config: FleetConfig) -> Result<()> {
    let mut fleet = Fleet::new(config);

    let mut event_rx = fleet
        .take_event_receiver()
        .ok_or_else(|| snmpfleet::Error::internal("Failed to get event receiver"))?;

    // A bind failure propagates out of main as the nonzero exit.
    fleet.start().await?;

    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_fleet_event(event);
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully"),
        Err(e) => error!("Unable to listen for shutdown signal: {}", e),
    }

    fleet.stop();
    event_task.abort();

    info!("Fleet shutdown complete");
    Ok(())
}

fn handle_fleet_event(event: FleetEvent) {
    match event {
        FleetEvent::Started { agents } => {
            info!("Fleet started with {} agents", agents);
        }
        FleetEvent::Stopped => {
            info!("Fleet stopped");
        }
        FleetEvent::AgentStarted { name, address } => {
            info!("Agent {} answering on {}", name, address);
        }
        FleetEvent::AgentFailed { name, message } => {
            warn!("Agent {} failed to start: {}", name, message);
        }
    }
}

fn validate_configuration(config: &FleetConfig) -> Result<()> {
    config.validate()?;

    println!("Configuration is valid");
    println!("  Agents: {}", config.agents.len());
    for agent in &config.agents {
        println!(
            "  {} on {} (community {:?}, walk {})",
            agent.name(),
            agent.address(),
            agent.community,
            agent.walk.display()
        );
    }
    Ok(())
}

fn generate_default_config(output_path: Option<PathBuf>) -> Result<()> {
    let config = FleetConfig::default_config();
    let yaml = serde_yaml::to_string(&config)?;

    match output_path {
        Some(path) => {
            std::fs::write(&path, yaml)?;
            println!("Default configuration written to: {}", path.display());
        }
        None => {
            println!("{}", yaml);
        }
    }

    Ok(())
}
