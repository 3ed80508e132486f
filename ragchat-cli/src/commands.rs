//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use ragchat_core::gateway::{GatewayState, run_gateway};
use ragchat_core::{AppConfig, EnvCredentials, RagPipeline, load_config};
use ragchat_eval::{
    DriverSettings, ProbeRequest, QualityScorer, ScorerConfig, TargetKind, target_for,
};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => handle_serve(workspace, config_file, host, port).await,
        Commands::Grade { scorer_config } => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            handle_grade(scorer_config.as_deref(), stdin.lock(), stdout.lock())
        }
        Commands::Probe { target } => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            let settings = DriverSettings::from_env()?;
            let output = handle_probe(&target, settings, &input).await?;
            println!("{}", output);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

async fn handle_serve(
    workspace: &Path,
    config_file: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load_config(Some(workspace), config_file, None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let pipeline = RagPipeline::from_config(&config, Arc::new(EnvCredentials))
        .map_err(|e| anyhow::anyhow!("Failed to build index: {}", e))?;
    tracing::info!(
        providers = ?pipeline.providers().keys(),
        default_provider = %config.providers.default_provider,
        "Starting ragchat gateway"
    );
    let gateway = GatewayState::new(pipeline, config.retrieval.default_k).shared();
    run_gateway(gateway, &config.server).await?;
    Ok(())
}

fn handle_grade<R: Read, W: Write>(
    scorer_config: Option<&Path>,
    reader: R,
    writer: W,
) -> anyhow::Result<()> {
    let config = ScorerConfig::load(scorer_config)?;
    let scorer = QualityScorer::new(config)?;
    ragchat_eval::run_stdio(&scorer, reader, writer)?;
    Ok(())
}

/// Run one driver call and return the response as a JSON line.
async fn handle_probe(target: &str, settings: DriverSettings, input: &str) -> anyhow::Result<String> {
    let kind: TargetKind = target.parse()?;
    if input.trim().is_empty() {
        anyhow::bail!("Expected a probe request on stdin");
    }
    let request: ProbeRequest = serde_json::from_str(input)?;
    let response = target_for(kind, settings).call(&request).await;
    if let Some(error) = &response.error {
        tracing::warn!(kind = %kind, error = %error, "Probe failed");
    }
    Ok(serde_json::to_string(&response)?)
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".ragchat");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), config_file, None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
