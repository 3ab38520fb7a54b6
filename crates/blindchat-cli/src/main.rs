use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blindchat_channels::{Transport, TransportMeta};
use blindchat_channels::telegram::TelegramTransport;
use blindchat_core::config::{Config, LoggingConfig};
use blindchat_gateway::GatewayState;

#[derive(Parser)]
#[command(
    name = "blindchat",
    about = "Anonymous one-to-one chat relay for Telegram",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.blindchat/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with Telegram and start relaying
    Serve {
        /// Port for the health/webhook server (default: 8080)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show bot and gateway status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (secrets redacted)
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Check the configuration for problems
    Validate,
}

fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let mut directives = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    for filter in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
        directives.push(',');
        directives.push_str(filter);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let json = logging.is_some_and(|l| l.format == "json");
    let stdout = logging.is_some_and(|l| l.output == "stdout");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

/// Replace secrets with a marker before printing.
fn redacted(config: &Config) -> anyhow::Result<serde_json::Value> {
    let mut json = serde_json::to_value(config)?;
    for key in ["bot_token", "secret_token"] {
        if let Some(value) = json.pointer_mut(&format!("/telegram/{key}")) {
            *value = serde_json::Value::String("********".into());
        }
    }
    Ok(json)
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }

    let telegram = config
        .telegram
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no telegram section in config"))?;
    let transport = Arc::new(TelegramTransport::from_config(telegram)?);

    // The bot cannot work without its webhook/command registration.
    transport.register().await?;

    let port = port.unwrap_or_else(|| config.gateway_port());
    let mode = config.update_mode();
    let (state, rx) = GatewayState::new(Arc::new(config), transport.clone());

    #[cfg(feature = "metrics")]
    let state = state.with_metrics_handle(blindchat_gateway::metrics::install_prometheus_recorder()?);

    let state = Arc::new(state);
    let handle = transport.start(state.inbound.clone()).await?;
    blindchat_gateway::start_router(state.clone(), rx);

    tracing::info!(?mode, port, "Blindchat started");
    let result = blindchat_gateway::start_gateway(state, port).await;
    handle.shutdown();
    result
}

fn transport_line(meta: &TransportMeta) -> String {
    match &meta.docs_url {
        Some(url) => format!("{} ({}, {url})", meta.label, meta.description),
        None => format!("{} ({})", meta.label, meta.description),
    }
}

async fn status(config: &Config, config_path: &std::path::Path) {
    println!("Blindchat v{}", env!("CARGO_PKG_VERSION"));
    println!("Config: {}", config_path.display());
    println!("Update mode: {:?}", config.update_mode());
    println!("Gateway port: {}", config.gateway_port());

    match config.telegram.as_ref().map(TelegramTransport::from_config) {
        Some(Ok(transport)) => {
            println!("Transport: {}", transport_line(&transport.meta()));
            let status = transport.status().await;
            match (status.connected, status.account, status.error) {
                (true, Some(account), _) => println!("Telegram: connected as @{account}"),
                (true, None, _) => println!("Telegram: connected"),
                (false, _, error) => {
                    println!("Telegram: unreachable ({})", error.unwrap_or_default())
                }
            }
        }
        Some(Err(e)) => println!("Telegram: {e}"),
        None => println!("Telegram: not configured"),
    }

    let url = format!("http://127.0.0.1:{}/health", config.gateway_port());
    match reqwest::get(&url).await {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(health) => println!(
                "Gateway: running (waiting: {}, connected: {})",
                health["sessions"]["waiting"], health["sessions"]["connected"]
            ),
            Err(e) => println!("Gateway: unexpected health response ({e})"),
        },
        Err(_) => println!("Gateway: not running"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    init_logging(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => serve(config, port).await?,
        Commands::Status => status(&config, &config_path).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&redacted(&config)?)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
            ConfigAction::Set { key, value } => {
                // Accept JSON literals, fall back to a plain string.
                let value = serde_json::from_str(&value)
                    .unwrap_or_else(|_| serde_json::Value::String(value));
                Config::set_in_file(&config_path, &key, value)?;
                println!("Set {key} in {}", config_path.display());
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK");
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve_with_port() {
        let cli = Cli::try_parse_from(["blindchat", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000) }));
    }

    #[test]
    fn test_cli_parses_config_set() {
        let cli = Cli::try_parse_from([
            "blindchat",
            "--config",
            "/tmp/bc.json",
            "config",
            "set",
            "gateway.port",
            "9001",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bc.json")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Set { .. }
            }
        ));
    }

    #[test]
    fn test_transport_line_includes_docs() {
        let meta = TransportMeta {
            label: "Telegram".into(),
            description: "Telegram Bot API".into(),
            docs_url: Some("https://core.telegram.org/bots/api".into()),
        };
        assert_eq!(
            transport_line(&meta),
            "Telegram (Telegram Bot API, https://core.telegram.org/bots/api)"
        );
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let config = Config::parse(r#"{ telegram: { bot_token: "123:abc", secret_token: "s" } }"#).unwrap();
        let json = redacted(&config).unwrap();
        assert_eq!(json["telegram"]["bot_token"], "********");
        assert_eq!(json["telegram"]["secret_token"], "********");
        assert_eq!(json["telegram"]["mode"], "polling");
    }
}
