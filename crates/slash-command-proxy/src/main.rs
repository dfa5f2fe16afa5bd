mod nats;
mod server;
mod settings;
mod telemetry;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use anyhow::anyhow;
use chrono::Utc;
use clap::{Parser, Subcommand};
use slash_command_core::signing::{SIGNATURE_HEADER, TIMESTAMP_HEADER, sign};
use slash_command_core::{CommandProxy, CommandRegistry, ConfigReport};
use tokio::net::TcpListener;
use tokio::runtime::Builder;
use tracing::{error, info, warn};

use crate::nats::NatsPublisher;
use crate::settings::Settings;
use crate::telemetry::LogFormat;

#[derive(Parser)]
#[command(name = "slash-command-proxy")]
#[command(about = "Verify slash-command webhooks and forward them to NATS", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook listener.
    Serve {
        #[arg(long, env = "SLASH_PROXY_CONFIG", value_name = "CONFIG_JSON")]
        config: PathBuf,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Validate a config file and print the report.
    CheckConfig {
        #[arg(long, env = "SLASH_PROXY_CONFIG", value_name = "CONFIG_JSON")]
        config: PathBuf,
    },
    /// Print the signature headers for a request body.
    Sign {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        timestamp: Option<i64>,
    },
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(_) => 0,
        Err(err) => {
            if !matches!(err, CliError::Validation { .. }) {
                eprintln!("error: {err}");
            }
            err.exit_code()
        }
    };
    process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            log_format,
            log_level,
        } => handle_serve(config, host, port, log_format, log_level),
        Command::CheckConfig { config } => handle_check_config(config),
        Command::Sign {
            secret,
            body,
            timestamp,
        } => handle_sign(secret, body, timestamp),
    }
}

fn load_settings(path: &Path) -> Result<Settings, CliError> {
    let mut settings =
        Settings::load(path).map_err(|err| CliError::ConfigLoad(path.to_path_buf(), err))?;
    settings
        .apply_env()
        .map_err(|err| CliError::ConfigLoad(path.to_path_buf(), err))?;
    Ok(settings)
}

fn handle_check_config(config: PathBuf) -> Result<(), CliError> {
    let settings = load_settings(&config)?;
    let mut report = slash_command_core::config::validate(&settings.commands);
    if !settings.server.path.starts_with('/') {
        report
            .errors
            .push(format!("server.path '{}' must start with '/'", settings.server.path));
    }
    println!("{}", render_report(&report)?);
    if report.has_errors() {
        return Err(CliError::Validation { report });
    }
    Ok(())
}

fn handle_sign(secret: String, body: String, timestamp: Option<i64>) -> Result<(), CliError> {
    if secret.is_empty() {
        return Err(CliError::Usage(anyhow!("--secret cannot be empty")));
    }
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
    let headers = BTreeMap::from([
        (TIMESTAMP_HEADER, timestamp.to_string()),
        (
            SIGNATURE_HEADER,
            sign(secret.as_bytes(), timestamp, body.as_bytes()),
        ),
    ]);
    let rendered =
        serde_json::to_string_pretty(&headers).map_err(|err| CliError::Usage(err.into()))?;
    println!("{rendered}");
    Ok(())
}

fn handle_serve(
    config: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    log_format: LogFormat,
    log_level: String,
) -> Result<(), CliError> {
    telemetry::init(log_format, &log_level).map_err(CliError::Usage)?;

    let mut settings = load_settings(&config)?;
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    if !settings.server.path.starts_with('/') {
        return Err(CliError::ConfigLoad(
            config,
            anyhow!("server.path '{}' must start with '/'", settings.server.path),
        ));
    }

    let registry = CommandRegistry::new(settings.commands.clone());
    let report = registry.validate();
    for warning in &report.warnings {
        warn!(%warning, "config warning");
    }
    if report.has_errors() {
        for problem in &report.errors {
            error!(%problem, "config error");
        }
        return Err(CliError::Validation { report });
    }
    info!(
        commands = registry.len(),
        path = %settings.server.path,
        "loaded command registry"
    );

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Listen(err.into()))?;
    runtime.block_on(async move {
        let publisher = NatsPublisher::connect(&settings.nats)
            .await
            .map_err(CliError::Queue)?;
        let proxy = CommandProxy::new(
            Arc::new(registry),
            Arc::new(publisher),
            settings.proxy.clone(),
        );
        let app = server::router(Arc::new(proxy), &settings.server);
        let bind_addr = settings.server.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|err| CliError::Listen(anyhow!("failed to bind {bind_addr}: {err}")))?;
        server::serve(listener, app)
            .await
            .map_err(|err| CliError::Listen(err.into()))?;
        info!("server stopped");
        Ok(())
    })
}

fn render_report(report: &ConfigReport) -> Result<String, CliError> {
    serde_json::to_string_pretty(report).map_err(|err| CliError::Usage(err.into()))
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config load failed ({0}): {1:#}")]
    ConfigLoad(PathBuf, #[source] anyhow::Error),
    #[error("config validation failed")]
    Validation { report: ConfigReport },
    #[error("queue connection failed: {0:#}")]
    Queue(#[source] anyhow::Error),
    #[error("listener failure: {0:#}")]
    Listen(#[source] anyhow::Error),
    #[error("{0:#}")]
    Usage(#[source] anyhow::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::ConfigLoad(_, _) => 1,
            CliError::Validation { .. } => 2,
            CliError::Queue(_) => 5,
            CliError::Listen(_) => 7,
            CliError::Usage(_) => 64,
        }
    }
}
