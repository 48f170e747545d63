// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal::unix::{SignalKind, signal};

use backlightd::client;
use backlightd::config::{self, Config};
use backlightd::daemon::ControlServer;

#[macro_use]
extern crate tracing;

#[derive(Parser, Debug)]
#[command(name = "backlightd", version, about = "Keeps the brightness of several displays in step")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "BACKLIGHTD_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Control socket
    #[arg(short, long, env = "BACKLIGHTD_SOCKET_PATH", global = true)]
    socket: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request to a running daemon and print the response
    Send {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        request: Vec<String>,
    },
}

fn setup_logs() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "warn,{}=info",
        env!("CARGO_CRATE_NAME")
    )));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logs();
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Send { request }) => {
            // the daemon may have been told where to listen by its config file
            let config = match cli.socket {
                Some(_) => None,
                None => Config::load(cli.config.as_deref())
                    .inspect_err(|e| debug!("No usable configuration: {}", e))
                    .ok()
                    .map(|(_, config)| config),
            };
            let socket_path = config::resolve_socket_path(cli.socket, config.as_ref());
            ExitCode::from(client::run(&socket_path, &request.join(" ")).await)
        }
        None => match run_daemon(cli.config, cli.socket).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_daemon(config_path: Option<PathBuf>, socket: Option<PathBuf>) -> Result<()> {
    let (config_path, config) = Config::load(config_path.as_deref())?;
    info!("Loaded configuration from {}", config_path.display());

    let socket_path = config::resolve_socket_path(socket, Some(&config));

    let server = ControlServer::start(&config, socket_path).await?;
    let listener = server.bind()?;
    server.run(listener, shutdown_signal()?).await
}

fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => debug!("Received SIGINT"),
            _ = terminate.recv() => debug!("Received SIGTERM"),
        }
    })
}
