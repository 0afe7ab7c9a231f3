use clap::{error::ErrorKind, Parser};
use slavesim_core::{
    console::{ConsoleProtocolAdapter, KeyboardAdapter},
    transport::{RtuHandler, TcpHandler, TransportHandler},
    ControlPort, Gateway, ProtocolPort,
};
use slavesim_models::{
    constants::{DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE_NAME},
    SimConfig, TransportKind,
};
use std::{
    env,
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

/// Modbus slave simulator
///
/// Impersonates one or more field devices over Modbus TCP and serial RTU,
/// with per-slave registers and behavioral rules driven by a TOML
/// configuration file.
#[derive(Parser)]
#[command(name = "slavesim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Modbus slave simulator", long_about = None)]
struct Cli {
    /// Set log level to debug
    #[arg(long)]
    debug: bool,

    /// Output channel (only "console" is supported)
    #[arg(long, default_value = "console")]
    out: String,

    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Home directory of the invoking user, honoring sudo: with `SUDO_USER`
/// set, the original user's home is used rather than root's.
fn home_dir() -> PathBuf {
    if let Ok(sudo_user) = env::var("SUDO_USER") {
        if !sudo_user.is_empty() {
            return PathBuf::from("/home").join(sudo_user);
        }
    }
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_config_path() -> PathBuf {
    home_dir()
        .join(DEFAULT_CONFIG_DIR)
        .join(DEFAULT_CONFIG_FILE_NAME)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    if cli.out != "console" {
        eprintln!("Unknown output channel: {} (only \"console\" is supported)", cli.out);
        return ExitCode::FAILURE;
    }
    let protocol_port: Arc<dyn ProtocolPort> = Arc::new(ConsoleProtocolAdapter::new());

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let cfg = match SimConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        transports = cfg.transports.len(),
        slaves = cfg.slaves.len(),
        "configuration loaded"
    );

    let transports: Vec<Arc<dyn TransportHandler>> = cfg
        .transports
        .iter()
        .map(|t| match t.kind {
            TransportKind::Tcp => Arc::new(TcpHandler::new(
                t.address.clone(),
                Arc::clone(&protocol_port),
            )) as Arc<dyn TransportHandler>,
            TransportKind::Rtu => Arc::new(RtuHandler::new(
                t.address.clone(),
                Arc::clone(&protocol_port),
            )) as Arc<dyn TransportHandler>,
        })
        .collect();

    let gateway = Gateway::new(transports, Arc::clone(&protocol_port));
    let cancel = CancellationToken::new();

    if let Err(e) = gateway.start(cancel.clone()).await {
        eprintln!("Error starting gateway: {e}");
        return ExitCode::FAILURE;
    }

    for slave in &cfg.slaves {
        if let Err(e) = gateway.connect_slave_with_config(slave, &slave.address) {
            eprintln!("Error connecting slave {}: {e}", slave.id);
            return ExitCode::FAILURE;
        }
        info!(id = slave.id, address = %slave.address, "connected slave");
    }

    let keyboard = KeyboardAdapter::new(
        Arc::clone(&gateway) as Arc<dyn ControlPort>,
        Arc::clone(&protocol_port),
        cancel.clone(),
    );
    tokio::spawn(keyboard.run());

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }

    gateway.stop().await;
    ExitCode::SUCCESS
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
