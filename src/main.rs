use std::process::ExitCode;

use callrelay::config::{Args, RelayConfig};
use callrelay::signaling::{SessionManager, SignalingServer};
use callrelay::tls;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match RelayConfig::try_from(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt().with_max_level(config.log_level).init();

    let manager = SessionManager::new(config.peer_config.clone());
    let mut server = match SignalingServer::bind(&config.listen.bind_addr(), manager).await {
        Ok(server) => server.with_policy(config.policy.clone()),
        Err(e) => {
            error!("Failed to bind {}: {}", config.listen, e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(files) = &config.tls {
        match tls::load_acceptor(files) {
            Ok(acceptor) => server = server.with_tls(acceptor),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    info!("Binding to {}", config.listen);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, exiting");
        }
    }

    ExitCode::SUCCESS
}
