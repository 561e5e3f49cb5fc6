use tokio::signal;
use tokio_util::sync::CancellationToken;

use minicord::config::Config;
use minicord::gateway::{events, GatewayClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minicord=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let shutdown = CancellationToken::new();
    let (client, mut events_rx) = match GatewayClient::new(config, shutdown.clone()) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!("failed to build client: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = client.connect().await {
        tracing::error!("failed to connect: {e}");
        std::process::exit(1);
    }

    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
                client.disconnect().await;
                break;
            }
            reason = client.closed() => {
                tracing::info!(?reason, "gateway connection ended");
                break;
            }
            event = events_rx.recv() => {
                match event {
                    Some(event) => tracing::info!(?event, "dispatch event"),
                    None => break,
                }
            }
        }
    }
}

fn print_banner(config: &Config) {
    eprintln!();
    eprintln!(
        "  \x1b[1;36mminicord\x1b[0m \x1b[2m{}\x1b[0m",
        events::client_description()
    );
    eprintln!();
    eprintln!("  \x1b[2mapi url\x1b[0m      {}", config.api_url);
    eprintln!("  \x1b[2mintents\x1b[0m      {}", config.intents);
    eprintln!(
        "  \x1b[2mtimeout\x1b[0m      {}s",
        config.connect_timeout.as_secs()
    );
    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
