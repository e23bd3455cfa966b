use clap::Parser;
use tokio::{select, signal};
use tracing::{error, info};
use tracing_subscriber::fmt;

use relay_server::{Config, RelayError, ServerListener};

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    let config = Config::parse();

    fmt()
        .compact()
        .with_max_level(config.log_level)
        .init();

    info!("Server starting.. {:?}", config.addr());

    let server = ServerListener::bind(config).await?;
    let registry = server.registry();

    select! {
        _ = server.run() => {},
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Unable to listen for shutdown signal: {}", e);
            }
            info!("Server shutting down");
            let closed = registry.close_all().await;
            info!("Closed {} connections", closed);
        }
    }

    Ok(())
}
