//! textshare: runs the store server the admin and viewer pages talk to.
//!
//! Configuration comes from `TEXTSHARE_*` variables (see
//! [`textshare_app::config`]); log level from `RUST_LOG`.

use log::{error, info};

use textshare_app::{AppConfig, Landing};
use textshare_sync::StoreServer;

#[tokio::main]
async fn main() {
    env_logger::init();

    info!("Starting textshare...");

    let config = AppConfig::from_env();
    let server = match StoreServer::new(config.server_config()) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to open store: {e}");
            std::process::exit(1);
        }
    };

    let origin = config.origin.to_string();
    let landing = Landing::new();
    for (link, href) in landing.links().iter().zip(landing.hrefs(&origin)) {
        info!("{}: {href}", link.label);
    }
    info!("Share link: {}", config.share_url());
    info!("Store endpoint: {}", config.store_url());

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Store server stopped: {e}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
