mod args;

use args::process_cli_args;
use pool_stratum::{logging::init_logging, PoolStratum};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match process_cli_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return;
        }
    };
    init_logging(config.log_dir());
    info!("Pool INITIALIZING, stratum on {}", config.listen_address);

    if let Err(e) = PoolStratum::new(config).start().await {
        error!("Pool failed: {}", e);
    }
}
