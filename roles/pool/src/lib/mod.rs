pub mod address;
pub mod config;
pub mod downstream;
pub mod error;
pub mod identity;
pub mod job;
pub mod logging;
pub mod miner;
pub mod mining_pool;
pub mod session;
pub mod share;
pub mod share_persistence;
pub mod status;
pub mod template_receiver;
pub mod utils;

use std::{sync::Arc, time::Duration};

use async_channel::{bounded, unbounded};
use config::PoolConfig;
use downstream::Downstream;
use error::PoolError;
use miner::MinerRegistry;
use mining_pool::{run_block_submitter, run_template_refresh, Collaborators, StratumServer};
use session::SessionRegistry;
use share::{ReportedHashVerifier, ShareLedger};
use share_persistence::ShareFileHandler;
use template_receiver::{DaemonTemplateSource, TemplateSource};
use tokio::select;
use tracing::{error, info, warn};

use address::NetworkAddressValidator;

/// Block candidates waiting for submission.
const BLOCK_CANDIDATE_CHANNEL_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct PoolStratum {
    config: PoolConfig,
}

impl PoolStratum {
    pub fn new(config: PoolConfig) -> PoolStratum {
        PoolStratum { config }
    }

    /// Wires the stratum server to its collaborators, starts the listener, the template refresh
    /// driver and the block submitter, then runs the status loop until a component shuts down or
    /// an interrupt is received.
    pub async fn start(&self) -> Result<(), PoolError> {
        let config = self.config.clone();
        let (status_tx, status_rx) = unbounded();
        let (candidate_tx, candidate_rx) = bounded(BLOCK_CANDIDATE_CHANNEL_SIZE);

        let persistence = match &config.share_log_file {
            Some(path) => {
                let (handler, persistence) = ShareFileHandler::open(path).await?;
                tokio::spawn(handler.run());
                Some(persistence)
            }
            None => None,
        };

        let templates = Arc::new(DaemonTemplateSource::new(&config)?);
        let collaborators = Collaborators {
            templates: templates.clone(),
            address_validator: Arc::new(NetworkAddressValidator::new(&config.network)),
            share_processor: Arc::new(ShareLedger::new(
                Box::new(ReportedHashVerifier),
                candidate_tx,
                persistence,
            )),
        };
        let server = Arc::new(StratumServer::new(
            &config.stratum,
            Arc::new(MinerRegistry::new()),
            Arc::new(SessionRegistry::new()),
            collaborators,
        )?);

        if !server.refresh_block_template(false).await {
            warn!("No block template yet, logins will be refused until the daemon answers");
        }

        let downstream = Downstream::bind(server.clone(), &config).await?;
        tokio::spawn(
            downstream.accept_connections(status::Sender::DownstreamListener(status_tx.clone())),
        );
        tokio::spawn(run_template_refresh(
            server.clone(),
            Duration::from_millis(config.daemon.refresh_interval_ms),
            status::Sender::TemplateReceiver(status_tx.clone()),
        ));
        tokio::spawn(run_block_submitter(
            server.clone(),
            candidate_rx,
            status::Sender::BlockSubmitter(status_tx),
        ));

        // Start the error handling loop
        // See `./status.rs` for information on how this operates
        loop {
            let task_status = select! {
                task_status = status_rx.recv() => task_status,
                interrupt_signal = tokio::signal::ctrl_c() => {
                    match interrupt_signal {
                        Ok(()) => {
                            info!("Interrupt received");
                        },
                        Err(err) => {
                            error!("Unable to listen for interrupt signal: {}", err);
                            // we also shut down in case of error
                        },
                    }
                    break;
                }
            };
            let task_status: status::Status = match task_status {
                Ok(status) => status,
                Err(e) => {
                    error!("Status channel closed: {}", e);
                    break;
                }
            };

            match task_status.state {
                status::State::DownstreamShutdown(err) => {
                    error!(
                        "SHUTDOWN from Downstream: {}\nTry to restart the downstream listener",
                        err
                    );
                    break;
                }
                status::State::TemplateReceiverShutdown(err) => {
                    error!("SHUTDOWN from template receiver: {}", err);
                    break;
                }
                status::State::BlockSubmitterShutdown(err) => {
                    error!("SHUTDOWN from block submitter: {}", err);
                    break;
                }
                status::State::Healthy(msg) => {
                    info!("HEALTHY message: {}", msg);
                }
            }
        }

        info!(
            "Pool stopped with {} miners known, {} sessions active, sick: {}",
            server.miners().len(),
            server.sessions().len(),
            templates.is_sick()
        );
        Ok(())
    }
}
