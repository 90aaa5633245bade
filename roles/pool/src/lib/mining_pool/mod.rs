//! ## Stratum server
//!
//! [`StratumServer`] owns the protocol core: the miner and session registries, the job issuer
//! and the collaborators that provide templates, validate addresses and process shares. The
//! `handle_*_rpc` methods implement the per-call logic that
//! [`message_handler::SessionHandler`] dispatches to; [`StratumServer::broadcast_new_jobs`] fans
//! fresh work out to every logged in session.

use std::{sync::Arc, time::Duration};

use stratum_rpc::{
    client_to_server::{GetJob, KeepAlived, Login, Submit},
    server_to_client::{JobDescriptor, LoginResult, StatusResult, STATUS_OK},
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    address::AddressValidator,
    config::{LoginSeparators, StratumConfig},
    error::{PoolError, PoolResult, StratumError},
    identity::{parse_login, Identity},
    job::JobIssuer,
    miner::{Miner, MinerRegistry},
    session::{Session, SessionRegistry},
    share::{BlockCandidate, ShareContext, ShareProcessor, ShareVerdict},
    status,
    template_receiver::TemplateSource,
};

pub mod message_handler;

/// External services the stratum server relies on.
#[derive(Clone)]
pub struct Collaborators {
    pub templates: Arc<dyn TemplateSource>,
    pub address_validator: Arc<dyn AddressValidator>,
    pub share_processor: Arc<dyn ShareProcessor>,
}

/// Outcome of one broadcast round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct StratumServer {
    separators: LoginSeparators,
    job_backlog: usize,
    miners: Arc<MinerRegistry>,
    sessions: Arc<SessionRegistry>,
    issuer: JobIssuer,
    broadcast_slots: Arc<Semaphore>,
    templates: Arc<dyn TemplateSource>,
    address_validator: Arc<dyn AddressValidator>,
    share_processor: Arc<dyn ShareProcessor>,
}

/// Nonces are exactly 8 lowercase hex characters.
fn is_valid_nonce(nonce: &str) -> bool {
    nonce.len() == 8
        && nonce
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl StratumServer {
    pub fn new(
        config: &StratumConfig,
        miners: Arc<MinerRegistry>,
        sessions: Arc<SessionRegistry>,
        collaborators: Collaborators,
    ) -> PoolResult<Self> {
        Ok(Self {
            separators: LoginSeparators::try_from(config)?,
            job_backlog: config.job_backlog,
            miners,
            sessions,
            issuer: JobIssuer::new(config),
            broadcast_slots: Arc::new(Semaphore::new(config.max_broadcast_concurrency.max(1))),
            templates: collaborators.templates,
            address_validator: collaborators.address_validator,
            share_processor: collaborators.share_processor,
        })
    }

    pub fn miners(&self) -> &Arc<MinerRegistry> {
        &self.miners
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn job_backlog(&self) -> usize {
        self.job_backlog
    }

    fn miner(&self, id: &str) -> Result<Arc<Miner>, StratumError> {
        self.miners.get(id).ok_or(StratumError::Unauthenticated)
    }

    pub fn handle_login_rpc(
        &self,
        session: &Arc<Session>,
        params: &Login,
    ) -> Result<LoginResult, StratumError> {
        let parts = parse_login(&params.login, self.separators);
        let identity = Identity::resolve(parts, self.separators, self.address_validator.as_ref())
            .map_err(|e| {
                warn!("{} by {}: {}", e, session.ip, params.login);
                e
            })?;

        let template = self
            .templates
            .current_block_template()
            .ok_or(StratumError::JobNotReady)?;

        let (miner, created) = self.miners.get_or_create(&identity, &session.ip);
        if created {
            info!(
                "Registering new miner: {}@{}, Address: {}, PaymentID: {}, fixedDiff: {}",
                identity.id, session.ip, identity.address, identity.payment_id, identity.fixed_diff
            );
        }
        info!(
            "Miner connected {}@{}, Address: {}, PaymentID: {}, fixedDiff: {}",
            identity.id, session.ip, identity.address, identity.payment_id, identity.fixed_diff
        );

        self.sessions.register(session.clone());
        miner.heartbeat();
        session.set_fixed_diff(identity.fixed_diff);
        session.bind_miner(&identity.id);

        let job = self.issuer.issue_job(session, &template);
        debug!("Login job for {}: {:?}", identity.id, job);
        Ok(LoginResult {
            id: identity.id,
            job,
            status: STATUS_OK.to_string(),
        })
    }

    pub fn handle_getjob_rpc(
        &self,
        session: &Session,
        params: &GetJob,
    ) -> Result<JobDescriptor, StratumError> {
        let miner = self.miner(&params.miner_id)?;
        let template = self
            .templates
            .current_block_template()
            .filter(|_| !self.templates.is_sick())
            .ok_or(StratumError::JobNotReady)?;
        miner.heartbeat();
        Ok(self.issuer.issue_job(session, &template))
    }

    pub fn handle_submit_rpc(
        &self,
        session: &Session,
        params: &Submit,
    ) -> Result<StatusResult, StratumError> {
        let miner = self.miner(&params.miner_id)?;
        miner.heartbeat();

        let job = session
            .find_job(&params.job_id)
            .ok_or(StratumError::InvalidJobId)?;

        let nonce = params.nonce.to_lowercase();
        if !is_valid_nonce(&nonce) {
            return Err(StratumError::MalformedNonce);
        }

        if job.submit(&nonce) {
            miner.record_invalid();
            return Err(StratumError::DuplicateShare);
        }

        let template = match self.templates.current_block_template() {
            Some(template) if template.height == job.height => template,
            _ => {
                warn!(
                    "Stale share for height {} from {}@{}",
                    job.height, miner.id, session.ip
                );
                miner.record_stale();
                return Err(StratumError::BlockExpired);
            }
        };

        let ctx = ShareContext {
            miner: &miner,
            session,
            job: &job,
            template: &template,
            nonce: &nonce,
            result: &params.result,
        };
        match self.share_processor.process_share(&ctx) {
            ShareVerdict::Accepted => Ok(StatusResult::ok()),
            ShareVerdict::Rejected(message) => Err(StratumError::Rejected(message)),
        }
    }

    pub fn handle_keepalived_rpc(&self, params: &KeepAlived) -> Result<StatusResult, StratumError> {
        self.miner(&params.miner_id)?.heartbeat();
        Ok(StatusResult::keepalived())
    }

    pub fn handle_unknown_rpc(&self, session: &Session, method: &str) -> StratumError {
        warn!("Unknown RPC method `{}` from {}", method, session.ip);
        StratumError::InvalidMethod
    }

    /// Pushes a fresh job to every registered session, at most `max_broadcast_concurrency` at
    /// a time. Sessions whose push fails are removed; the others get their deadline re-armed.
    pub async fn broadcast_new_jobs(self: &Arc<Self>) -> BroadcastSummary {
        let template = match self.templates.current_block_template() {
            Some(template) if !self.templates.is_sick() => template,
            _ => return BroadcastSummary::default(),
        };

        let sessions = self.sessions.snapshot();
        info!("Broadcasting new jobs to {} miners", sessions.len());

        let mut pushes = JoinSet::new();
        for session in sessions {
            let permit = match self.broadcast_slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Broadcast slots closed: {e}");
                    break;
                }
            };
            let server = self.clone();
            let template = template.clone();
            pushes.spawn(async move {
                let job = server.issuer.issue_job(&session, &template);
                let pushed = match serde_json::to_value(&job) {
                    Ok(payload) => session.transport().push_message("job", payload).await,
                    Err(e) => Err(PoolError::from(e)),
                };
                drop(permit);
                match pushed {
                    Ok(()) => {
                        session.transport().reset_deadline();
                        true
                    }
                    Err(e) => {
                        warn!(
                            "Job transmit error to {}: {}",
                            session.transport().remote_addr(),
                            e
                        );
                        server.sessions.remove(session.id);
                        false
                    }
                }
            });
        }

        let mut summary = BroadcastSummary::default();
        while let Some(outcome) = pushes.join_next().await {
            match outcome {
                Ok(true) => summary.delivered += 1,
                Ok(false) => summary.dropped += 1,
                Err(e) => {
                    error!("Broadcast task failed: {e}");
                    summary.dropped += 1;
                }
            }
        }
        debug!("Broadcast done: {:?}", summary);
        summary
    }

    /// Polls for a new template and, when one was adopted and `bcast` is set, broadcasts it.
    /// Returns whether a new template was adopted.
    pub async fn refresh_block_template(self: &Arc<Self>, bcast: bool) -> bool {
        let new_block = self.templates.fetch_block_template().await;
        if new_block && bcast {
            self.broadcast_new_jobs().await;
        }
        new_block
    }

    /// Hands a block candidate to the daemon and moves everyone to the next template.
    pub async fn submit_block_candidate(self: &Arc<Self>, candidate: BlockCandidate) -> PoolResult<()> {
        info!(
            "Submitting block at height {} found by {}",
            candidate.height, candidate.miner_id
        );
        self.templates.submit_block(&candidate.blob).await?;
        self.refresh_block_template(true).await;
        Ok(())
    }
}

/// Refresh driver: polls for templates every `interval` and broadcasts new ones.
pub async fn run_template_refresh(
    server: Arc<StratumServer>,
    interval: Duration,
    status_tx: status::Sender,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        server.refresh_block_template(true).await;
        if status_tx.is_closed() {
            break;
        }
    }
}

/// Submits every queued block candidate. Exits when the candidate channel closes.
pub async fn run_block_submitter(
    server: Arc<StratumServer>,
    candidates: async_channel::Receiver<BlockCandidate>,
    status_tx: status::Sender,
) {
    while let Ok(candidate) = candidates.recv().await {
        if let Err(e) = server.submit_block_candidate(candidate).await {
            error!("Block submission failed: {e}");
        }
    }
    status::handle_error(
        &status_tx,
        PoolError::ComponentShutdown("block candidate channel closed".to_string()),
    )
    .await;
}
