//! ## Template Receiver
//!
//! Keeps the pool's view of the current block template. [`TemplateSource`] is the interface the
//! stratum server consumes; [`DaemonTemplateSource`] implements it by polling a node over
//! JSON-RPC.
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    config::PoolConfig,
    error::{PoolError, PoolResult},
    utils::RwLock,
};

pub mod rpc_client;

use rpc_client::{Auth, DaemonRpcClient, GetBlockTemplateReply};

/// Immutable snapshot of the work the pool is currently mining on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub height: u64,
    /// Network difficulty; shares at or above it are block candidates.
    pub difficulty: u64,
    pub prev_hash: String,
    pub blob: Vec<u8>,
    /// Offset of the bytes reserved for the pool's extra nonce.
    pub reserved_offset: usize,
    pub seed_hash: Option<String>,
}

impl BlockTemplate {
    /// Copy of the template blob with `extra_nonce` written big-endian at the reserved offset.
    /// The blob is returned unchanged when the reserved area does not fit.
    pub fn blob_with_extra_nonce(&self, extra_nonce: u32) -> Vec<u8> {
        let mut blob = self.blob.clone();
        let end = self.reserved_offset.saturating_add(4);
        if end <= blob.len() {
            blob[self.reserved_offset..end].copy_from_slice(&extra_nonce.to_be_bytes());
        }
        blob
    }
}

impl TryFrom<GetBlockTemplateReply> for BlockTemplate {
    type Error = PoolError;

    fn try_from(reply: GetBlockTemplateReply) -> Result<Self, Self::Error> {
        let blob = hex::decode(&reply.blocktemplate_blob)
            .map_err(|e| PoolError::Custom(format!("template blob is not hex: {e}")))?;
        Ok(BlockTemplate {
            height: reply.height,
            difficulty: reply.difficulty,
            prev_hash: reply.prev_hash,
            blob,
            reserved_offset: reply.reserved_offset,
            seed_hash: reply.seed_hash,
        })
    }
}

/// Source of block templates and of the pool health signal.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// `None` until a template has been fetched.
    fn current_block_template(&self) -> Option<Arc<BlockTemplate>>;

    /// True while upstream polling keeps failing.
    fn is_sick(&self) -> bool;

    /// Polls upstream. Returns true if a new template was adopted.
    async fn fetch_block_template(&self) -> bool;

    /// Hands a solved block to upstream.
    async fn submit_block(&self, blob: &[u8]) -> PoolResult<()>;
}

pub struct DaemonTemplateSource {
    client: DaemonRpcClient,
    wallet: String,
    reserve_size: u32,
    sick_threshold: u32,
    current: RwLock<Option<Arc<BlockTemplate>>>,
    failures: AtomicU32,
}

impl DaemonTemplateSource {
    pub fn new(config: &PoolConfig) -> PoolResult<Self> {
        if config.daemon.sick_threshold == 0 {
            return Err(PoolError::Custom("sick_threshold must be at least 1".to_string()));
        }
        let url: hyper::Uri = config
            .daemon
            .url
            .parse()
            .map_err(|e| PoolError::Custom(format!("invalid daemon url: {e}")))?;
        let auth = match (&config.daemon.username, &config.daemon.password) {
            (Some(username), Some(password)) => Some(Auth::new(username.clone(), password.clone())),
            _ => None,
        };
        Ok(Self {
            client: DaemonRpcClient::new(
                url,
                auth,
                Duration::from_millis(config.daemon.request_timeout_ms),
            ),
            wallet: config.pool_wallet.clone(),
            reserve_size: config.daemon.reserve_size,
            sick_threshold: config.daemon.sick_threshold,
            current: RwLock::new(None),
            failures: AtomicU32::new(0),
        })
    }

    /// Replaces the current template when the tip moved. Returns true if it did.
    fn adopt(&self, template: BlockTemplate) -> bool {
        self.current.super_safe_write(|current| {
            let changed = match current.as_deref() {
                Some(old) => old.height != template.height || old.prev_hash != template.prev_hash,
                None => true,
            };
            if changed {
                info!(
                    "New block to mine at height {} with difficulty {}",
                    template.height, template.difficulty
                );
                *current = Some(Arc::new(template));
            }
            changed
        })
    }

    fn mark_failure(&self, e: &PoolError) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        error!("Failed to fetch block template: {e}");
        if failures == self.sick_threshold {
            warn!("Daemon unreachable for {failures} polls, pool is now sick");
        }
    }

    fn mark_success(&self) {
        if self.failures.swap(0, Ordering::Relaxed) >= self.sick_threshold {
            info!("Daemon reachable again, pool is healthy");
        }
    }
}

#[async_trait]
impl TemplateSource for DaemonTemplateSource {
    fn current_block_template(&self) -> Option<Arc<BlockTemplate>> {
        self.current.super_safe_read(|current| current.clone())
    }

    fn is_sick(&self) -> bool {
        self.failures.load(Ordering::Relaxed) >= self.sick_threshold
    }

    async fn fetch_block_template(&self) -> bool {
        let fetched = self
            .client
            .get_block_template(&self.wallet, self.reserve_size)
            .await
            .map_err(PoolError::from)
            .and_then(BlockTemplate::try_from);
        match fetched {
            Ok(template) => {
                self.mark_success();
                self.adopt(template)
            }
            Err(e) => {
                self.mark_failure(&e);
                false
            }
        }
    }

    async fn submit_block(&self, blob: &[u8]) -> PoolResult<()> {
        let reply = self.client.submit_block(hex::encode(blob)).await?;
        debug!("submitblock answered {:?}", reply.status);
        Ok(())
    }
}
