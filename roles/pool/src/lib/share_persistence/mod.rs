use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::error::PoolResult;

/// Capacity of the channel between the share pipeline and the file writer.
const SHARE_LOG_CHANNEL_SIZE: usize = 1024;

/// Accounting event produced by the share ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareEvent {
    ShareAccepted {
        miner_id: String,
        ip: String,
        height: u64,
        job_difficulty: u64,
        hash_difficulty: u64,
        round_shares: u64,
        timestamp: i64,
    },
    BlockCandidate {
        miner_id: String,
        height: u64,
        hash_difficulty: u64,
        network_difficulty: u64,
        timestamp: i64,
    },
}

impl std::fmt::Display for ShareEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareEvent::ShareAccepted {
                miner_id,
                ip,
                height,
                job_difficulty,
                hash_difficulty,
                round_shares,
                timestamp,
            } => write!(
                f,
                "ShareAccepted: miner_id: {miner_id}, ip: {ip}, height: {height}, job_difficulty: {job_difficulty}, hash_difficulty: {hash_difficulty}, round_shares: {round_shares}, timestamp: {timestamp}"
            ),
            ShareEvent::BlockCandidate {
                miner_id,
                height,
                hash_difficulty,
                network_difficulty,
                timestamp,
            } => write!(
                f,
                "BlockCandidate: miner_id: {miner_id}, height: {height}, hash_difficulty: {hash_difficulty}, network_difficulty: {network_difficulty}, timestamp: {timestamp}"
            ),
        }
    }
}

/// Appends share events to a file, one line each.
pub struct ShareFileHandler {
    file: tokio::fs::File,
    receiver: async_channel::Receiver<ShareEvent>,
}

impl ShareFileHandler {
    /// Opens `path` in append mode and returns the writer with the persistence handle feeding it.
    pub async fn open(path: &Path) -> PoolResult<(Self, ShareFilePersistence)> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let (sender, receiver) = async_channel::bounded(SHARE_LOG_CHANNEL_SIZE);
        info!("Logging shares to {}", path.display());
        Ok((Self { file, receiver }, ShareFilePersistence::new(sender)))
    }

    /// Writes events until every [`ShareFilePersistence`] handle is dropped.
    pub async fn run(mut self) {
        while let Ok(event) = self.receiver.recv().await {
            self.write_event_to_file(&event).await;
        }
        let _ = self.file.flush().await;
    }

    async fn write_event_to_file(&mut self, event: &ShareEvent) {
        let _ = self
            .file
            .write_all(format!("{event}\n").as_bytes())
            .await
            .map_err(|e| {
                error!(target = "share_file_handler", "{}", e);
            });
    }
}

/// Non-blocking handle used by the share pipeline.
#[derive(Debug, Clone)]
pub struct ShareFilePersistence {
    sender: async_channel::Sender<ShareEvent>,
}

impl ShareFilePersistence {
    pub fn new(sender: async_channel::Sender<ShareEvent>) -> Self {
        Self { sender }
    }

    /// Queues `event`. A full or closed channel drops it.
    pub fn persist_event(&self, event: ShareEvent) {
        let _ = self
            .sender
            .try_send(event)
            .map_err(|e| error!(target = "share_file_persistence", "{}", e));
    }
}
