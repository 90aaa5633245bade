//! ## Share processing
//!
//! Once a submission has passed the stratum checks (job known, nonce well formed, not a
//! duplicate, not stale) it is handed to a [`ShareProcessor`]. The bundled [`ShareLedger`]
//! measures the share's difficulty through a [`PowVerifier`], updates the miner's counters,
//! records accounting events and queues block candidates for submission.

use tracing::{debug, error, info};

use crate::{
    job::Job,
    miner::Miner,
    session::Session,
    share_persistence::{ShareEvent, ShareFilePersistence},
    template_receiver::BlockTemplate,
    utils::unix_millis,
};

/// Offset of the 4-byte nonce in the hashing blob.
pub const NONCE_OFFSET: usize = 39;

/// Everything known about a submission once it reached proof-of-work verification.
#[derive(Debug, Clone, Copy)]
pub struct ShareContext<'a> {
    pub miner: &'a Miner,
    pub session: &'a Session,
    pub job: &'a Job,
    pub template: &'a BlockTemplate,
    /// Lowercase, 8 hex characters.
    pub nonce: &'a str,
    /// Hash reported by the miner.
    pub result: &'a str,
}

impl ShareContext<'_> {
    /// Job blob with the submitted nonce written in.
    pub fn solved_blob(&self) -> Vec<u8> {
        let mut blob = self.template.blob_with_extra_nonce(self.job.extra_nonce);
        if let Ok(nonce) = hex::decode(self.nonce) {
            if let Some(slot) = blob.get_mut(NONCE_OFFSET..NONCE_OFFSET + nonce.len()) {
                slot.copy_from_slice(&nonce);
            }
        }
        blob
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareVerdict {
    Accepted,
    Rejected(String),
}

/// Final verification and bookkeeping of a share.
pub trait ShareProcessor: Send + Sync {
    fn process_share(&self, ctx: &ShareContext<'_>) -> ShareVerdict;
}

/// Difficulty achieved by a share.
pub trait PowVerifier: Send + Sync {
    /// Returns the difficulty of the hash of `blob`, or the rejection message.
    fn hash_difficulty(&self, blob: &[u8], result: &str) -> Result<u64, String>;
}

/// Trusts the hash reported by the miner and derives its difficulty.
///
/// The hash is a little-endian 256-bit number; its difficulty is approximated from the most
/// significant 64 bits as `u64::MAX / top`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportedHashVerifier;

impl PowVerifier for ReportedHashVerifier {
    fn hash_difficulty(&self, _blob: &[u8], result: &str) -> Result<u64, String> {
        let hash = hex::decode(result)
            .ok()
            .filter(|hash| hash.len() == 32)
            .ok_or_else(|| "Malformed result hash".to_string())?;
        let mut top = [0u8; 8];
        top.copy_from_slice(&hash[24..32]);
        Ok(match u64::from_le_bytes(top) {
            0 => u64::MAX,
            top => u64::MAX / top,
        })
    }
}

/// A share good enough to solve the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCandidate {
    pub height: u64,
    pub miner_id: String,
    pub blob: Vec<u8>,
}

pub struct ShareLedger {
    verifier: Box<dyn PowVerifier>,
    candidates: async_channel::Sender<BlockCandidate>,
    persistence: Option<ShareFilePersistence>,
}

impl ShareLedger {
    pub fn new(
        verifier: Box<dyn PowVerifier>,
        candidates: async_channel::Sender<BlockCandidate>,
        persistence: Option<ShareFilePersistence>,
    ) -> Self {
        Self {
            verifier,
            candidates,
            persistence,
        }
    }

    fn persist(&self, event: ShareEvent) {
        if let Some(persistence) = &self.persistence {
            persistence.persist_event(event);
        }
    }
}

impl ShareProcessor for ShareLedger {
    fn process_share(&self, ctx: &ShareContext<'_>) -> ShareVerdict {
        let blob = ctx.solved_blob();
        let hash_difficulty = match self.verifier.hash_difficulty(&blob, ctx.result) {
            Ok(difficulty) => difficulty,
            Err(message) => {
                ctx.miner.record_invalid();
                return ShareVerdict::Rejected(message);
            }
        };

        if hash_difficulty < ctx.job.difficulty {
            debug!(
                "Low difficulty share from {}@{}: {} < {}",
                ctx.miner.id, ctx.session.ip, hash_difficulty, ctx.job.difficulty
            );
            ctx.miner.record_invalid();
            return ShareVerdict::Rejected("Low difficulty share".to_string());
        }

        ctx.miner.record_valid(ctx.job.difficulty);
        let now = unix_millis();
        self.persist(ShareEvent::ShareAccepted {
            miner_id: ctx.miner.id.clone(),
            ip: ctx.session.ip.clone(),
            height: ctx.job.height,
            job_difficulty: ctx.job.difficulty,
            hash_difficulty,
            round_shares: ctx.miner.round_shares(),
            timestamp: now,
        });

        if hash_difficulty >= ctx.template.difficulty {
            info!(
                "Block candidate at height {} from {}@{}",
                ctx.job.height, ctx.miner.id, ctx.session.ip
            );
            self.persist(ShareEvent::BlockCandidate {
                miner_id: ctx.miner.id.clone(),
                height: ctx.job.height,
                hash_difficulty,
                network_difficulty: ctx.template.difficulty,
                timestamp: now,
            });
            let candidate = BlockCandidate {
                height: ctx.job.height,
                miner_id: ctx.miner.id.clone(),
                blob,
            };
            if let Err(e) = self.candidates.try_send(candidate) {
                error!("Unable to queue block candidate: {e}");
            }
        }

        ShareVerdict::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{identity::Identity, session::tests::session};

    fn miner() -> Miner {
        Miner::new(
            &Identity {
                id: "Addr1".into(),
                address: "Addr1".into(),
                worker_id: String::new(),
                payment_id: String::new(),
                fixed_diff: 0,
            },
            "10.0.0.1",
        )
    }

    fn template(difficulty: u64) -> BlockTemplate {
        BlockTemplate {
            height: 9,
            difficulty,
            prev_hash: "aa".into(),
            blob: vec![0; 76],
            reserved_offset: 50,
            seed_hash: None,
        }
    }

    /// Hash whose top 64 bits are `top`.
    fn hash_with_top(top: u64) -> String {
        let mut hash = [0u8; 32];
        hash[24..32].copy_from_slice(&top.to_le_bytes());
        hex::encode(hash)
    }

    #[test]
    fn reported_hash_difficulty() {
        let verifier = ReportedHashVerifier;
        assert_eq!(
            verifier.hash_difficulty(&[], &hash_with_top(u64::MAX / 1000)),
            Ok(1000)
        );
        assert_eq!(verifier.hash_difficulty(&[], &hash_with_top(0)), Ok(u64::MAX));
        assert_eq!(
            verifier.hash_difficulty(&[], "abcd"),
            Err("Malformed result hash".to_string())
        );
        assert!(verifier.hash_difficulty(&[], &"zz".repeat(32)).is_err());
    }

    #[test]
    fn low_difficulty_share_is_rejected() {
        let (tx, rx) = async_channel::bounded(1);
        let ledger = ShareLedger::new(Box::new(ReportedHashVerifier), tx, None);
        let miner = miner();
        let session = session(1, 4);
        let job = Job::new("1".into(), 9, 5000, 0);
        let template = template(1_000_000);
        let result = hash_with_top(u64::MAX / 100);
        let ctx = ShareContext {
            miner: &miner,
            session: &session,
            job: &job,
            template: &template,
            nonce: "0000abcd",
            result: &result,
        };
        assert_eq!(
            ledger.process_share(&ctx),
            ShareVerdict::Rejected("Low difficulty share".into())
        );
        assert_eq!(miner.invalid_shares(), 1);
        assert_eq!(miner.valid_shares(), 0);
        assert!(rx.is_empty());
    }

    #[test]
    fn accepted_share_is_accounted() {
        let (tx, rx) = async_channel::bounded(1);
        let (events_tx, events_rx) = async_channel::bounded(8);
        let ledger = ShareLedger::new(
            Box::new(ReportedHashVerifier),
            tx,
            Some(ShareFilePersistence::new(events_tx)),
        );
        let miner = miner();
        let session = session(1, 4);
        let job = Job::new("1".into(), 9, 5000, 0);
        let template = template(1_000_000);
        let result = hash_with_top(u64::MAX / 6000);
        let ctx = ShareContext {
            miner: &miner,
            session: &session,
            job: &job,
            template: &template,
            nonce: "0000abcd",
            result: &result,
        };
        assert_eq!(ledger.process_share(&ctx), ShareVerdict::Accepted);
        assert_eq!(miner.valid_shares(), 1);
        assert_eq!(miner.round_shares(), 5000);
        assert!(rx.is_empty());
        assert!(matches!(
            events_rx.try_recv(),
            Ok(ShareEvent::ShareAccepted { height: 9, .. })
        ));
    }

    #[test]
    fn block_solving_share_is_queued_as_candidate() {
        let (tx, rx) = async_channel::bounded(1);
        let ledger = ShareLedger::new(Box::new(ReportedHashVerifier), tx, None);
        let miner = miner();
        let session = session(1, 4);
        let job = Job::new("1".into(), 9, 5000, 0x0a0b_0c0d);
        let template = template(10_000);
        let result = hash_with_top(u64::MAX / 20_000);
        let ctx = ShareContext {
            miner: &miner,
            session: &session,
            job: &job,
            template: &template,
            nonce: "deadbeef",
            result: &result,
        };
        assert_eq!(ledger.process_share(&ctx), ShareVerdict::Accepted);

        let candidate = rx.try_recv().unwrap();
        assert_eq!(candidate.height, 9);
        assert_eq!(&candidate.blob[NONCE_OFFSET..NONCE_OFFSET + 4], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&candidate.blob[50..54], &[0x0a, 0x0b, 0x0c, 0x0d]);
    }
}
