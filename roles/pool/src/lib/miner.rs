//! ## Miner registry
//!
//! A [`Miner`] is one payee identity, shared by every session that logs in with the same
//! composite login. Records are created lazily on first login and live for the whole process.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
};

use crate::{identity::Identity, utils::RwLock, utils::unix_millis};

#[derive(Debug)]
pub struct Miner {
    pub id: String,
    pub address: String,
    pub payment_id: String,
    pub fixed_diff: u64,
    /// Remote IP of the session that created the record.
    pub ip: String,
    last_beat: AtomicI64,
    valid_shares: AtomicU64,
    invalid_shares: AtomicU64,
    stale_shares: AtomicU64,
    round_shares: AtomicU64,
}

impl Miner {
    pub fn new(identity: &Identity, ip: &str) -> Self {
        Self {
            id: identity.id.clone(),
            address: identity.address.clone(),
            payment_id: identity.payment_id.clone(),
            fixed_diff: identity.fixed_diff,
            ip: ip.to_string(),
            last_beat: AtomicI64::new(unix_millis()),
            valid_shares: AtomicU64::new(0),
            invalid_shares: AtomicU64::new(0),
            stale_shares: AtomicU64::new(0),
            round_shares: AtomicU64::new(0),
        }
    }

    pub fn heartbeat(&self) {
        self.last_beat.store(unix_millis(), Ordering::Relaxed);
    }

    pub fn last_beat(&self) -> i64 {
        self.last_beat.load(Ordering::Relaxed)
    }

    pub fn record_valid(&self, difficulty: u64) {
        self.valid_shares.fetch_add(1, Ordering::Relaxed);
        self.round_shares.fetch_add(difficulty, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_shares.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale_shares.fetch_add(1, Ordering::Relaxed);
    }

    pub fn valid_shares(&self) -> u64 {
        self.valid_shares.load(Ordering::Relaxed)
    }

    pub fn invalid_shares(&self) -> u64 {
        self.invalid_shares.load(Ordering::Relaxed)
    }

    pub fn stale_shares(&self) -> u64 {
        self.stale_shares.load(Ordering::Relaxed)
    }

    /// Sum of the difficulties of the valid shares submitted this round.
    pub fn round_shares(&self) -> u64 {
        self.round_shares.load(Ordering::Relaxed)
    }
}

/// Additive map from identity to [`Miner`]. There is no removal.
#[derive(Debug, Default)]
pub struct MinerRegistry {
    miners: RwLock<HashMap<String, Arc<Miner>>>,
}

impl MinerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Miner>> {
        self.miners.super_safe_read(|miners| miners.get(id).cloned())
    }

    /// Returns the miner for `identity`, creating it if absent. The flag is true only for the
    /// caller that inserted the record.
    pub fn get_or_create(&self, identity: &Identity, ip: &str) -> (Arc<Miner>, bool) {
        if let Some(miner) = self.get(&identity.id) {
            return (miner, false);
        }
        self.miners.super_safe_write(|miners| {
            // Another login may have won the race between the two locks.
            if let Some(miner) = miners.get(&identity.id) {
                return (miner.clone(), false);
            }
            let miner = Arc::new(Miner::new(identity, ip));
            miners.insert(identity.id.clone(), miner.clone());
            (miner, true)
        })
    }

    pub fn len(&self) -> usize {
        self.miners.super_safe_read(|miners| miners.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
