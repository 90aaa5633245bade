//! ## Jobs
//!
//! A [`Job`] is the work handed to one session for one template: a unique id, the template
//! height, the share difficulty and the extra nonce baked into its blob. [`JobIssuer`] mints
//! jobs and turns them into the descriptor sent on the wire.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use stratum_rpc::server_to_client::JobDescriptor;

use crate::{config::StratumConfig, session::Session, template_receiver::BlockTemplate, utils::Mutex};

#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub height: u64,
    pub difficulty: u64,
    pub extra_nonce: u32,
    submissions: Mutex<HashSet<String>>,
}

impl Job {
    pub fn new(id: String, height: u64, difficulty: u64, extra_nonce: u32) -> Self {
        Self {
            id,
            height,
            difficulty,
            extra_nonce,
            submissions: Mutex::new(HashSet::new()),
        }
    }

    /// Records `nonce` as submitted. Returns true if it already was.
    pub fn submit(&self, nonce: &str) -> bool {
        self.submissions
            .super_safe_lock(|submissions| !submissions.insert(nonce.to_string()))
    }
}

/// Share target as sent to miners: `u32::MAX / difficulty`, 4 bytes little-endian, hex.
pub fn target_hex(difficulty: u64) -> String {
    let target = (u32::MAX as u64 / difficulty.max(1)) as u32;
    hex::encode(target.to_le_bytes())
}

#[derive(Debug)]
pub struct JobIssuer {
    next_job_id: AtomicU64,
    next_extra_nonce: AtomicU32,
    default_difficulty: u64,
    min_fixed_difficulty: u64,
}

impl JobIssuer {
    pub fn new(config: &StratumConfig) -> Self {
        Self {
            next_job_id: AtomicU64::new(1),
            next_extra_nonce: AtomicU32::new(0),
            default_difficulty: config.default_difficulty,
            min_fixed_difficulty: config.min_fixed_difficulty,
        }
    }

    /// The session's fixed difficulty when set and not below the minimum, else the default.
    pub fn effective_difficulty(&self, fixed_diff: u64) -> u64 {
        if fixed_diff != 0 && fixed_diff >= self.min_fixed_difficulty {
            fixed_diff
        } else {
            self.default_difficulty
        }
    }

    /// Mints a job for `session` on `template`, records it in the session's cache and returns
    /// its wire descriptor.
    pub fn issue_job(&self, session: &Session, template: &BlockTemplate) -> JobDescriptor {
        let extra_nonce = self.next_extra_nonce.fetch_add(1, Ordering::Relaxed);
        let job = Arc::new(Job::new(
            self.next_job_id.fetch_add(1, Ordering::Relaxed).to_string(),
            template.height,
            self.effective_difficulty(session.fixed_diff()),
            extra_nonce,
        ));
        session.push_job(job.clone());

        JobDescriptor {
            job_id: job.id.clone(),
            blob: hex::encode(template.blob_with_extra_nonce(extra_nonce)),
            target: target_hex(job.difficulty),
            height: job.height,
            seed_hash: template.seed_hash.clone(),
        }
    }
}
