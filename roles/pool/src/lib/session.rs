//! ## Sessions
//!
//! A [`Session`] is one miner connection. It owns the cache of jobs recently issued on that
//! connection and a handle to the [`Transport`] used to push messages to the miner.
//! [`SessionRegistry`] holds every session that completed a login and is what broadcasts walk.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::PoolResult,
    job::Job,
    utils::{Mutex, RwLock},
};

/// Outbound side of a miner connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Pushes a server-initiated notification to the miner.
    async fn push_message(&self, method: &str, payload: Value) -> PoolResult<()>;

    /// Re-arms the connection's idle deadline.
    fn reset_deadline(&self);

    fn remote_addr(&self) -> String;
}

pub struct Session {
    pub id: u64,
    pub ip: String,
    /// Fixed difficulty requested at login, 0 for the endpoint default.
    fixed_diff: AtomicU64,
    miner_id: Mutex<Option<String>>,
    jobs: Mutex<VecDeque<Arc<Job>>>,
    backlog: usize,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("ip", &self.ip)
            .field("fixed_diff", &self.fixed_diff())
            .finish()
    }
}

impl Session {
    pub fn new(id: u64, ip: String, backlog: usize, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            ip,
            fixed_diff: AtomicU64::new(0),
            miner_id: Mutex::new(None),
            jobs: Mutex::new(VecDeque::with_capacity(backlog)),
            // The latest job must always be retrievable.
            backlog: backlog.max(1),
            transport,
        }
    }

    pub fn fixed_diff(&self) -> u64 {
        self.fixed_diff.load(Ordering::Relaxed)
    }

    pub fn set_fixed_diff(&self, difficulty: u64) {
        self.fixed_diff.store(difficulty, Ordering::Relaxed);
    }

    pub fn bind_miner(&self, miner_id: &str) {
        self.miner_id
            .super_safe_lock(|id| *id = Some(miner_id.to_string()));
    }

    /// Identity of the miner this session logged in as.
    pub fn miner_id(&self) -> Option<String> {
        self.miner_id.super_safe_lock(|id| id.clone())
    }

    /// Remembers `job`, evicting the oldest one once the backlog is full.
    pub fn push_job(&self, job: Arc<Job>) {
        self.jobs.super_safe_lock(|jobs| {
            if jobs.len() >= self.backlog {
                jobs.pop_front();
            }
            jobs.push_back(job);
        });
    }

    pub fn find_job(&self, job_id: &str) -> Option<Arc<Job>> {
        self.jobs
            .super_safe_lock(|jobs| jobs.iter().rev().find(|job| job.id == job_id).cloned())
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

/// Active sessions by id. Writers (register, remove) are exclusive, snapshots share the lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<Session>) {
        self.sessions
            .super_safe_write(|sessions| sessions.insert(session.id, session));
    }

    /// Returns true if the session was registered.
    pub fn remove(&self, session_id: u64) -> bool {
        self.sessions
            .super_safe_write(|sessions| sessions.remove(&session_id).is_some())
    }

    pub fn contains(&self, session_id: u64) -> bool {
        self.sessions
            .super_safe_read(|sessions| sessions.contains_key(&session_id))
    }

    /// Point-in-time copy of the registered sessions.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .super_safe_read(|sessions| sessions.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.sessions.super_safe_read(|sessions| sessions.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
