use serde::{Deserialize, Serialize};

use crate::json_rpc::{Message, Notification};

pub const STATUS_OK: &str = "OK";
pub const STATUS_KEEPALIVED: &str = "KEEPALIVED";

/// Job descriptor sent in the login reply, as the getjob result and pushed as `job`
/// notification.
///
/// * `blob`: hex encoded hashing blob, opaque to the pool
/// * `target`: hex encoded compact target derived from the job difficulty
/// * `height`: height of the block template the job was derived from
/// * `seed_hash`: proof-of-work seed, when the chain uses one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub blob: String,
    pub target: String,
    pub height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_hash: Option<String>,
}

impl From<JobDescriptor> for Message {
    fn from(job: JobDescriptor) -> Self {
        let params = serde_json::to_value(job).unwrap_or(serde_json::Value::Null);
        Message::Notification(Notification::new("job", params))
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    /// Resolved miner id, to be sent back in every following getjob/submit.
    pub id: String,
    pub job: JobDescriptor,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: String,
}

impl StatusResult {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
        }
    }

    pub fn keepalived() -> Self {
        Self {
            status: STATUS_KEEPALIVED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_notification_omits_missing_seed_hash() {
        let job = JobDescriptor {
            job_id: "12".into(),
            blob: "00ff".into(),
            target: "ffffffff".into(),
            height: 100,
            seed_hash: None,
        };
        match Message::from(job) {
            Message::Notification(n) => {
                assert_eq!(n.method, "job");
                assert_eq!(n.params["height"], json!(100));
                assert!(n.params.get("seed_hash").is_none());
            }
            other => panic!("Expected a notification, got {other:?}"),
        }
    }
}
