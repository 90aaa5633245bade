use serde_json::{json, Value};
use std::convert::TryFrom;

use crate::{
    json_rpc::{Message, StandardRequest},
    methods::{optional_str, required_str, ParsingMethodError},
};

#[cfg(test)]
use quickcheck::{Arbitrary, Gen};

fn params_object(msg: &StandardRequest) -> Result<&serde_json::Map<String, Value>, ParsingMethodError> {
    msg.params
        .as_object()
        .ok_or_else(|| ParsingMethodError::not_object_from_value(msg.params.clone()))
}

/// _login({"login": "...", "pass": "...", "agent": "..."})_
///
/// The login string is a composite of the payout address and optional worker id, payment id and
/// fixed difficulty, joined by the separators the pool is configured with. The reply carries the
/// resolved miner id and the first job.
#[derive(Debug, Clone, PartialEq)]
pub struct Login {
    pub id: Value,
    pub login: String,
    pub pass: Option<String>,
    pub agent: Option<String>,
}

impl From<Login> for Message {
    fn from(login: Login) -> Self {
        Message::StandardRequest(StandardRequest {
            id: login.id,
            method: "login".into(),
            params: json!({
                "login": login.login,
                "pass": login.pass,
                "agent": login.agent,
            }),
        })
    }
}

impl TryFrom<StandardRequest> for Login {
    type Error = ParsingMethodError;

    fn try_from(msg: StandardRequest) -> Result<Self, Self::Error> {
        let params = params_object(&msg)?;
        let login = required_str(params, "login")?;
        let pass = optional_str(params, "pass")?;
        let agent = optional_str(params, "agent")?;
        Ok(Self {
            id: msg.id,
            login,
            pass,
            agent,
        })
    }
}

#[cfg(test)]
impl Arbitrary for Login {
    fn arbitrary(g: &mut Gen) -> Self {
        Login {
            id: Value::from(u64::arbitrary(g)),
            login: String::arbitrary(g),
            pass: Option::<String>::arbitrary(g),
            agent: Option::<String>::arbitrary(g),
        }
    }
}

#[cfg(test)]
#[quickcheck_macros::quickcheck]
fn login_from_to_json_rpc(login: Login) -> bool {
    let request = match Message::from(login.clone()) {
        Message::StandardRequest(s) => s,
        _ => panic!(),
    };
    login == Login::try_from(request).unwrap()
}

/// _getjob({"id": "<miner id>"})_
///
/// Asks for a fresh job for the connection. The miner id is the one returned by login.
#[derive(Debug, Clone, PartialEq)]
pub struct GetJob {
    pub id: Value,
    pub miner_id: String,
}

impl From<GetJob> for Message {
    fn from(get_job: GetJob) -> Self {
        Message::StandardRequest(StandardRequest {
            id: get_job.id,
            method: "getjob".into(),
            params: json!({ "id": get_job.miner_id }),
        })
    }
}

impl TryFrom<StandardRequest> for GetJob {
    type Error = ParsingMethodError;

    fn try_from(msg: StandardRequest) -> Result<Self, Self::Error> {
        let miner_id = required_str(params_object(&msg)?, "id")?;
        Ok(Self {
            id: msg.id,
            miner_id,
        })
    }
}

/// _submit({"id": "<miner id>", "job_id": "...", "nonce": "xxxxxxxx", "result": "<hash>"})_
///
/// Miners submit shares using the method "submit". The nonce is 8 hex characters; the result is
/// the hash the miner computed over the job blob with that nonce.
#[derive(Debug, Clone, PartialEq)]
pub struct Submit {
    pub id: Value,
    pub miner_id: String,
    pub job_id: String,
    pub nonce: String,
    pub result: String,
}

impl From<Submit> for Message {
    fn from(submit: Submit) -> Self {
        Message::StandardRequest(StandardRequest {
            id: submit.id,
            method: "submit".into(),
            params: json!({
                "id": submit.miner_id,
                "job_id": submit.job_id,
                "nonce": submit.nonce,
                "result": submit.result,
            }),
        })
    }
}

impl TryFrom<StandardRequest> for Submit {
    type Error = ParsingMethodError;

    fn try_from(msg: StandardRequest) -> Result<Self, Self::Error> {
        let params = params_object(&msg)?;
        let miner_id = required_str(params, "id")?;
        let job_id = required_str(params, "job_id")?;
        let nonce = required_str(params, "nonce")?;
        // Some miners leave the result out; verification then rejects the share instead of the
        // request being malformed.
        let result = optional_str(params, "result")?.unwrap_or_default();
        Ok(Self {
            id: msg.id,
            miner_id,
            job_id,
            nonce,
            result,
        })
    }
}

/// _keepalived({"id": "<miner id>"})_
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAlived {
    pub id: Value,
    pub miner_id: String,
}

impl From<KeepAlived> for Message {
    fn from(keep_alived: KeepAlived) -> Self {
        Message::StandardRequest(StandardRequest {
            id: keep_alived.id,
            method: "keepalived".into(),
            params: json!({ "id": keep_alived.miner_id }),
        })
    }
}

impl TryFrom<StandardRequest> for KeepAlived {
    type Error = ParsingMethodError;

    fn try_from(msg: StandardRequest) -> Result<Self, Self::Error> {
        let miner_id = required_str(params_object(&msg)?, "id")?;
        Ok(Self {
            id: msg.id,
            miner_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: Value) -> StandardRequest {
        StandardRequest {
            id: json!(1),
            method: method.into(),
            params,
        }
    }

    #[test]
    fn login_requires_login_field() {
        let err = Login::try_from(request("login", json!({ "pass": "x" }))).unwrap_err();
        assert_eq!(err, ParsingMethodError::MissingField("login"));
    }

    #[test]
    fn submit_without_result_parses_with_empty_result() {
        let submit = Submit::try_from(request(
            "submit",
            json!({ "id": "addr", "job_id": "4", "nonce": "0000abcd" }),
        ))
        .unwrap();
        assert_eq!(submit.job_id, "4");
        assert_eq!(submit.nonce, "0000abcd");
        assert!(submit.result.is_empty());
    }

    #[test]
    fn submit_rejects_numeric_nonce() {
        let err = Submit::try_from(request(
            "submit",
            json!({ "id": "addr", "job_id": "4", "nonce": 1234 }),
        ))
        .unwrap_err();
        assert!(matches!(err, ParsingMethodError::ValueNotAString("nonce", _)));
    }

    #[test]
    fn getjob_reads_miner_id() {
        let get_job = GetJob::try_from(request("getjob", json!({ "id": "addr~rig" }))).unwrap();
        assert_eq!(get_job.miner_id, "addr~rig");
    }
}
