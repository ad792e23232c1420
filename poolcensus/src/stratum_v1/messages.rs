//! Stratum v1 message types and JSON-RPC serialization.
//!
//! Messages follow the JSON-RPC envelope with Stratum's conventions: requests
//! carry an integer id, notifications carry `"id": null`, replies carry the id
//! of the request they answer plus `result` and `error`.

use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job notification from the pool (`mining.notify`).
///
/// Only the coinbase fragments are needed to audit payouts, so the header
/// fields are carried as the pool sent them and parsed leniently.
#[derive(Debug, Clone, PartialEq)]
pub struct JobNotification {
    pub job_id: String,

    /// Previous block hash, if the pool sent 32 bytes of valid hex
    pub prev_hash: Option<BlockHash>,

    /// First part of the coinbase transaction (before extranonce), hex
    pub coinbase1: String,

    /// Second part of the coinbase transaction (after extranonce), hex
    pub coinbase2: String,

    pub merkle_branches: Vec<String>,
    pub version: Option<String>,
    pub nbits: Option<String>,
    pub ntime: Option<String>,
    pub clean_jobs: bool,
}

impl JobNotification {
    /// Parse from Stratum JSON array parameters.
    ///
    /// Requires job id, prev hash and both coinbase fragments; the remaining
    /// fields are optional because some pools truncate or reorder them and
    /// nothing downstream depends on them.
    pub fn from_stratum_params(params: &[Value]) -> Result<Self, String> {
        if params.len() < 4 {
            return Err("mining.notify params too short".to_string());
        }

        let job_id = match &params[0] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err("job_id not a string".to_string()),
        };

        let prev_hash = params[1].as_str().and_then(|s| parse_block_hash(s).ok());

        let coinbase1 = params[2]
            .as_str()
            .ok_or("coinbase1 not a string")?
            .to_string();
        let coinbase2 = params[3]
            .as_str()
            .ok_or("coinbase2 not a string")?
            .to_string();

        let merkle_branches = params
            .get(4)
            .and_then(Value::as_array)
            .map(|branches| {
                branches
                    .iter()
                    .filter_map(|b| b.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let hex_field = |idx: usize| params.get(idx).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            job_id,
            prev_hash,
            coinbase1,
            coinbase2,
            merkle_branches,
            version: hex_field(5),
            nbits: hex_field(6),
            ntime: hex_field(7),
            clean_jobs: params.get(8).and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

/// Parse a block hash from Stratum's word-swapped hex encoding.
///
/// Stratum v1 sends the previous block hash as eight 4-byte words, each word
/// little-endian internally but hex encoded big-endian. Reversing the bytes
/// within every word yields the internal byte order.
fn parse_block_hash(hex: &str) -> Result<BlockHash, String> {
    let mut bytes = hex::decode(hex).map_err(|e| format!("block hash hex: {}", e))?;
    if bytes.len() != 32 {
        return Err(format!("block hash wrong length: {}", bytes.len()));
    }

    for chunk in bytes.chunks_mut(4) {
        chunk.reverse();
    }

    BlockHash::from_slice(&bytes).map_err(|e| format!("block hash parse: {}", e))
}

/// Parse `mining.set_difficulty` params. Returns `None` for anything that is
/// not a positive number.
pub fn parse_difficulty(params: &Value) -> Option<f64> {
    let diff = params.as_array()?.first()?.as_f64()?;
    (diff > 0.0).then_some(diff)
}

/// Largest extranonce2 accepted from a pool, in bytes. Pools use 2 to 8.
pub const MAX_EXTRANONCE2_SIZE: usize = 16;

/// Parse a pool-supplied extranonce2 size.
///
/// Must be a whole number in `0..=MAX_EXTRANONCE2_SIZE`; pools are not
/// trusted to size our allocations.
pub fn parse_extranonce2_size(value: &Value) -> Result<usize, String> {
    let size = value.as_f64().ok_or("extranonce2_size not a number")?;
    if size.fract() != 0.0 || !(0.0..=MAX_EXTRANONCE2_SIZE as f64).contains(&size) {
        return Err(format!(
            "extranonce2_size {} not a whole number of bytes up to {}",
            value, MAX_EXTRANONCE2_SIZE
        ));
    }
    Ok(size as usize)
}

/// Parse `mining.set_extranonce` params into `(extranonce1, extranonce2_size)`.
pub fn parse_set_extranonce(params: &Value) -> Result<(String, usize), String> {
    let arr = params
        .as_array()
        .ok_or("set_extranonce params not an array")?;
    if arr.len() < 2 {
        return Err("set_extranonce: too few params".to_string());
    }
    let extranonce1 = arr[0].as_str().ok_or("extranonce1 not a string")?;
    let size = parse_extranonce2_size(&arr[1])?;
    Ok((extranonce1.to_string(), size))
}

/// JSON-RPC message envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request or notification from client or server
    Request {
        /// Message ID (null for notifications)
        id: Option<u64>,
        method: String,
        #[serde(default)]
        params: Value,
    },

    /// Reply to a request
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
}

impl JsonRpcMessage {
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        JsonRpcMessage::Request {
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// A notification (request without ID).
    #[cfg(test)]
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        JsonRpcMessage::Request {
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// Render a JSON-RPC error value the way pools usually mean it:
/// `[code, "message", data]` becomes `"message (code)"`.
pub fn describe_rpc_error(error: &Value) -> String {
    match error {
        Value::Array(parts) => {
            let code = parts.first().map(Value::to_string);
            let message = parts.get(1).and_then(Value::as_str);
            match (message, code) {
                (Some(msg), Some(code)) => format!("{} ({})", msg, code),
                _ => error.to_string(),
            }
        }
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
