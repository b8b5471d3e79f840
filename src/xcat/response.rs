//! The JSON envelope xCAT wraps around every REST reply.
//!
//! ```json
//! {"data": [{"info": [...]}, {"data": [...]}, {"errorcode": [...], "error": [...]}]}
//! ```

use serde_json::Value;
use tracing::{error, warn};

use crate::error::{Result, ZvmError};

/// Error text xCAT relays from ssh that does not indicate a failed command.
const IGNORED_WARNINGS: &[&str] = &[
    "Warning: the RSA host key for",
    "Warning: Permanently added",
    "WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED",
];

/// Reply entries grouped by key, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XcatResponse {
    pub info: Vec<Value>,
    pub data: Vec<Value>,
    pub node: Vec<Value>,
    pub errorcode: Vec<Value>,
    pub error: Vec<Value>,
}

pub fn is_ignored_warning(text: &str) -> bool {
    IGNORED_WARNINGS.iter().any(|w| text.contains(w))
}

impl XcatResponse {
    /// Parses a reply body. Unknown error entries fail the call; known ssh
    /// warnings are dropped.
    pub fn load(message: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(message).map_err(|e| {
            error!("xCAT response data is not in JSON format");
            ZvmError::malformed(format!("xCAT response data is not in JSON format: {}", e))
        })?;

        let entries = root
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| ZvmError::malformed("xCAT response has no \"data\" list"))?;

        let mut resp = XcatResponse::default();
        for entry in entries {
            for (key, bucket) in [
                ("info", &mut resp.info),
                ("data", &mut resp.data),
                ("node", &mut resp.node),
                ("errorcode", &mut resp.errorcode),
                ("error", &mut resp.error),
            ] {
                if let Some(v) = entry.get(key).filter(|v| !v.is_null()) {
                    bucket.push(v.clone());
                }
            }
        }

        for err in &resp.error {
            if !is_ignored_warning(&err.to_string()) {
                return Err(ZvmError::no_data(format!("xCAT returned error: {}", message)));
            }
        }

        resp.log_warnings();
        Ok(resp)
    }

    fn log_warnings(&self) {
        for bucket in [&self.info, &self.node, &self.data] {
            let text = Value::Array(bucket.clone()).to_string();
            if text.to_lowercase().contains("warn") {
                warn!("Warning from xCAT: {}", text);
            }
        }
    }

    /// Strings of `data[idx]`, null entries dropped.
    pub fn data_strings(&self, idx: usize) -> Result<Vec<String>> {
        entry_strings(&self.data, idx, "data")
    }

    /// Strings of `info[idx]`, null entries dropped.
    pub fn info_strings(&self, idx: usize) -> Result<Vec<String>> {
        entry_strings(&self.info, idx, "info")
    }

    /// `data[0][0]`, the usual home of a single command's output.
    pub fn first_data_string(&self) -> Result<String> {
        self.data_strings(0)?
            .into_iter()
            .next()
            .ok_or_else(|| ZvmError::malformed("xCAT response data[0] is empty"))
    }
}

fn entry_strings(bucket: &[Value], idx: usize, what: &str) -> Result<Vec<String>> {
    let entry = bucket
        .get(idx)
        .ok_or_else(|| ZvmError::malformed(format!("xCAT response has no {}[{}]", what, idx)))?;

    match entry {
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    ZvmError::malformed(format!("non-string item in {}[{}]: {}", what, idx, v))
                })
            })
            .collect(),
        Value::String(s) => Ok(vec![s.clone()]),
        other => Err(ZvmError::malformed(format!(
            "{}[{}] is not a list: {}",
            what, idx, other
        ))),
    }
}
