//! Helper functions shared by the mock clients

use crate::error::OpenStackError;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock a mock store, recovering the data if a panicking test poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Failure a mock call can be scripted to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Answer with this HTTP status
    Status(u16),
    /// Fail before any response was received
    Transport,
}

impl MockFailure {
    fn into_error(self, op: &str) -> OpenStackError {
        match self {
            MockFailure::Status(code) => {
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                OpenStackError::from_status(status, op, "injected failure")
            }
            MockFailure::Transport => {
                OpenStackError::InvalidResponse(format!("{}: injected transport failure", op))
            }
        }
    }
}

/// Per-operation call counters and queued failures
#[derive(Debug, Clone, Default)]
pub(crate) struct CallBook {
    calls: Arc<Mutex<HashMap<String, usize>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<MockFailure>>>>,
}

impl CallBook {
    /// Count a call to `op` and pop its next scripted failure, if any
    pub(crate) fn record(&self, op: &str) -> Result<(), OpenStackError> {
        *lock(&self.calls).entry(op.to_string()).or_insert(0) += 1;
        match lock(&self.failures).get_mut(op).and_then(VecDeque::pop_front) {
            Some(failure) => Err(failure.into_error(op)),
            None => Ok(()),
        }
    }

    pub(crate) fn inject(&self, op: &str, failure: MockFailure, times: usize) {
        let mut failures = lock(&self.failures);
        let queue = failures.entry(op.to_string()).or_default();
        queue.extend(std::iter::repeat_n(failure, times));
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        lock(&self.calls).get(op).copied().unwrap_or(0)
    }

    pub(crate) fn reset_calls(&self) {
        lock(&self.calls).clear();
    }
}

/// Whether `item` satisfies every `(key, value)` filter the way the API would.
///
/// Scalar fields compare by their string form. A `<name>_id` key that is not a
/// field of its own matches against a `<name>s: [{"id": ..}]` relation list.
/// `fixed_ips` filters take the `"<field>=<value>"` form.
pub(crate) fn matches_filters<T: Serialize>(item: &T, filters: &[(&str, &str)]) -> bool {
    let Ok(value) = serde_json::to_value(item) else {
        return false;
    };
    filters
        .iter()
        .all(|(key, expected)| field_matches(&value, key, expected))
}

fn field_matches(value: &Value, key: &str, expected: &str) -> bool {
    if key == "fixed_ips" {
        let Some((field, wanted)) = expected.split_once('=') else {
            return false;
        };
        return value
            .get("fixed_ips")
            .and_then(Value::as_array)
            .is_some_and(|ips| ips.iter().any(|ip| ip.get(field).and_then(Value::as_str) == Some(wanted)));
    }

    match value.get(key) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        Some(Value::Null) | None => key
            .strip_suffix("_id")
            .and_then(|base| value.get(format!("{}s", base)))
            .and_then(Value::as_array)
            .is_some_and(|refs| {
                refs.iter()
                    .any(|r| r.get("id").and_then(Value::as_str) == Some(expected))
            }),
        _ => false,
    }
}

/// String field of a request body, empty when absent
pub(crate) fn text(body: &Value, key: &str) -> String {
    opt_text(body, key).unwrap_or_default()
}

/// Optional string field of a request body
pub(crate) fn opt_text(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Tags of a request body
pub(crate) fn tags(body: &Value) -> Vec<String> {
    body.get("tags")
        .and_then(|t| serde_json::from_value(t.clone()).ok())
        .unwrap_or_default()
}

pub(crate) fn conflict(what: &str) -> OpenStackError {
    OpenStackError::Conflict(format!("{} already exists", what))
}

pub(crate) fn not_found(what: &str, id: &str) -> OpenStackError {
    OpenStackError::NotFound(format!("{} {} not found", what, id))
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
