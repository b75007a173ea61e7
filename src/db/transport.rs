//! Database transport seam.
//!
//! The compiler produces [`AqlQuery`] values; something has to run them.
//! That something is a collaborator concern (HTTP client, connection pool,
//! retries all live there), represented here by the [`Transport`] trait.
//! [`MemoryTransport`] is an in-memory implementation for tests or
//! prototyping: it records every statement, replays scripted responses, and
//! emulates the lock and queue-override upsert statements over in-memory
//! tables so the concurrency protocol is exercisable in-process.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::error::Result;

/// One executable statement: query text plus bind variables.
#[derive(Clone, Debug, PartialEq)]
pub struct AqlQuery {
    /// Statement text.
    pub text: String,
    /// Bind variables, referenced as `@name` in the text.
    pub bind_vars: Map<String, Value>,
}

impl AqlQuery {
    /// Statement with no bind variables.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bind_vars: Map::new(),
        }
    }

    /// Adds one bind variable.
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind_vars.insert(name.into(), value);
        self
    }
}

/// Executes statements against the backing database.
///
/// Implementations run one statement per call and return the raw result
/// rows. Transport failures are returned unchanged; this layer never
/// retries.
pub trait Transport: Send + Sync {
    /// Runs one statement, returning its result rows.
    fn run(&self, query: &AqlQuery) -> Result<Vec<Value>>;
}

#[derive(Default)]
struct MemoryState {
    statements: Vec<AqlQuery>,
    responses: VecDeque<Vec<Value>>,
    // Lock emulation: target id -> lock row.
    locks: HashMap<String, Value>,
    // Override emulation: (queue id, candidate id) -> override row.
    overrides: HashMap<(String, String), Value>,
    next_key: u64,
}

/// In-memory transport for tests or prototyping.
///
/// Statements carrying the lock or override protocol's bind-variable
/// signature are interpreted against in-memory tables with the same
/// atomicity the real store provides (one statement, one mutex hold).
/// Everything else pops the next scripted response, or returns an empty
/// row set when the script is exhausted.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    /// Empty transport; all unscripted statements return no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a scripted response, served FIFO to non-protocol statements.
    pub fn push_response(&self, rows: Vec<Value>) {
        self.state.lock().responses.push_back(rows);
    }

    /// Statements run so far, in order.
    pub fn statements(&self) -> Vec<AqlQuery> {
        self.state.lock().statements.clone()
    }

    /// Number of statements run so far.
    pub fn statement_count(&self) -> usize {
        self.state.lock().statements.len()
    }

    /// Current live lock row for a target, if any.
    pub fn lock_row(&self, target: &str) -> Option<Value> {
        self.state.lock().locks.get(target).cloned()
    }

    /// Current override row for a (queue, candidate) pair, if any.
    pub fn override_row(&self, queue: &str, candidate: &str) -> Option<Value> {
        self.state
            .lock()
            .overrides
            .get(&(queue.to_owned(), candidate.to_owned()))
            .cloned()
    }

    fn run_lock_acquire(state: &mut MemoryState, binds: &Map<String, Value>) -> Vec<Value> {
        let target = bind_str(binds, "target");
        let holder = bind_str(binds, "holder");
        let session = bind_str(binds, "session");
        let now = binds.get("now").and_then(Value::as_i64).unwrap_or(0);
        let expires = binds.get("expires").and_then(Value::as_i64).unwrap_or(0);

        if let Some(existing) = state.locks.get(&target) {
            let live = existing.get("IsDeleted") != Some(&Value::Bool(true))
                && existing.get("Expires").and_then(Value::as_i64).unwrap_or(0) > now;
            let mine = existing.get("_from").and_then(Value::as_str) == Some(holder.as_str())
                && existing.get("SecuritySessionId").and_then(Value::as_str)
                    == Some(session.as_str());
            if live && !mine {
                return Vec::new();
            }
        }
        state.next_key += 1;
        let row = json!({
            "_id": format!("locks/{}", state.next_key),
            "_key": state.next_key.to_string(),
            "_from": holder,
            "_to": target,
            "ModelType": "Lock",
            "SecuritySessionId": session,
            "Expires": expires,
            "IsDeleted": false,
        });
        state.locks.insert(target, row.clone());
        vec![row]
    }

    fn run_lock_release(state: &mut MemoryState, binds: &Map<String, Value>) -> Vec<Value> {
        let target = bind_str(binds, "target");
        let holder = bind_str(binds, "holder");
        let session = bind_str(binds, "session");
        if let Some(existing) = state.locks.get(&target).cloned() {
            let mine = existing.get("_from").and_then(Value::as_str) == Some(holder.as_str())
                && existing.get("SecuritySessionId").and_then(Value::as_str)
                    == Some(session.as_str());
            if mine && existing.get("IsDeleted") != Some(&Value::Bool(true)) {
                state.locks.remove(&target);
                return vec![existing];
            }
        }
        Vec::new()
    }

    fn run_override_upsert(state: &mut MemoryState, binds: &Map<String, Value>) -> Vec<Value> {
        let queue = bind_str(binds, "queue");
        let candidate = bind_str(binds, "candidate");
        let on_hold = binds.get("hold").and_then(Value::as_bool).unwrap_or(false);
        let key = (queue.clone(), candidate.clone());
        let row = match state.overrides.get_mut(&key) {
            Some(row) => {
                row["IsOnHold"] = Value::Bool(on_hold);
                row.clone()
            }
            None => {
                state.next_key += 1;
                let row = json!({
                    "_id": format!("queueOverrides/{}", state.next_key),
                    "_from": queue,
                    "_to": candidate,
                    "ModelType": "queueOverrides",
                    "ForcedRank": 0,
                    "IsOnHold": on_hold,
                });
                state.overrides.insert(key, row.clone());
                row
            }
        };
        vec![row]
    }
}

fn bind_str(binds: &Map<String, Value>, name: &str) -> String {
    binds
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

impl Transport for MemoryTransport {
    fn run(&self, query: &AqlQuery) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.statements.push(query.clone());
        let binds = &query.bind_vars;
        let has = |name: &str| binds.contains_key(name);

        let rows = if has("target") && has("expires") && has("now") {
            Self::run_lock_acquire(&mut state, binds)
        } else if has("target") && has("holder") && has("session") {
            Self::run_lock_release(&mut state, binds)
        } else if has("queue") && has("candidate") && has("hold") {
            Self::run_override_upsert(&mut state, binds)
        } else {
            state.responses.pop_front().unwrap_or_default()
        };
        Ok(rows)
    }
}
