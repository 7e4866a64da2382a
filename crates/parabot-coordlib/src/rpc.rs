//! Wire protocol (spec §6 "Coordination RPC"): a named keyword
//! invocation with positional args, dispatched through `run_keyword`,
//! plus the introspection methods a Robot Framework remote library
//! advertises (`get_keyword_names`, `get_keyword_arguments`,
//! `get_keyword_documentation`, `stop_remote_server`).

use crate::state::CoordinationState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RunKeywordRequest {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct KeywordResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#return: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KeywordResult {
    pub(crate) fn pass(value: Value) -> Self {
        Self { status: "PASS", r#return: Some(value), error: None }
    }
    pub(crate) fn fail(message: impl Into<String>) -> Self {
        Self { status: "FAIL", r#return: None, error: Some(message.into()) }
    }
}

/// Every keyword this library exposes, in a fixed order (used by
/// `get_keyword_names`).
pub const KEYWORD_NAMES: &[&str] = &[
    "set_parallel_value_for_key",
    "get_parallel_value_for_key",
    "acquire_lock",
    "release_lock",
    "release_locks",
    "acquire_value_set",
    "release_value_set",
    "disable_value_set",
    "get_value_from_set",
    "add_suite_to_execution_queue",
    "get_added_suites",
    "ignore_execution",
    "is_ignored_execution",
    "increase_completed",
    "min_queue_index_executing",
    "only_last_executing",
    "import_shared_library",
    "stop_remote_libraries",
];

pub fn keyword_arguments(name: &str) -> Vec<&'static str> {
    match name {
        "set_parallel_value_for_key" => vec!["key", "value"],
        "get_parallel_value_for_key" => vec!["key"],
        "acquire_lock" => vec!["name", "caller_id"],
        "release_lock" => vec!["name", "caller_id"],
        "release_locks" => vec!["caller_id"],
        "acquire_value_set" => vec!["caller_id", "*tags"],
        "release_value_set" => vec!["caller_id"],
        "disable_value_set" => vec!["set", "caller_id"],
        "get_value_from_set" => vec!["key", "caller_id"],
        "add_suite_to_execution_queue" => vec!["name", "*variables"],
        "get_added_suites" => vec![],
        "ignore_execution" => vec!["caller_id"],
        "is_ignored_execution" => vec!["caller_id"],
        "increase_completed" => vec!["index"],
        "min_queue_index_executing" => vec![],
        "only_last_executing" => vec![],
        "import_shared_library" => vec!["name", "*args"],
        "stop_remote_libraries" => vec![],
        _ => vec![],
    }
}

pub fn keyword_documentation(name: &str) -> &'static str {
    match name {
        "set_parallel_value_for_key" => "Last-write-wins set of a shared key/value pair. Never fails.",
        "get_parallel_value_for_key" => "Returns empty string if the key is absent.",
        "acquire_lock" => "Reentrant per caller; true if free or already owned by caller_id.",
        "release_lock" => "Decrements depth; removes the entry at zero. Fails if caller is not the owner.",
        "release_locks" => "Releases every lock held by caller_id. Tolerates absence.",
        "acquire_value_set" => "Exclusive lease of one configured value set whose tags superset the given tags.",
        "release_value_set" => "Releases the caller's leased value set, if any.",
        "disable_value_set" => "Permanently removes a value set.",
        "get_value_from_set" => "Reads a field of the caller's currently leased value set.",
        "add_suite_to_execution_queue" => "Pushes a dynamic suite descriptor for promotion to a queue item.",
        "get_added_suites" => "Atomically drains the dynamic suite queue.",
        "ignore_execution" => "Marks caller_id's output for suppression from the final result.",
        "is_ignored_execution" => "Checks whether caller_id's output is marked for suppression.",
        "increase_completed" => "Signals completion of the item at the given queue index.",
        "min_queue_index_executing" => "Smallest still-running queue index.",
        "only_last_executing" => "True exactly when only one queue item remains in flight.",
        "import_shared_library" => "Starts (or reuses) a nested remote-library server for name, returns its port.",
        "stop_remote_libraries" => "Stops every nested shared-library server started by import_shared_library.",
        _ => "",
    }
}

pub fn dispatch(state: &Arc<CoordinationState>, req: RunKeywordRequest) -> KeywordResult {
    let args = req.args;
    let arg_str = |i: usize| -> Result<String, String> {
        args.get(i).and_then(Value::as_str).map(str::to_string).ok_or_else(|| format!("argument {} missing", i))
    };
    let arg_u64 = |i: usize| -> Result<u64, String> {
        args.get(i).and_then(Value::as_u64).ok_or_else(|| format!("argument {} missing", i))
    };
    let varargs_from = |i: usize| -> Vec<String> {
        args.iter().skip(i).filter_map(Value::as_str).map(str::to_string).collect()
    };

    match req.name.as_str() {
        "set_parallel_value_for_key" => match (arg_str(0), arg_str(1)) {
            (Ok(k), Ok(v)) => {
                state.set_parallel_value_for_key(k, v);
                KeywordResult::pass(Value::Null)
            }
            (Err(e), _) | (_, Err(e)) => KeywordResult::fail(e),
        },
        "get_parallel_value_for_key" => match arg_str(0) {
            Ok(k) => KeywordResult::pass(Value::String(state.get_parallel_value_for_key(&k))),
            Err(e) => KeywordResult::fail(e),
        },
        "acquire_lock" => match (arg_str(0), arg_str(1)) {
            (Ok(name), Ok(caller)) => KeywordResult::pass(Value::Bool(state.acquire_lock(&name, &caller))),
            (Err(e), _) | (_, Err(e)) => KeywordResult::fail(e),
        },
        "release_lock" => match (arg_str(0), arg_str(1)) {
            (Ok(name), Ok(caller)) => match state.release_lock(&name, &caller) {
                Ok(()) => KeywordResult::pass(Value::Null),
                Err(e) => KeywordResult::fail(e.to_string()),
            },
            (Err(e), _) | (_, Err(e)) => KeywordResult::fail(e),
        },
        "release_locks" => match arg_str(0) {
            Ok(caller) => {
                state.release_locks(&caller);
                KeywordResult::pass(Value::Null)
            }
            Err(e) => KeywordResult::fail(e),
        },
        "acquire_value_set" => match arg_str(0) {
            Ok(caller) => {
                let tags = varargs_from(1);
                match state.acquire_value_set(&caller, &tags) {
                    Ok(Some((name, fields))) => {
                        KeywordResult::pass(serde_json::json!([name, fields]))
                    }
                    Ok(None) => KeywordResult::pass(serde_json::json!([Value::Null, Value::Null])),
                    Err(e) => KeywordResult::fail(e.to_string()),
                }
            }
            Err(e) => KeywordResult::fail(e),
        },
        "release_value_set" => match arg_str(0) {
            Ok(caller) => {
                state.release_value_set(&caller);
                KeywordResult::pass(Value::Null)
            }
            Err(e) => KeywordResult::fail(e),
        },
        "disable_value_set" => match (arg_str(0), arg_str(1)) {
            (Ok(set), Ok(caller)) => {
                state.disable_value_set(&set, &caller);
                KeywordResult::pass(Value::Null)
            }
            (Err(e), _) | (_, Err(e)) => KeywordResult::fail(e),
        },
        "get_value_from_set" => match (arg_str(0), arg_str(1)) {
            (Ok(key), Ok(caller)) => match state.get_value_from_set(&key, &caller) {
                Ok(v) => KeywordResult::pass(Value::String(v)),
                Err(e) => KeywordResult::fail(e.to_string()),
            },
            (Err(e), _) | (_, Err(e)) => KeywordResult::fail(e),
        },
        "add_suite_to_execution_queue" => match arg_str(0) {
            Ok(name) => {
                state.add_suite_to_execution_queue(name, varargs_from(1));
                KeywordResult::pass(Value::Null)
            }
            Err(e) => KeywordResult::fail(e),
        },
        "get_added_suites" => {
            let suites = state.get_added_suites();
            let json = suites
                .into_iter()
                .map(|s| serde_json::json!({"name": s.name, "variables": s.variables}))
                .collect::<Vec<_>>();
            KeywordResult::pass(Value::Array(json))
        }
        "ignore_execution" => match arg_str(0) {
            Ok(caller) => {
                state.ignore_execution(&caller);
                KeywordResult::pass(Value::Null)
            }
            Err(e) => KeywordResult::fail(e),
        },
        "is_ignored_execution" => match arg_str(0) {
            Ok(caller) => KeywordResult::pass(Value::Bool(state.is_ignored_execution(&caller))),
            Err(e) => KeywordResult::fail(e),
        },
        "increase_completed" => match arg_u64(0) {
            Ok(idx) => {
                state.increase_completed(idx);
                KeywordResult::pass(Value::Null)
            }
            Err(e) => KeywordResult::fail(e),
        },
        "min_queue_index_executing" => KeywordResult::pass(
            state.min_queue_index_executing().map(Value::from).unwrap_or(Value::Null),
        ),
        "only_last_executing" => KeywordResult::pass(Value::Bool(state.only_last_executing())),
        other => KeywordResult::fail(format!("unknown keyword {:?}", other)),
    }
}
