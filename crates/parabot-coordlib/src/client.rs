//! Async RPC client used by the scheduler (C5) and, via the subprocess's
//! own runner-side library, by individual test processes.

use crate::error::{CoordError, Result};
use crate::state::AddedSuite;
use serde_json::{json, Value};
use std::net::SocketAddr;

pub struct CoordClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { base_url: format!("http://{}/RPC2", addr), http: reqwest::Client::new() }
    }

    async fn run_keyword(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let resp: Value = self
            .http
            .post(format!("{}/run_keyword", self.base_url))
            .json(&json!({"name": name, "args": args}))
            .send()
            .await
            .map_err(|e| CoordError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| CoordError::Transport(e.to_string()))?;
        if resp.get("status").and_then(Value::as_str) == Some("FAIL") {
            return Err(CoordError::Transport(
                resp.get("error").and_then(Value::as_str).unwrap_or("unknown coordination error").to_string(),
            ));
        }
        Ok(resp.get("return").cloned().unwrap_or(Value::Null))
    }

    pub async fn set_parallel_value_for_key(&self, key: &str, value: &str) -> Result<()> {
        self.run_keyword("set_parallel_value_for_key", vec![json!(key), json!(value)]).await?;
        Ok(())
    }

    pub async fn get_parallel_value_for_key(&self, key: &str) -> Result<String> {
        let v = self.run_keyword("get_parallel_value_for_key", vec![json!(key)]).await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    pub async fn acquire_lock(&self, name: &str, caller_id: &str) -> Result<bool> {
        let v = self.run_keyword("acquire_lock", vec![json!(name), json!(caller_id)]).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    pub async fn release_lock(&self, name: &str, caller_id: &str) -> Result<()> {
        self.run_keyword("release_lock", vec![json!(name), json!(caller_id)]).await?;
        Ok(())
    }

    pub async fn release_locks(&self, caller_id: &str) -> Result<()> {
        self.run_keyword("release_locks", vec![json!(caller_id)]).await?;
        Ok(())
    }

    pub async fn acquire_value_set(&self, caller_id: &str, tags: &[String]) -> Result<Option<String>> {
        let mut args = vec![json!(caller_id)];
        args.extend(tags.iter().map(|t| json!(t)));
        let v = self.run_keyword("acquire_value_set", args).await?;
        let name = v.as_array().and_then(|a| a.first()).and_then(Value::as_str).map(str::to_string);
        Ok(name)
    }

    pub async fn release_value_set(&self, caller_id: &str) -> Result<()> {
        self.run_keyword("release_value_set", vec![json!(caller_id)]).await?;
        Ok(())
    }

    pub async fn disable_value_set(&self, set_name: &str, caller_id: &str) -> Result<()> {
        self.run_keyword("disable_value_set", vec![json!(set_name), json!(caller_id)]).await?;
        Ok(())
    }

    pub async fn get_value_from_set(&self, key: &str, caller_id: &str) -> Result<String> {
        let v = self.run_keyword("get_value_from_set", vec![json!(key), json!(caller_id)]).await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    pub async fn add_suite_to_execution_queue(&self, name: &str, variables: &[String]) -> Result<()> {
        let mut args = vec![json!(name)];
        args.extend(variables.iter().map(|v| json!(v)));
        self.run_keyword("add_suite_to_execution_queue", args).await?;
        Ok(())
    }

    pub async fn get_added_suites(&self) -> Result<Vec<AddedSuite>> {
        let v = self.run_keyword("get_added_suites", vec![]).await?;
        let arr = v.as_array().cloned().unwrap_or_default();
        Ok(arr
            .into_iter()
            .map(|entry| AddedSuite {
                name: entry.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                variables: entry
                    .get("variables")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default(),
            })
            .collect())
    }

    pub async fn ignore_execution(&self, caller_id: &str) -> Result<()> {
        self.run_keyword("ignore_execution", vec![json!(caller_id)]).await?;
        Ok(())
    }

    pub async fn is_ignored_execution(&self, caller_id: &str) -> Result<bool> {
        let v = self.run_keyword("is_ignored_execution", vec![json!(caller_id)]).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    pub async fn increase_completed(&self, index: u64) -> Result<()> {
        self.run_keyword("increase_completed", vec![json!(index)]).await?;
        Ok(())
    }

    pub async fn min_queue_index_executing(&self) -> Result<Option<u64>> {
        let v = self.run_keyword("min_queue_index_executing", vec![]).await?;
        Ok(v.as_u64())
    }

    pub async fn only_last_executing(&self) -> Result<bool> {
        let v = self.run_keyword("only_last_executing", vec![]).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    /// `import_shared_library` (spec §4.4): returns the port of the
    /// nested server hosting `name`, spawning it on first use.
    pub async fn import_shared_library(&self, name: &str, args: &[String]) -> Result<u16> {
        let mut call_args = vec![json!(name)];
        call_args.extend(args.iter().map(|a| json!(a)));
        let v = self.run_keyword("import_shared_library", call_args).await?;
        v.as_u64().map(|p| p as u16).ok_or_else(|| CoordError::Transport("no port returned".to_string()))
    }

    pub async fn stop_remote_libraries(&self) -> Result<()> {
        self.run_keyword("stop_remote_libraries", vec![]).await?;
        Ok(())
    }

    pub async fn stop_remote_server(&self) -> Result<()> {
        self.http
            .post(format!("{}/stop_remote_server", self.base_url))
            .send()
            .await
            .map_err(|e| CoordError::Transport(e.to_string()))?;
        Ok(())
    }
}
