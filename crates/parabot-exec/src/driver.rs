//! Subprocess driver (C6, spec §4.6): builds the runner command line,
//! spawns the child, streams stdout/stderr, enforces timeouts, and
//! reports completion.

use crate::error::{ExecError, Result};
use crate::proctree::kill_tree;
use crate::queueitem::QueueItem;
use parabot_items::RunnerOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Everything the subprocess driver needs to know about the surrounding
/// pool to inject the orchestration variables of spec §4.6.
#[derive(Debug, Clone)]
pub struct SubprocessContext {
    pub caller_id: String,
    pub pabotlib_uri: String,
    pub execution_pool_id: u32,
    pub is_last_execution_in_pool: bool,
    pub num_processes: u32,
}

/// The runner executable and any fixed prefix options (from `--command
/// ... --end-command` or the default runner invocation), spec §4.1/§4.6.
#[derive(Debug, Clone)]
pub struct RunnerInvocation {
    pub executable: Vec<String>,
    pub hive_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    TimedOut,
    Interrupted,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub index: u64,
    pub display_name: String,
    /// Dotted name with no argfile suffix; used to match against other
    /// items' `depends` lists when propagating failure (spec §4.5).
    pub base_name: String,
    /// The per-item output directory this result's `output.xml` lives
    /// under (spec §3 `outs_dir/<argfile-slot?>/<index>/`).
    pub outs_dir: PathBuf,
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

const HEARTBEAT_EVERY_POLLS: u32 = 150;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Builds the per-item effective option set (spec §4.6): the item's own
/// `--suite`/`--test` filter, output directory, suppressed
/// log/report/xunit, terminal coloring off, and the fixed orchestration
/// variables.
pub fn build_runner_options(item: &QueueItem, ctx: &SubprocessContext) -> RunnerOptions {
    let mut options = RunnerOptions::default();
    match &item.node {
        parabot_items::PlanNode::Single(exec_item) => exec_item.modify_options_for_executor(&mut options),
        parabot_items::PlanNode::Group(items) => {
            for exec_item in items {
                exec_item.modify_options_for_executor(&mut options);
            }
        }
    }
    options.variable.push(format!("CALLER_ID:{}", ctx.caller_id));
    options.variable.push(format!("PABOTLIBURI:{}", ctx.pabotlib_uri));
    options.variable.push(format!("PABOTEXECUTIONPOOLID:{}", ctx.execution_pool_id));
    options.variable.push(format!("PABOTISLASTEXECUTIONINPOOL:{}", if ctx.is_last_execution_in_pool { 1 } else { 0 }));
    options.variable.push(format!("PABOTNUMBEROFPROCESSES:{}", ctx.num_processes));
    options.variable.push(format!("PABOTQUEUEINDEX:{}", item.index));
    if let Some(level) = &item.last_level {
        options.variable.push(format!("PABOTLASTLEVEL:{}", level));
    }
    if let Some((_, argfile_path)) = &item.argfile_slot {
        options.variable.push(format!("__pabot_argumentfile:{}", argfile_path.display()));
    }
    options
}

/// Renders an internal argument-file: one switch per line, suppressing
/// `log`/`report`/`xunit` and disabling terminal coloring, with the
/// per-item output directory folded in.
pub fn render_argfile(options: &RunnerOptions, outs_dir: &Path, hive_mode: bool) -> String {
    let mut lines = Vec::new();
    lines.push("--log".to_string());
    lines.push("NONE".to_string());
    lines.push("--report".to_string());
    lines.push("NONE".to_string());
    lines.push("--xunit".to_string());
    lines.push("NONE".to_string());
    lines.push("--consolecolors".to_string());
    lines.push("off".to_string());
    lines.push("--outputdir".to_string());
    // Hive mode runs against a remote back-end that rewrites this literal
    // to its own per-item scratch directory (spec §4.6); the orchestrator
    // has no local filesystem view of that directory to pass a real path.
    if hive_mode {
        lines.push("%OUTPUTDIR%".to_string());
    } else {
        lines.push(outs_dir.display().to_string());
    }
    for suite in &options.suite {
        lines.push("--suite".to_string());
        lines.push(suite.clone());
    }
    for test in &options.test {
        lines.push("--test".to_string());
        lines.push(test.clone());
    }
    for include in &options.include {
        lines.push("--include".to_string());
        lines.push(include.clone());
    }
    for var in &options.variable {
        lines.push("--variable".to_string());
        lines.push(var.clone());
    }
    lines.join("\n") + "\n"
}

/// Writes the argfile for `item` into a temp file beside its outs_dir and
/// builds the command to spawn (spec §4.6).
pub fn build_command(invocation: &RunnerInvocation, item: &QueueItem, argfile_path: &Path) -> Command {
    let mut cmd = Command::new(&invocation.executable[0]);
    cmd.args(&invocation.executable[1..]);
    if let Some((_, slot_path)) = &item.argfile_slot {
        cmd.arg("--argumentfile").arg(slot_path);
    }
    if let Some(endpoint) = &invocation.hive_endpoint {
        cmd.arg("--hive").arg(endpoint);
    }
    cmd.arg("-A").arg(argfile_path);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

/// Spawns the subprocess, streams its stdout/stderr line-by-line into the
/// given log files, honors `timeout`, and reports an interrupt if
/// `interrupted` flips true while running (spec §4.5, §4.6).
pub async fn run_subprocess(
    mut cmd: Command,
    index: u64,
    display_name: &str,
    base_name: &str,
    outs_dir: &Path,
    timeout: Option<Duration>,
    interrupted: &std::sync::atomic::AtomicBool,
    stdout_path: &Path,
    stderr_path: &Path,
) -> Result<RunResult> {
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(ExecError::Io)?;
    let pid = child.id();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_file = tokio::fs::File::create(stdout_path).await?;
    let stderr_file = tokio::fs::File::create(stderr_path).await?;

    let stdout_task = stdout.map(|s| tokio::spawn(stream_to_file(s, stdout_file)));
    let stderr_task = stderr.map(|s| tokio::spawn(stream_to_file(s, stderr_file)));

    let mut polls_since_heartbeat = 0u32;
    let outcome;
    let mut exit_code = None;

    loop {
        let deadline_elapsed = timeout.map(|t| start.elapsed() >= t).unwrap_or(false);
        if deadline_elapsed {
            if let Some(pid) = pid {
                kill_tree(pid);
            }
            let _ = child.kill().await;
            outcome = Outcome::TimedOut;
            break;
        }
        if interrupted.load(std::sync::atomic::Ordering::SeqCst) {
            if let Some(pid) = pid {
                kill_tree(pid);
            }
            let _ = child.kill().await;
            outcome = Outcome::Interrupted;
            break;
        }
        match tokio::time::timeout(POLL_INTERVAL, child.wait()).await {
            Ok(Ok(status)) => {
                exit_code = status.code();
                outcome = if status.success() { Outcome::Pass } else { Outcome::Fail };
                break;
            }
            Ok(Err(e)) => return Err(ExecError::Io(e)),
            Err(_elapsed) => {
                polls_since_heartbeat += 1;
                if polls_since_heartbeat >= HEARTBEAT_EVERY_POLLS {
                    polls_since_heartbeat = 0;
                    tracing::info!("item {} still running after {:?}", index, start.elapsed());
                }
            }
        }
    }

    if let Some(t) = stdout_task {
        let _ = t.await;
    }
    if let Some(t) = stderr_task {
        let _ = t.await;
    }

    Ok(RunResult {
        index,
        display_name: display_name.to_string(),
        base_name: base_name.to_string(),
        outs_dir: outs_dir.to_path_buf(),
        outcome,
        exit_code,
        elapsed: start.elapsed(),
    })
}

async fn stream_to_file<R: tokio::io::AsyncRead + Unpin>(reader: R, mut file: tokio::fs::File) {
    use tokio::io::AsyncWriteExt;
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if file.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        let _ = file.write_all(b"\n").await;
    }
}

/// A no-op by default (spec §4.6 "pure size optimization, not
/// semantically required"): post-processes an item's output XML by
/// running the external report generator in prune-only mode when
/// `removekeywords`/`flattenkeywords` were requested.
pub trait OutputPruner: Send + Sync {
    fn prune(&self, output_xml: &Path) -> Result<()>;
}

pub struct NoopPruner;
impl OutputPruner for NoopPruner {
    fn prune(&self, _output_xml: &Path) -> Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
fn _outs_dir_sentinel() -> PathBuf {
    PathBuf::new()
}
