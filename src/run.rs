//! Top-level orchestration: wires C1 (args) → C2/C3 (planner) → C4
//! (coordination server) → C5/C6 (scheduler/driver) → C7 (merger).

use crate::args::{self, PartitionedArgs};
use crate::artifacts::copy_output_artifacts;
use crate::config::{self, ProcessCount, RunConfig};
use crate::exitcode::RunOutcome;
use crate::prerun::{ExternalPreRunModifier, ModifyingDiscoverer, NoopPreRunModifier, PreRunModifier};
use crate::report::{ExternalReportGenerator, ReportGenerator};
use parabot_coordlib::CoordClient;
use parabot_coordlib::CoordinationServer;
use parabot_exec::{
    compute_last_levels, FailurePolicy, QueueItem, RunnerDryRunDiscoverer, RunnerInvocation, Scheduler, SchedulerConfig,
    SubprocessContext,
};
use parabot_merge::{merge_all, write_string, MergeInput};
use parabot_planner::{build_stages, resolve_plan, shard as shard_items, ResolveInputs, Stage, XmlSuitesFromReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub async fn execute(raw_args: Vec<String>) -> RunOutcome {
    let partitioned = match args::partition(&raw_args) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("argument error: {}", e);
            return RunOutcome::FatalConfigOrIo;
        }
    };

    if partitioned.orchestrator.contains_key("help") || partitioned.orchestrator.contains_key("version") {
        print_help_or_version(&partitioned);
        return RunOutcome::HelpOrVersion;
    }

    let mut partitioned = partitioned;
    args::apply_default_name(&mut partitioned);

    if let Err(e) = args::verify_argumentfile_invariance(&raw_args, &partitioned) {
        tracing::error!("argument file invariance check failed: {}", e);
        return RunOutcome::FatalConfigOrIo;
    }

    let cfg = match config::build(&partitioned) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            return RunOutcome::FatalConfigOrIo;
        }
    };

    match run_with_config(&partitioned, &cfg).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("internal error: {:#}", e);
            RunOutcome::Internal
        }
    }
}

fn print_help_or_version(_partitioned: &PartitionedArgs) {
    println!("parabot {}", env!("CARGO_PKG_VERSION"));
    println!("Parallel execution orchestrator for Robot Framework-style test suites");
}

async fn run_with_config(partitioned: &PartitionedArgs, cfg: &RunConfig) -> anyhow::Result<RunOutcome> {
    let work_dir = std::env::current_dir()?;
    let results_dir = work_dir.join("pabot_results");
    if results_dir.exists() {
        std::fs::remove_dir_all(&results_dir)?;
    }
    std::fs::create_dir_all(&results_dir)?;

    if partitioned.data_sources.is_empty() {
        tracing::error!("no data sources given");
        return Ok(RunOutcome::FatalConfigOrIo);
    }

    let coord_server = if cfg.pabotlib_enabled {
        Some(CoordinationServer::start(&cfg.pabotlib_host, cfg.pabotlib_port, cfg.resourcefile.as_deref()).await?)
    } else {
        None
    };
    let coord_addr = coord_server.as_ref().map(|s| s.local_addr);

    let runner_executable = resolve_runner_executable(partitioned, cfg);
    let pre_run_modifier: Box<dyn PreRunModifier> = match &cfg.pabotprerunmodifier {
        Some(spec) => Box::new(ExternalPreRunModifier::parse(spec)),
        None => Box::new(NoopPreRunModifier),
    };
    let discoverer = ModifyingDiscoverer {
        inner: RunnerDryRunDiscoverer { executable: runner_executable.clone() },
        modifier: pre_run_modifier,
    };
    let suitesfrom_reader = XmlSuitesFromReader;

    let resolve_inputs = ResolveInputs {
        data_sources: &partitioned.data_sources,
        passthrough_options: &partitioned.passthrough,
        testlevelsplit: cfg.testlevelsplit,
        suitesfrom: cfg.suitesfrom.as_deref(),
        work_dir: &work_dir,
        run_empty_suite: partitioned.passthrough.iter().any(|(k, v)| k == "runemptysuite" && v != "false"),
    };

    let plan_result = resolve_plan(&resolve_inputs, &discoverer, &suitesfrom_reader);
    let items = match plan_result {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("plan resolution failed: {}", e);
            if let Some(server) = coord_server {
                server.shutdown().await;
            }
            return Ok(RunOutcome::FatalConfigOrIo);
        }
    };

    let items = if let Some(ordering_path) = &cfg.ordering {
        match std::fs::read_to_string(ordering_path) {
            Ok(content) => {
                let ordering: Vec<_> = content
                    .lines()
                    .filter_map(|l| parabot_items::ExecutionItem::parse_line(l).ok())
                    .collect();
                parabot_planner::apply_ordering(&items, &ordering)
            }
            Err(e) => {
                tracing::error!("failed to read ordering file {}: {}", ordering_path.display(), e);
                if let Some(server) = coord_server {
                    server.shutdown().await;
                }
                return Ok(RunOutcome::FatalConfigOrIo);
            }
        }
    } else {
        items
    };

    let items = if let Some(spec) = &cfg.shard {
        match shard_items(&items, spec.index, spec.total) {
            Ok(sharded) => sharded,
            Err(e) => {
                tracing::error!("sharding failed: {}", e);
                if let Some(server) = coord_server {
                    server.shutdown().await;
                }
                return Ok(RunOutcome::FatalConfigOrIo);
            }
        }
    } else {
        items
    };

    let pool_size = match cfg.processes {
        ProcessCount::Fixed(n) => n.max(1),
        ProcessCount::All => num_cpus::get(),
    };

    // `--chunk` only groups suites when no explicit ordering file pins
    // their layout (original `pabot.py`: `if chunk and not ordering`).
    let items = if cfg.chunk && cfg.ordering.is_none() {
        parabot_planner::chunk_suites(&items, pool_size)
    } else {
        items
    };

    let stages = match build_stages(&items) {
        Ok(stages) => stages,
        Err(e) => {
            tracing::error!("dependency planning failed: {}", e);
            if let Some(server) = coord_server {
                server.shutdown().await;
            }
            return Ok(RunOutcome::FatalConfigOrIo);
        }
    };

    let queue_items = build_queue_items(&stages, &results_dir, cfg.process_timeout, &partitioned.argumentfiles);
    let stage_sizes: Vec<usize> =
        stages.iter().map(|s| s.len() * partitioned.argumentfiles.len().max(1)).collect();

    let caller_id = uuid::Uuid::new_v4().to_string();
    let coord_client = Arc::new(CoordClient::new(coord_addr.unwrap_or_else(|| "127.0.0.1:8270".parse().unwrap())));

    let scheduler_config = SchedulerConfig {
        pool_size,
        failure_policy: FailurePolicy::Skip,
        invocation: RunnerInvocation { executable: runner_executable, hive_endpoint: cfg.hive.clone() },
        context: SubprocessContext {
            caller_id,
            pabotlib_uri: format!("{}:{}", cfg.pabotlib_host, cfg.pabotlib_port),
            execution_pool_id: 0,
            is_last_execution_in_pool: true,
            num_processes: pool_size as u32,
        },
    };
    let scheduler = Scheduler::new(scheduler_config, coord_client);

    let run_result = tokio::select! {
        result = scheduler.run(queue_items, &stage_sizes) => result,
        _ = tokio::signal::ctrl_c() => {
            scheduler.interrupt_handle().store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![])
        }
    };

    let results = run_result?;

    if let Some(server) = coord_server {
        server.shutdown().await;
    }

    if cfg.no_rebot {
        return Ok(RunOutcome::NoRebotShortCircuit);
    }

    let copied_artifacts = copy_output_artifacts(&results_dir, &cfg.artifacts, cfg.artifacts_in_subfolders)?;
    let merge_inputs: Vec<MergeInput> = results
        .iter()
        .map(|r| MergeInput { path: r.outs_dir.join("output.xml"), process_prefix: process_prefix_for(&r.outs_dir, &results_dir) })
        .collect();
    let merge_outcome = merge_all(&merge_inputs, &copied_artifacts)?;

    if let Some(root) = &merge_outcome.root {
        let output_xml = results_dir.join("output.xml");
        std::fs::write(&output_xml, write_string(root))?;
        let report_name = partitioned.passthrough.iter().find(|(k, _)| k == "name").map(|(_, v)| v.clone()).unwrap_or_else(|| "Suites".to_string());
        let report_generator = ExternalReportGenerator::default();
        if let Err(e) = report_generator.generate(&output_xml, &results_dir, &report_name) {
            tracing::warn!("report generator failed to run: {}", e);
        }
    }

    let failed = results
        .iter()
        .filter(|r| matches!(r.outcome, parabot_exec::Outcome::Fail | parabot_exec::Outcome::TimedOut))
        .count() as u32;
    let interrupted = results.iter().any(|r| matches!(r.outcome, parabot_exec::Outcome::Interrupted));

    if merge_outcome.abnormal_exit {
        Ok(RunOutcome::FatalConfigOrIo)
    } else if interrupted {
        Ok(RunOutcome::Interrupted)
    } else if failed > 0 {
        Ok(RunOutcome::FailedTests(failed))
    } else {
        Ok(RunOutcome::Success)
    }
}

/// Derives the process-prefix an item's copied artifacts (and its
/// `<msg>` references to them) were renamed under: the first path
/// component of its output directory relative to `results_dir`, the
/// same per-item folder name `copy_output_artifacts` used as a prefix.
fn process_prefix_for(outs_dir: &Path, results_dir: &Path) -> Option<String> {
    let rel = outs_dir.strip_prefix(results_dir).ok()?;
    rel.components().next().map(|c| c.as_os_str().to_string_lossy().to_string())
}

fn resolve_runner_executable(partitioned: &PartitionedArgs, _cfg: &RunConfig) -> Vec<String> {
    partitioned.command_override.clone().unwrap_or_else(|| vec!["robot".to_string()])
}

/// Builds the scheduler's flat `QueueItem` list. `last_level` is computed
/// once per *base* item name (spec §4.5) since it describes a property of
/// the suite tree, not of a particular argument-file variant; when
/// `argumentfiles` names more than one file each item is expanded into
/// one `QueueItem` per `(slot, path)` pair, re-run against every variant
/// (spec §3 "argfile slot", §4.1 `argumentfileN`).
fn build_queue_items(
    stages: &[Stage],
    results_dir: &PathBuf,
    timeout: Option<std::time::Duration>,
    argumentfiles: &std::collections::BTreeMap<u8, PathBuf>,
) -> Vec<QueueItem> {
    let base_names: Vec<String> = stages.iter().flat_map(|s| s.iter().map(|i| i.display_name())).collect();
    let last_levels = compute_last_levels(&base_names);

    let slots: Vec<Option<(u32, PathBuf)>> = if argumentfiles.is_empty() {
        vec![None]
    } else {
        argumentfiles.iter().map(|(n, path)| Some((*n as u32, path.clone()))).collect()
    };

    let mut queue_items = Vec::with_capacity(base_names.len() * slots.len());
    let mut index = 0u64;
    let mut base_idx = 0usize;
    for stage in stages {
        for scheduled in stage {
            let base_name = base_names[base_idx].clone();
            let last_level = last_levels[base_idx].clone();
            for slot in &slots {
                let display_name = match slot {
                    Some((_, path)) => format!("{} {{{}}}", base_name, path.display()),
                    None => base_name.clone(),
                };
                queue_items.push(QueueItem {
                    index,
                    node: scheduled.node.clone(),
                    outs_dir: results_dir.clone(),
                    argfile_slot: slot.clone(),
                    runner_cmd_prefix: vec![],
                    timeout,
                    sleep_before_start: std::time::Duration::from_secs(scheduled.sleep_before_start as u64),
                    skip: false,
                    last_level: last_level.clone(),
                    display_name,
                    base_name: base_name.clone(),
                    depends: scheduled.depends.clone(),
                });
                index += 1;
            }
            base_idx += 1;
        }
    }
    queue_items
}
