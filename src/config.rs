//! Top-level run configuration (SPEC_FULL §1.3): assembled from the
//! orchestrator options C1 extracted out of argv, `ROBOT_OPTIONS`/
//! `ROBOT_SYSLOG_FILE`, and defaults. Orchestrator option *values* are
//! type-checked with `clap`'s derive API (teacher convention), even
//! though the raw argv as a whole is split by the hand-rolled
//! partitioner in `args.rs` rather than handed to clap wholesale — clap
//! cannot model "everything we don't recognize passes through
//! unchanged".

use crate::args::PartitionedArgs;
use crate::logging::LogFormat;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "parabot", about = "Parallel execution orchestrator for Robot Framework-style test suites")]
struct OrchestratorArgs {
    #[arg(long, default_value = "1")]
    processes: String,
    #[arg(long)]
    processtimeout: Option<u64>,
    #[arg(long)]
    pabotlib: bool,
    #[arg(long = "no-pabotlib")]
    no_pabotlib: bool,
    #[arg(long)]
    pabotlibhost: Option<String>,
    #[arg(long)]
    pabotlibport: Option<u16>,
    #[arg(long)]
    resourcefile: Option<PathBuf>,
    #[arg(long)]
    testlevelsplit: bool,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    ordering: Option<PathBuf>,
    #[arg(long)]
    suitesfrom: Option<PathBuf>,
    #[arg(long, default_value = "png")]
    artifacts: String,
    #[arg(long)]
    artifactsinsubfolders: bool,
    #[arg(long)]
    shard: Option<String>,
    #[arg(long)]
    chunk: bool,
    #[arg(long = "no-rebot")]
    no_rebot: bool,
    #[arg(long)]
    hive: Option<String>,
    #[arg(long)]
    help: bool,
    #[arg(long)]
    version: bool,
    #[arg(long)]
    pabotprerunmodifier: Option<String>,
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[derive(Debug, Clone)]
pub enum ProcessCount {
    Fixed(usize),
    All,
}

#[derive(Debug, Clone)]
pub struct ShardSpec {
    pub index: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub processes: ProcessCount,
    pub process_timeout: Option<std::time::Duration>,
    pub pabotlib_enabled: bool,
    pub pabotlib_host: String,
    pub pabotlib_port: u16,
    pub resourcefile: Option<PathBuf>,
    pub testlevelsplit: bool,
    pub verbose: bool,
    pub ordering: Option<PathBuf>,
    pub suitesfrom: Option<PathBuf>,
    pub artifacts: Vec<String>,
    pub artifacts_in_subfolders: bool,
    pub shard: Option<ShardSpec>,
    pub chunk: bool,
    pub no_rebot: bool,
    pub hive: Option<String>,
    pub print_help: bool,
    pub print_version: bool,
    pub pabotprerunmodifier: Option<String>,
    pub log_format: LogFormat,
    pub robot_options: Vec<String>,
    pub robot_syslog_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid --processes value {0:?}")]
    InvalidProcesses(String),
    #[error("invalid --shard value {0:?}, expected i/n")]
    InvalidShard(String),
    #[error(transparent)]
    Clap(#[from] clap::Error),
}

/// Rebuilds a synthetic `--flag value` argv from the orchestrator option
/// map extracted by `args::partition` and runs it through clap for
/// coercion/validation.
pub fn build(orchestrator: &PartitionedArgs) -> Result<RunConfig, ConfigError> {
    let mut synthetic = vec!["parabot".to_string()];
    for (key, value) in &orchestrator.orchestrator {
        synthetic.push(format!("--{}", key));
        if value != "true" {
            synthetic.push(value.clone());
        }
    }
    let parsed = OrchestratorArgs::try_parse_from(&synthetic)?;

    let processes = match parsed.processes.as_str() {
        "all" => ProcessCount::All,
        n => n.parse::<usize>().map(ProcessCount::Fixed).map_err(|_| ConfigError::InvalidProcesses(n.to_string()))?,
    };

    let shard = match &parsed.shard {
        None => None,
        Some(spec) => {
            let (i, n) = spec.split_once('/').ok_or_else(|| ConfigError::InvalidShard(spec.clone()))?;
            let index: usize = i.parse().map_err(|_| ConfigError::InvalidShard(spec.clone()))?;
            let total: usize = n.parse().map_err(|_| ConfigError::InvalidShard(spec.clone()))?;
            Some(ShardSpec { index, total })
        }
    };

    let robot_options = std::env::var("ROBOT_OPTIONS")
        .ok()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let robot_syslog_file = std::env::var("ROBOT_SYSLOG_FILE").ok().map(PathBuf::from);

    Ok(RunConfig {
        processes,
        process_timeout: parsed.processtimeout.map(std::time::Duration::from_secs),
        pabotlib_enabled: !parsed.no_pabotlib,
        pabotlib_host: parsed.pabotlibhost.unwrap_or_else(|| parabot_coordlib::DEFAULT_HOST.to_string()),
        pabotlib_port: parsed.pabotlibport.unwrap_or(parabot_coordlib::DEFAULT_PORT),
        resourcefile: parsed.resourcefile,
        testlevelsplit: parsed.testlevelsplit,
        verbose: parsed.verbose,
        ordering: parsed.ordering,
        suitesfrom: parsed.suitesfrom,
        artifacts: parsed.artifacts.split(',').map(str::to_string).collect(),
        artifacts_in_subfolders: parsed.artifactsinsubfolders,
        shard,
        chunk: parsed.chunk,
        no_rebot: parsed.no_rebot,
        hive: parsed.hive,
        print_help: parsed.help,
        print_version: parsed.version,
        pabotprerunmodifier: parsed.pabotprerunmodifier,
        log_format: if parsed.log_format == "json" { LogFormat::Json } else { LogFormat::Text },
        robot_options,
        robot_syslog_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn orchestrator(pairs: &[(&str, &str)]) -> PartitionedArgs {
        let mut orchestrator = BTreeMap::new();
        for (k, v) in pairs {
            orchestrator.insert(k.to_string(), v.to_string());
        }
        PartitionedArgs { orchestrator, ..Default::default() }
    }

    #[test]
    fn processes_all_is_recognized() {
        let cfg = build(&orchestrator(&[("processes", "all")])).unwrap();
        assert!(matches!(cfg.processes, ProcessCount::All));
    }

    #[test]
    fn processes_numeric_is_parsed() {
        let cfg = build(&orchestrator(&[("processes", "8")])).unwrap();
        assert!(matches!(cfg.processes, ProcessCount::Fixed(8)));
    }

    #[test]
    fn shard_spec_parses_i_of_n() {
        let cfg = build(&orchestrator(&[("shard", "2/5")])).unwrap();
        let shard = cfg.shard.unwrap();
        assert_eq!(shard.index, 2);
        assert_eq!(shard.total, 5);
    }

    #[test]
    fn malformed_shard_is_an_error() {
        assert!(matches!(build(&orchestrator(&[("shard", "nope")])), Err(ConfigError::InvalidShard(_))));
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = build(&orchestrator(&[])).unwrap();
        assert_eq!(cfg.pabotlib_host, "127.0.0.1");
        assert_eq!(cfg.pabotlib_port, 8270);
        assert!(cfg.pabotlib_enabled);
        assert_eq!(cfg.artifacts, vec!["png".to_string()]);
    }
}
