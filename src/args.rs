//! Argument partitioner (C1, spec §4.1): splits the raw argument vector
//! into orchestrator options, runner passthrough options, and data
//! sources, and enforces the argument-file double-parse invariance
//! check from the original pabot implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Orchestrator-recognized option names (without the leading `--`),
/// spec §4.1. `argumentfileN` (N in 1..9) is matched separately.
const ORCHESTRATOR_FLAGS: &[&str] = &[
    "processes",
    "processtimeout",
    "pabotlib",
    "no-pabotlib",
    "pabotlibhost",
    "pabotlibport",
    "resourcefile",
    "testlevelsplit",
    "verbose",
    "ordering",
    "suitesfrom",
    "artifacts",
    "artifactsinsubfolders",
    "shard",
    "chunk",
    "no-rebot",
    "hive",
    "help",
    "version",
    "pabotprerunmodifier",
    "log-format",
];

/// Options that take no value (boolean switches), spec §4.1.
const BOOLEAN_FLAGS: &[&str] =
    &["pabotlib", "no-pabotlib", "testlevelsplit", "verbose", "artifactsinsubfolders", "chunk", "no-rebot", "help", "version"];

#[derive(Debug, Clone, Default)]
pub struct PartitionedArgs {
    pub orchestrator: BTreeMap<String, String>,
    pub passthrough: Vec<(String, String)>,
    pub data_sources: Vec<PathBuf>,
    pub command_override: Option<Vec<String>>,
    pub argumentfiles: BTreeMap<u8, PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    #[error("conflicting flags: {0} and {1}")]
    Conflicting(String, String),
    #[error("data source {0:?} given inside an argument file")]
    DataSourceInArgFile(String),
    #[error("argument file produced a different data-source list with and without expansion")]
    ArgumentFileInvariance,
    #[error("missing value for --{0}")]
    MissingValue(String),
    #[error("unknown argumentfile index in --{0}")]
    BadArgumentFileIndex(String),
}

type Result<T> = std::result::Result<T, ArgsError>;

/// Partitions a raw argument vector (spec §4.1). `name` defaults to
/// `"Suites"` when more than one data source is given and no explicit
/// name was set in passthrough options — applied by the caller once this
/// returns, since `name` itself is a passthrough option, not an
/// orchestrator one.
pub fn partition(raw_args: &[String]) -> Result<PartitionedArgs> {
    let mut out = PartitionedArgs::default();
    let mut i = 0;
    while i < raw_args.len() {
        let arg = &raw_args[i];

        if arg == "--command" {
            let mut cmd = Vec::new();
            i += 1;
            while i < raw_args.len() && raw_args[i] != "--end-command" {
                cmd.push(raw_args[i].clone());
                i += 1;
            }
            out.command_override = Some(cmd);
            i += 1;
            continue;
        }

        if let Some(flag) = arg.strip_prefix("--") {
            let (name, inline_value) = split_inline_value(flag);

            if let Some(n) = argumentfile_index(name) {
                let (value, consumed) = take_value(raw_args, i, inline_value)?;
                out.argumentfiles.insert(n, PathBuf::from(value));
                i += consumed;
                continue;
            }

            if ORCHESTRATOR_FLAGS.contains(&name) {
                if BOOLEAN_FLAGS.contains(&name) {
                    out.orchestrator.insert(name.to_string(), "true".to_string());
                    i += 1;
                } else {
                    let (value, consumed) = take_value(raw_args, i, inline_value)?;
                    out.orchestrator.insert(name.to_string(), value);
                    i += consumed;
                }
                continue;
            }

            // Unrecognized --flag: passthrough to the runner. Presence of
            // an inline value (`--name=Foo`) or a following bare value
            // decides whether it's boolean-shaped.
            let (value, consumed) = take_value(raw_args, i, inline_value)?;
            out.passthrough.push((name.to_string(), value));
            i += consumed;
            continue;
        }

        out.data_sources.push(PathBuf::from(arg));
        i += 1;
    }

    check_conflicts(&out)?;
    Ok(out)
}

fn split_inline_value(flag: &str) -> (&str, Option<&str>) {
    match flag.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (flag, None),
    }
}

fn argumentfile_index(name: &str) -> Option<u8> {
    let suffix = name.strip_prefix("argumentfile")?;
    if suffix.is_empty() {
        return None;
    }
    let n: u8 = suffix.parse().ok()?;
    (1..=9).contains(&n).then_some(n)
}

fn take_value(raw_args: &[String], i: usize, inline_value: Option<&str>) -> Result<(String, usize)> {
    if let Some(v) = inline_value {
        return Ok((v.to_string(), 1));
    }
    match raw_args.get(i + 1) {
        Some(v) if !v.starts_with("--") => Ok((v.clone(), 2)),
        _ => Ok((String::new(), 1)),
    }
}

fn check_conflicts(parsed: &PartitionedArgs) -> Result<()> {
    if parsed.orchestrator.contains_key("pabotlib") && parsed.orchestrator.contains_key("no-pabotlib") {
        return Err(ArgsError::Conflicting("pabotlib".to_string(), "no-pabotlib".to_string()));
    }
    Ok(())
}

/// Applies the default `name = "Suites"` passthrough option when more
/// than one data source is given and no name was explicitly set (spec
/// §4.1).
pub fn apply_default_name(parsed: &mut PartitionedArgs) {
    if parsed.data_sources.len() > 1 && !parsed.passthrough.iter().any(|(k, _)| k == "name") {
        parsed.passthrough.push(("name".to_string(), "Suites".to_string()));
    }
}

/// Re-parses `raw_args` with argument-file contents expanded inline and
/// compares the resulting data-source list against `without_expansion`'s
/// (spec §4.1, supplemented in SPEC_FULL §2: original `arguments.py`
/// double-parse invariance check). Argument files themselves may not
/// introduce new data sources.
pub fn verify_argumentfile_invariance(raw_args: &[String], without_expansion: &PartitionedArgs) -> Result<()> {
    let mut expanded = Vec::new();
    for arg in raw_args {
        if let Some(path) = arg.strip_prefix('@') {
            let content = std::fs::read_to_string(path).unwrap_or_default();
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                expanded.push(line.to_string());
            }
        } else {
            expanded.push(arg.clone());
        }
    }

    let with_expansion = partition(&expanded)?;
    if with_expansion.data_sources.len() != without_expansion.data_sources.len() {
        return Err(ArgsError::ArgumentFileInvariance);
    }
    for (a, b) in with_expansion.data_sources.iter().zip(&without_expansion.data_sources) {
        if a != b {
            return Err(ArgsError::ArgumentFileInvariance);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_orchestrator_passthrough_and_data_sources() {
        let args = vec!["--processes".to_string(), "4".to_string(), "--include".to_string(), "smoke".to_string(), "suite.robot".to_string()];
        let parsed = partition(&args).unwrap();
        assert_eq!(parsed.orchestrator.get("processes"), Some(&"4".to_string()));
        assert_eq!(parsed.passthrough, vec![("include".to_string(), "smoke".to_string())]);
        assert_eq!(parsed.data_sources, vec![PathBuf::from("suite.robot")]);
    }

    #[test]
    fn boolean_orchestrator_flags_take_no_value() {
        let args = vec!["--testlevelsplit".to_string(), "suite.robot".to_string()];
        let parsed = partition(&args).unwrap();
        assert_eq!(parsed.orchestrator.get("testlevelsplit"), Some(&"true".to_string()));
        assert_eq!(parsed.data_sources, vec![PathBuf::from("suite.robot")]);
    }

    #[test]
    fn conflicting_pabotlib_flags_are_an_error() {
        let args = vec!["--pabotlib".to_string(), "--no-pabotlib".to_string()];
        assert!(matches!(partition(&args), Err(ArgsError::Conflicting(_, _))));
    }

    #[test]
    fn command_end_command_is_captured_verbatim() {
        let args = vec!["--command".to_string(), "java".to_string(), "-jar".to_string(), "robot.jar".to_string(), "--end-command".to_string(), "suite.robot".to_string()];
        let parsed = partition(&args).unwrap();
        assert_eq!(parsed.command_override, Some(vec!["java".to_string(), "-jar".to_string(), "robot.jar".to_string()]));
        assert_eq!(parsed.data_sources, vec![PathBuf::from("suite.robot")]);
    }

    #[test]
    fn default_name_applied_only_for_multiple_sources() {
        let mut parsed = PartitionedArgs { data_sources: vec![PathBuf::from("a.robot"), PathBuf::from("b.robot")], ..Default::default() };
        apply_default_name(&mut parsed);
        assert_eq!(parsed.passthrough, vec![("name".to_string(), "Suites".to_string())]);

        let mut single = PartitionedArgs { data_sources: vec![PathBuf::from("a.robot")], ..Default::default() };
        apply_default_name(&mut single);
        assert!(single.passthrough.is_empty());
    }

    #[test]
    fn argumentfile_index_parses_1_to_9() {
        let args = vec!["--argumentfile3".to_string(), "args.txt".to_string()];
        let parsed = partition(&args).unwrap();
        assert_eq!(parsed.argumentfiles.get(&3), Some(&PathBuf::from("args.txt")));
    }

    #[test]
    fn argumentfile_invariance_accepts_a_file_that_adds_no_data_sources() {
        let dir = tempfile::tempdir().unwrap();
        let argfile = dir.path().join("extra.txt");
        std::fs::write(&argfile, "--include smoke\n# a comment\n").unwrap();

        let raw = vec![format!("@{}", argfile.display()), "suite.robot".to_string()];
        let parsed = partition(&raw).unwrap();
        assert!(verify_argumentfile_invariance(&raw, &parsed).is_ok());
    }

    #[test]
    fn argumentfile_invariance_rejects_a_file_that_smuggles_in_a_data_source() {
        let dir = tempfile::tempdir().unwrap();
        let argfile = dir.path().join("extra.txt");
        std::fs::write(&argfile, "sneaky.robot\n").unwrap();

        let raw = vec![format!("@{}", argfile.display()), "suite.robot".to_string()];
        let parsed = partition(&raw).unwrap();
        assert!(matches!(verify_argumentfile_invariance(&raw, &parsed), Err(ArgsError::ArgumentFileInvariance)));
    }
}
