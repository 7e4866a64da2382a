//! `pabotprerunmodifier` (SPEC_FULL §2, original `pabot.py`): an optional
//! hook that can rewrite the discovered suite list before planning.
//! Rust cannot dynamically load a Python class the way the original
//! does, so the built-in implementation shells out to an external
//! process, keeping with the "opaque collaborator" treatment the rest of
//! this crate gives the runner and report generator.

use parabot_items::SuiteItem;
use parabot_planner::DryRunDiscoverer;
use std::path::PathBuf;
use std::process::Command;

pub trait PreRunModifier: Send + Sync {
    /// Returns the (possibly reordered, possibly filtered) suite list.
    fn modify(&self, suites: Vec<SuiteItem>) -> Vec<SuiteItem>;
}

/// Default: no modification.
pub struct NoopPreRunModifier;
impl PreRunModifier for NoopPreRunModifier {
    fn modify(&self, suites: Vec<SuiteItem>) -> Vec<SuiteItem> {
        suites
    }
}

/// Parses a `pabotprerunmodifier` spec of the form
/// `executable:arg1:arg2`. The named executable receives the current
/// suite names (one per line) on stdin and is expected to print the new
/// ordering (one name per line, a subset or permutation) on stdout; any
/// name not recognized from the input is dropped with a warning.
pub struct ExternalPreRunModifier {
    pub executable: String,
    pub args: Vec<String>,
}

impl ExternalPreRunModifier {
    pub fn parse(spec: &str) -> Self {
        let mut parts = spec.split(':');
        let executable = parts.next().unwrap_or_default().to_string();
        let args = parts.map(|s| s.to_string()).collect();
        Self { executable, args }
    }
}

impl PreRunModifier for ExternalPreRunModifier {
    fn modify(&self, suites: Vec<SuiteItem>) -> Vec<SuiteItem> {
        let by_name: std::collections::HashMap<&str, &SuiteItem> = suites.iter().map(|s| (s.name.as_str(), s)).collect();
        let input = suites.iter().map(|s| s.name.clone()).collect::<Vec<_>>().join("\n");

        let output = Command::new(&self.executable)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .and_then(|mut child| {
                use std::io::Write;
                if let Some(stdin) = child.stdin.as_mut() {
                    let _ = stdin.write_all(input.as_bytes());
                }
                child.wait_with_output()
            });

        match output {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                let mut reordered = Vec::new();
                for line in text.lines() {
                    if let Some(suite) = by_name.get(line.trim()) {
                        reordered.push((*suite).clone());
                    }
                }
                if reordered.is_empty() {
                    tracing::warn!("pabotprerunmodifier produced no recognizable suites, keeping original order");
                    suites
                } else {
                    reordered
                }
            }
            Ok(out) => {
                tracing::warn!("pabotprerunmodifier exited with {}, keeping original order", out.status);
                suites
            }
            Err(e) => {
                tracing::warn!("pabotprerunmodifier failed to start ({}), keeping original order", e);
                suites
            }
        }
    }
}

/// Applies a [`PreRunModifier`] to the suite list a [`DryRunDiscoverer`]
/// returns, so the hook runs where the original always ran it: after
/// dry-run discovery, before the list is turned into execution items.
pub struct ModifyingDiscoverer<D> {
    pub inner: D,
    pub modifier: Box<dyn PreRunModifier>,
}

impl<D: DryRunDiscoverer> DryRunDiscoverer for ModifyingDiscoverer<D> {
    fn discover(&self, data_sources: &[PathBuf], passthrough_options: &[(String, String)]) -> parabot_planner::Result<Vec<SuiteItem>> {
        let suites = self.inner.discover(data_sources, passthrough_options)?;
        Ok(self.modifier.modify(suites))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_executable_and_positional_args() {
        let m = ExternalPreRunModifier::parse("scripts/reorder.sh:seed=1:desc");
        assert_eq!(m.executable, "scripts/reorder.sh");
        assert_eq!(m.args, vec!["seed=1".to_string(), "desc".to_string()]);
    }

    #[test]
    fn noop_modifier_is_identity() {
        let suites = vec![SuiteItem::new("A"), SuiteItem::new("B")];
        let out = NoopPreRunModifier.modify(suites.clone());
        assert_eq!(out, suites);
    }

    struct FakeDiscoverer(Vec<SuiteItem>);
    impl DryRunDiscoverer for FakeDiscoverer {
        fn discover(&self, _data_sources: &[PathBuf], _passthrough_options: &[(String, String)]) -> parabot_planner::Result<Vec<SuiteItem>> {
            Ok(self.0.clone())
        }
    }

    struct ReverseModifier;
    impl PreRunModifier for ReverseModifier {
        fn modify(&self, mut suites: Vec<SuiteItem>) -> Vec<SuiteItem> {
            suites.reverse();
            suites
        }
    }

    #[test]
    fn modifying_discoverer_applies_modifier_after_discovery() {
        let discoverer = ModifyingDiscoverer {
            inner: FakeDiscoverer(vec![SuiteItem::new("A"), SuiteItem::new("B")]),
            modifier: Box::new(ReverseModifier),
        };
        let suites = discoverer.discover(&[], &[]).unwrap();
        assert_eq!(suites.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["B", "A"]);
    }
}
