//! Runner-backed [`parabot_planner::DryRunDiscoverer`]: invokes the
//! runner executable in dry-run mode and scans the resulting
//! `output.xml` suite tree (spec §4.2 step 2). Blocking: dry-run
//! discovery happens once, synchronously, before the scheduler starts.

use parabot_items::SuiteItem;
use parabot_planner::{DryRunDiscoverer, PlannerError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct RunnerDryRunDiscoverer {
    pub executable: Vec<String>,
}

impl DryRunDiscoverer for RunnerDryRunDiscoverer {
    fn discover(&self, data_sources: &[PathBuf], passthrough_options: &[(String, String)]) -> Result<Vec<SuiteItem>> {
        let dir = tempfile::tempdir().map_err(PlannerError::Io)?;
        let output_xml = dir.path().join("dryrun_output.xml");

        let mut cmd = Command::new(&self.executable[0]);
        cmd.args(&self.executable[1..]);
        cmd.arg("--dryrun").arg("--outputdir").arg(dir.path()).arg("--output").arg("dryrun_output.xml");
        for (key, value) in passthrough_options {
            if value.is_empty() {
                cmd.arg(format!("--{key}"));
            } else {
                cmd.arg(format!("--{key}")).arg(value);
            }
        }
        for source in data_sources {
            cmd.arg(source);
        }

        let status = cmd.status().map_err(PlannerError::Io)?;
        if !status.success() && !output_xml.exists() {
            return Err(PlannerError::Discovery(format!("runner dry-run exited with {status}")));
        }

        parse_suite_tree(&output_xml)
    }
}

fn parse_suite_tree(path: &Path) -> Result<Vec<SuiteItem>> {
    let content = std::fs::read_to_string(path).map_err(PlannerError::Io)?;
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut stack: Vec<SuiteItem> = Vec::new();
    let mut leaves: Vec<SuiteItem> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| PlannerError::Discovery(e.to_string()))? {
            Event::Start(e) if e.local_name().as_ref() == b"suite" => {
                let name = attr(&e, "name");
                let full_name = match stack.last() {
                    Some(parent) => format!("{}.{}", parent.name, name),
                    None => name,
                };
                stack.push(SuiteItem::new(full_name));
            }
            Event::Start(e) if e.local_name().as_ref() == b"test" => {
                let name = attr(&e, "name");
                if let Some(parent) = stack.last_mut() {
                    parent.tests.push(format!("{}.{}", parent.name, name));
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"suite" => {
                if let Some(finished) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.suites.push(finished.name.clone());
                        leaves.push(finished);
                    } else {
                        leaves.push(finished);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    // Only suites with no nested suites are runnable leaves (spec §4.2
    // step 2: "collect leaf suites").
    let nested_names: std::collections::HashSet<String> =
        leaves.iter().flat_map(|s| s.suites.iter().cloned()).collect();
    Ok(leaves.into_iter().filter(|s| !nested_names.contains(&s.name)).collect())
}

fn attr(e: &quick_xml::events::BytesStart, key: &str) -> String {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| a.unescape_value().unwrap_or_default().to_string())
        .unwrap_or_default()
}
