//! Default [`crate::discovery::SuitesFromReader`] implementation: scans a
//! Robot Framework-shaped `output.xml` for `<suite>`/`<test>` elements and
//! orders them passed-before-failed, longer-elapsed-first (spec §4.2).
//!
//! The report format itself is an out-of-scope opaque contract (spec
//! §1); this only reads the handful of attributes the ordering rule
//! needs and never reinterprets test semantics.

use crate::discovery::SuitesFromReader;
use crate::error::{PlannerError, Result};
use parabot_items::SuiteItem;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::path::Path;

#[derive(Debug, Clone, Default)]
struct DiscoveredSuite {
    name: String,
    tests: Vec<String>,
    suites: Vec<String>,
    passed: bool,
    elapsed_ms: u64,
}

pub struct XmlSuitesFromReader;

impl SuitesFromReader for XmlSuitesFromReader {
    fn read_suites_from(&self, path: &Path) -> Result<Vec<SuiteItem>> {
        let content = std::fs::read_to_string(path).map_err(PlannerError::Io)?;
        let mut suites = parse_output_xml(&content)
            .map_err(|e| PlannerError::Discovery(format!("{}: {}", path.display(), e)))?;
        // passed before failed (failed last), and within each group longer
        // elapsed time first.
        suites.sort_by(|a, b| match a.passed.cmp(&b.passed).reverse() {
            std::cmp::Ordering::Equal => b.elapsed_ms.cmp(&a.elapsed_ms),
            other => other,
        });
        Ok(suites
            .into_iter()
            .map(|s| SuiteItem::with_children(s.name, s.tests, s.suites))
            .collect())
    }
}

fn parse_output_xml(content: &str) -> std::result::Result<Vec<DiscoveredSuite>, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    let mut suites: Vec<DiscoveredSuite> = Vec::new();
    let mut name_stack: Vec<String> = Vec::new();
    let mut current_test: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| e.to_string())? {
            Event::Start(e) | Event::Empty(e) => {
                let local = e.local_name();
                let local = std::str::from_utf8(local.as_ref()).unwrap_or_default();
                let mut name_attr = None;
                let mut status_attr = None;
                let mut elapsed_attr = None;
                for attr in e.attributes().flatten() {
                    let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or_default();
                    let value = attr.unescape_value().unwrap_or_default().to_string();
                    match key {
                        "name" => name_attr = Some(value),
                        "status" => status_attr = Some(value),
                        "elapsed" => elapsed_attr = Some(value),
                        _ => {}
                    }
                }
                match local {
                    "suite" => {
                        let full_name = match (name_stack.last(), &name_attr) {
                            (Some(parent), Some(n)) => format!("{}.{}", parent, n),
                            (None, Some(n)) => n.clone(),
                            _ => continue,
                        };
                        if let Some(parent) = name_stack.last() {
                            if let Some(parent_suite) = suites.iter_mut().find(|s| &s.name == parent) {
                                parent_suite.suites.push(full_name.clone());
                            }
                        }
                        name_stack.push(full_name.clone());
                        suites.push(DiscoveredSuite { name: full_name, passed: true, ..Default::default() });
                    }
                    "test" => {
                        if let (Some(parent), Some(n)) = (name_stack.last(), &name_attr) {
                            let full_name = format!("{}.{}", parent, n);
                            current_test = Some(full_name.clone());
                            if let Some(suite) = suites.iter_mut().find(|s| &s.name == parent) {
                                suite.tests.push(full_name);
                            }
                        }
                    }
                    "status" if current_test.is_some() => {
                        if let Some(parent) = name_stack.last() {
                            if let Some(suite) = suites.iter_mut().find(|s| &s.name == parent) {
                                if status_attr.as_deref() == Some("FAIL") {
                                    suite.passed = false;
                                }
                                if let Some(elapsed) = elapsed_attr.as_deref().and_then(|s| s.parse::<u64>().ok()) {
                                    suite.elapsed_ms += elapsed;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                match std::str::from_utf8(local.as_ref()).unwrap_or_default() {
                    "suite" => {
                        name_stack.pop();
                    }
                    "test" => {
                        current_test = None;
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(suites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn orders_failed_last_and_longer_elapsed_first() {
        let xml = r#"<robot>
          <suite name="Fast">
            <test name="T1"><status status="PASS" elapsed="100"/></test>
          </suite>
          <suite name="Slow">
            <test name="T1"><status status="PASS" elapsed="900"/></test>
          </suite>
          <suite name="Broken">
            <test name="T1"><status status="FAIL" elapsed="50"/></test>
          </suite>
        </robot>"#;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(xml.as_bytes()).unwrap();
        let reader = XmlSuitesFromReader;
        let suites = reader.read_suites_from(f.path()).unwrap();
        let names: Vec<_> = suites.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["Slow", "Fast", "Broken"]);
    }
}
