//! Suite-tree splicing (C7, spec §4.7): combines the per-item output
//! artifacts produced by the subprocess driver into one structural
//! result.

use crate::error::Result;
use crate::rewrite::rewrite_references;
use crate::xmltree::{parse_file, Element, Node};
use std::path::Path;

/// Name the coordination library's waiting-keyword stub is recorded
/// under in per-item output; residual artifacts with this name are
/// dropped from the merged tree (spec §4.7 step 5).
const WAITING_KEYWORD_NAME: &str = "_pabot_wait_for_slot_";

/// One per-item output artifact as handed to the merger, tagged with the
/// process-prefix its copied siblings (screenshots, logs) live under, if
/// any (spec §4.7 step 3).
pub struct MergeInput {
    pub path: std::path::PathBuf,
    pub process_prefix: Option<String>,
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub root: Option<Element>,
    /// True once any input failed to parse; promotes the run's exit code
    /// to 252 regardless of otherwise-successful results (spec §7).
    pub abnormal_exit: bool,
}

/// Runs the full C7 algorithm over `inputs` in arrival order.
/// `copied_artifacts` names every file `copy_output_artifacts` copied
/// into the merged report's directory (spec §4.7 step 3) — only
/// references to these filenames get their process-prefix rename
/// applied in `<msg>` bodies.
pub fn merge_all(inputs: &[MergeInput], copied_artifacts: &[String]) -> Result<MergeOutcome> {
    let mut parsed: Vec<(Element, Option<String>)> = Vec::new();
    let mut abnormal_exit = false;

    for input in inputs {
        match parse_and_prepare(&input.path, input.process_prefix.as_deref(), copied_artifacts) {
            Ok(el) => parsed.push((el, input.process_prefix.clone())),
            Err(e) => {
                tracing::warn!("skipping unparsable per-item output {}: {}", input.path.display(), e);
                abnormal_exit = true;
            }
        }
    }

    if parsed.is_empty() {
        return Ok(MergeOutcome { root: None, abnormal_exit: true });
    }

    let mut groups: Vec<(String, Vec<Element>)> = Vec::new();
    for (el, _) in parsed {
        let root_name = root_suite_name(&el);
        if let Some((_, bucket)) = groups.iter_mut().find(|(name, _)| *name == root_name) {
            bucket.push(el);
        } else {
            groups.push((root_name, vec![el]));
        }
    }

    let mut merged_roots: Vec<Element> = Vec::new();
    for (_, mut bucket) in groups {
        let mut base = bucket.remove(0);
        for incoming in bucket {
            splice_suite(&mut base, incoming);
        }
        remove_waiting_keywords(&mut base);
        merged_roots.push(base);
    }

    if merged_roots.len() == 1 {
        Ok(MergeOutcome { root: merged_roots.pop(), abnormal_exit })
    } else {
        let mut wrapper = Element { name: "robot".to_string(), attrs: vec![], children: Vec::new() };
        for root in merged_roots {
            wrapper.children.push(Node::Element(root));
        }
        Ok(MergeOutcome { root: Some(wrapper), abnormal_exit })
    }
}

fn parse_and_prepare(path: &Path, prefix: Option<&str>, copied_artifacts: &[String]) -> Result<Element> {
    let prefix = prefix.unwrap_or_default();
    let mut el = parse_file(path)?;
    el.walk_mut(&mut |e| {
        if e.name == "msg" {
            for child in &mut e.children {
                if let Node::Text(t) = child {
                    *t = rewrite_references(t, prefix, copied_artifacts);
                }
            }
        }
    });
    Ok(el)
}

fn root_suite_name(el: &Element) -> String {
    el.attr("name").unwrap_or_default().to_string()
}

fn same_suite(a: &Element, b: &Element) -> bool {
    a.attr("name") == b.attr("name") && a.attr("source") == b.attr("source")
}

/// Splices `incoming`'s subtree into `base` in place: descend into
/// matching (same name + source) child suites, attach unmatched
/// subtrees verbatim, append setup/teardown keyword lists in arrival
/// order, merge tests by longname, and widen the start/end time bounds.
fn splice_suite(base: &mut Element, incoming: Element) {
    widen_time_bounds(base, &incoming);

    let incoming_kws: Vec<Node> =
        incoming.children.iter().filter(|c| matches!(c, Node::Element(e) if e.name == "kw")).cloned().collect();
    base.children.extend(incoming_kws);

    for child in incoming.children {
        let Node::Element(child_el) = child else { continue };
        match child_el.name.as_str() {
            "suite" => {
                if let Some(existing) = base
                    .children
                    .iter_mut()
                    .filter_map(|c| match c {
                        Node::Element(e) if e.name == "suite" => Some(e),
                        _ => None,
                    })
                    .find(|e| same_suite(e, &child_el))
                {
                    splice_suite(existing, child_el);
                } else {
                    base.children.push(Node::Element(child_el));
                }
            }
            "test" => {
                let longname = child_el.attr("name").unwrap_or_default().to_string();
                let duplicate = base.children.iter().any(|c| matches!(c, Node::Element(e) if e.name == "test" && e.attr("name") == Some(longname.as_str())));
                if !duplicate {
                    base.children.push(Node::Element(child_el));
                }
            }
            "kw" => {} // already folded in above, in arrival order
            _ => {}
        }
    }
}

fn widen_time_bounds(base: &mut Element, incoming: &Element) {
    if let Some(status) = base.children_named_mut("status").next() {
        let incoming_status = incoming.children_named("status").next();
        if let Some(incoming_status) = incoming_status {
            widen_bound(status, incoming_status, "starttime", true);
            widen_bound(status, incoming_status, "endtime", false);
        }
    }
    // Clearing any cached elapsed-time attribute forces downstream
    // consumers to recompute it from the widened start/end bounds.
    for status in base.children_named_mut("status") {
        status.attrs.retain(|(k, _)| k != "elapsed");
    }
}

fn widen_bound(status: &mut Element, incoming: &Element, attr: &str, take_min: bool) {
    let Some(incoming_value) = incoming.attr(attr) else { return };
    match status.attr(attr) {
        None => status.set_attr(attr, incoming_value.to_string()),
        Some(current) => {
            let keep_incoming = if take_min { incoming_value < current } else { incoming_value > current };
            if keep_incoming {
                status.set_attr(attr, incoming_value.to_string());
            }
        }
    }
}

fn remove_waiting_keywords(el: &mut Element) {
    el.children.retain(|c| !matches!(c, Node::Element(e) if e.name == "kw" && e.attr("name") == Some(WAITING_KEYWORD_NAME)));
    for child in &mut el.children {
        if let Node::Element(e) = child {
            remove_waiting_keywords(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmltree::parse_str;

    fn el(xml: &str) -> Element {
        parse_str(xml).unwrap()
    }

    #[test]
    fn splices_matching_child_suite_and_widens_time_bounds() {
        let mut base = el(r#"<suite name="Root" source="r.robot"><status starttime="20260101 10:00:00.000" endtime="20260101 10:00:05.000"/><suite name="Root.A" source="a.robot"><test name="Root.A.T1"></test></suite></suite>"#);
        let incoming = el(r#"<suite name="Root" source="r.robot"><status starttime="20260101 09:59:00.000" endtime="20260101 10:00:10.000"/><suite name="Root.A" source="a.robot"><test name="Root.A.T2"></test></suite></suite>"#);
        splice_suite(&mut base, incoming);

        let status = base.children_named("status").next().unwrap();
        assert_eq!(status.attr("starttime"), Some("20260101 09:59:00.000"));
        assert_eq!(status.attr("endtime"), Some("20260101 10:00:10.000"));

        let inner = base.children_named("suite").next().unwrap();
        assert_eq!(inner.children_named("test").count(), 2);
    }

    #[test]
    fn skips_duplicate_test_by_longname() {
        let mut base = el(r#"<suite name="Root" source="r.robot"><test name="Root.T1"></test></suite>"#);
        let incoming = el(r#"<suite name="Root" source="r.robot"><test name="Root.T1"></test></suite>"#);
        splice_suite(&mut base, incoming);
        assert_eq!(base.children_named("test").count(), 1);
    }

    #[test]
    fn attaches_unmatched_subtree_verbatim() {
        let mut base = el(r#"<suite name="Root" source="r.robot"><suite name="Root.A" source="a.robot"></suite></suite>"#);
        let incoming = el(r#"<suite name="Root" source="r.robot"><suite name="Root.B" source="b.robot"></suite></suite>"#);
        splice_suite(&mut base, incoming);
        let names: Vec<_> = base.children_named("suite").map(|s| s.attr("name").unwrap().to_string()).collect();
        assert_eq!(names, vec!["Root.A", "Root.B"]);
    }

    #[test]
    fn removes_residual_waiting_keyword_artifacts() {
        let mut base = el(r#"<suite name="Root" source="r.robot"><kw name="_pabot_wait_for_slot_"></kw><kw name="Real Keyword"></kw></suite>"#);
        remove_waiting_keywords(&mut base);
        let names: Vec<_> = base.children_named("kw").map(|k| k.attr("name").unwrap().to_string()).collect();
        assert_eq!(names, vec!["Real Keyword"]);
    }

    fn write_output(dir: &std::path::Path, name: &str, xml: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, xml).unwrap();
        path
    }

    #[test]
    fn merge_all_splices_same_root_suite_across_items() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_output(
            dir.path(),
            "1.xml",
            r#"<suite name="Root" source="r.robot"><status starttime="20260101 10:00:00.000" endtime="20260101 10:00:05.000"/><test name="Root.T1"></test></suite>"#,
        );
        let b = write_output(
            dir.path(),
            "2.xml",
            r#"<suite name="Root" source="r.robot"><status starttime="20260101 10:00:03.000" endtime="20260101 10:00:09.000"/><test name="Root.T2"></test></suite>"#,
        );
        let outcome = merge_all(
            &[
                MergeInput { path: a, process_prefix: None },
                MergeInput { path: b, process_prefix: None },
            ],
            &[],
        )
        .unwrap();

        assert!(!outcome.abnormal_exit);
        let root = outcome.root.unwrap();
        assert_eq!(root.attr("name"), Some("Root"));
        assert_eq!(root.children_named("test").count(), 2);
        let status = root.children_named("status").next().unwrap();
        assert_eq!(status.attr("endtime"), Some("20260101 10:00:09.000"));
    }

    #[test]
    fn merge_all_wraps_distinct_root_suites_in_a_synthetic_robot_element() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_output(dir.path(), "1.xml", r#"<suite name="Alpha" source="a.robot"><test name="Alpha.T1"></test></suite>"#);
        let b = write_output(dir.path(), "2.xml", r#"<suite name="Beta" source="b.robot"><test name="Beta.T1"></test></suite>"#);
        let outcome = merge_all(
            &[
                MergeInput { path: a, process_prefix: None },
                MergeInput { path: b, process_prefix: None },
            ],
            &[],
        )
        .unwrap();

        let root = outcome.root.unwrap();
        assert_eq!(root.name, "robot");
        let names: Vec<_> = root.children_named("suite").map(|s| s.attr("name").unwrap().to_string()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn merge_all_promotes_abnormal_exit_when_an_input_fails_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_output(dir.path(), "1.xml", r#"<suite name="Root" source="r.robot"></suite>"#);
        let bad = write_output(dir.path(), "2.xml", "not xml at all <<<");
        let outcome = merge_all(
            &[
                MergeInput { path: good, process_prefix: None },
                MergeInput { path: bad, process_prefix: None },
            ],
            &[],
        )
        .unwrap();

        assert!(outcome.abnormal_exit);
        assert!(outcome.root.is_some());
    }
}
