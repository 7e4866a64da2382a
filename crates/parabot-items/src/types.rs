//! The execution item data model (spec §3).
//!
//! Each variant owns its own plan-line serialization and its own
//! contribution to the runner command line, selected by the enum tag
//! rather than by subclass dispatch — this keeps plan-file round-tripping
//! exhaustive over a `match`.

use crate::error::{ItemsError, Result};
use std::collections::BTreeMap;

/// A single `key:value` variable binding injected with `--variable`.
pub type VariableBinding = String;

/// Options accumulated for a runner subprocess invocation. Mirrors the
/// Python `modify_options_for_executor(options)` contract: each item type
/// folds itself into this bag before the subprocess driver (C6) turns it
/// into an argument file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerOptions {
    pub suite: Vec<String>,
    pub test: Vec<String>,
    pub include: Vec<String>,
    pub variable: Vec<VariableBinding>,
    pub rerunfailed: Option<String>,
}

/// A runnable suite, named by dotted longname, with optional known
/// children used for the "contains" / "difference" conflict resolution in
/// `_fix_items` (spec §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteItem {
    pub name: String,
    pub depends: Vec<String>,
    pub tests: Vec<String>,
    pub suites: Vec<String>,
}

impl SuiteItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), depends: Vec::new(), tests: Vec::new(), suites: Vec::new() }
    }

    pub fn with_children(name: impl Into<String>, tests: Vec<String>, suites: Vec<String>) -> Self {
        Self { name: name.into(), depends: Vec::new(), tests, suites }
    }

    fn line(&self) -> String {
        render_runnable_line("suite", &self.name, &self.depends)
    }

    /// True if `other`'s dotted name is this suite or a descendant of it.
    pub fn contains_name(&self, other: &str) -> bool {
        names_equal(&self.name, other) || other.starts_with(&format!("{}.", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestItem {
    pub name: String,
    pub depends: Vec<String>,
}

impl TestItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), depends: Vec::new() }
    }

    fn line(&self) -> String {
        render_runnable_line("test", &self.name, &self.depends)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicTestItem {
    pub name: String,
    pub parent_suite_name: String,
}

impl DynamicTestItem {
    fn line(&self) -> String {
        format!("DYNAMICTEST {} :: {}", self.parent_suite_name, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicSuiteItem {
    pub name: String,
    pub variable_bindings: Vec<VariableBinding>,
}

/// A "chunk" produced by dry-run discovery: a batch of suites that the
/// scheduler runs as a single subprocess (spec §3, §9 chunking open
/// question).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteItemsChunk {
    pub suites: Vec<SuiteItem>,
}

/// Tagged variant over every kind of thing that can appear in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionItem {
    Suite(SuiteItem),
    Test(TestItem),
    DynamicTest(DynamicTestItem),
    DynamicSuite(DynamicSuiteItem),
    Include(String),
    Wait,
    GroupStart,
    GroupEnd,
    Sleep(u32),
    SuiteItems(SuiteItemsChunk),
}

impl ExecutionItem {
    pub fn is_wait(&self) -> bool {
        matches!(self, ExecutionItem::Wait)
    }

    pub fn is_group_bracket(&self) -> bool {
        matches!(self, ExecutionItem::GroupStart | ExecutionItem::GroupEnd)
    }

    /// The runnable's type tag, used for equality, group-kind checks and
    /// plan-file dispatch. `None` for non-runnable tokens (Wait, group
    /// brackets, Sleep).
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            ExecutionItem::Suite(_) => Some("suite"),
            ExecutionItem::Test(_) => Some("test"),
            ExecutionItem::DynamicTest(_) => Some("dynamictest"),
            ExecutionItem::DynamicSuite(_) => Some("dynamicsuite"),
            ExecutionItem::Include(_) => Some("include"),
            ExecutionItem::SuiteItems(_) => Some("suiteitems"),
            ExecutionItem::Wait | ExecutionItem::GroupStart | ExecutionItem::GroupEnd | ExecutionItem::Sleep(_) => None,
        }
    }

    /// Dotted longname, where applicable.
    pub fn name(&self) -> Option<&str> {
        match self {
            ExecutionItem::Suite(s) => Some(&s.name),
            ExecutionItem::Test(t) => Some(&t.name),
            ExecutionItem::DynamicTest(d) => Some(&d.name),
            ExecutionItem::DynamicSuite(d) => Some(&d.name),
            ExecutionItem::Include(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn depends(&self) -> &[String] {
        match self {
            ExecutionItem::Suite(s) => &s.depends,
            ExecutionItem::Test(t) => &t.depends,
            _ => &[],
        }
    }

    /// Serialize this item as one `.pabotsuitenames` payload line (§6).
    pub fn line(&self) -> String {
        match self {
            ExecutionItem::Suite(s) => s.line(),
            ExecutionItem::Test(t) => t.line(),
            ExecutionItem::DynamicTest(d) => d.line(),
            ExecutionItem::DynamicSuite(d) => render_runnable_line("dynamicsuite", &d.name, &[]),
            ExecutionItem::Include(tag) => format!("--include {}", tag),
            ExecutionItem::Wait => "#WAIT".to_string(),
            ExecutionItem::GroupStart => "{".to_string(),
            ExecutionItem::GroupEnd => "}".to_string(),
            ExecutionItem::Sleep(secs) => format!("#SLEEP {}", secs),
            ExecutionItem::SuiteItems(chunk) => {
                chunk.suites.iter().map(|s| s.line()).collect::<Vec<_>>().join(" && ")
            }
        }
    }

    /// Fold this item's contribution into the accumulating runner options
    /// (C6 contract).
    pub fn modify_options_for_executor(&self, options: &mut RunnerOptions) {
        match self {
            ExecutionItem::Suite(s) => options.suite.push(s.name.clone()),
            ExecutionItem::Test(t) => {
                options.rerunfailed = None;
                options.test.push(escape_test_name(&t.name));
            }
            ExecutionItem::DynamicTest(d) => {
                options.suite.push(d.parent_suite_name.clone());
                options.variable.push(format!("DYNAMICTEST:{}", d.name));
            }
            ExecutionItem::DynamicSuite(d) => {
                options.suite.push(d.name.clone());
                options.variable.extend(d.variable_bindings.iter().cloned());
            }
            ExecutionItem::Include(tag) => options.include.push(tag.clone()),
            ExecutionItem::SuiteItems(chunk) => {
                for s in &chunk.suites {
                    options.suite.push(s.name.clone());
                }
            }
            ExecutionItem::Wait | ExecutionItem::GroupStart | ExecutionItem::GroupEnd | ExecutionItem::Sleep(_) => {}
        }
    }

    /// Parse one payload line of the plan grammar (§6). `#DEPENDS` may
    /// repeat.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "#WAIT" {
            return Ok(ExecutionItem::Wait);
        }
        if line == "{" {
            return Ok(ExecutionItem::GroupStart);
        }
        if line == "}" {
            return Ok(ExecutionItem::GroupEnd);
        }
        if let Some(rest) = line.strip_prefix("#SLEEP ") {
            let secs: u32 = rest.trim().parse().map_err(|_| ItemsError::UnrecognizedLine(line.to_string()))?;
            if secs > 3600 {
                return Err(ItemsError::UnrecognizedLine(line.to_string()));
            }
            return Ok(ExecutionItem::Sleep(secs));
        }
        if let Some(rest) = line.strip_prefix("DYNAMICTEST ") {
            let mut parts = rest.splitn(2, " :: ");
            let suite = parts.next().ok_or_else(|| ItemsError::UnrecognizedLine(line.to_string()))?;
            let test = parts.next().ok_or_else(|| ItemsError::UnrecognizedLine(line.to_string()))?;
            return Ok(ExecutionItem::DynamicTest(DynamicTestItem {
                name: test.to_string(),
                parent_suite_name: suite.to_string(),
            }));
        }
        if let Some(rest) = line.strip_prefix("--include ") {
            return Ok(ExecutionItem::Include(rest.trim().to_string()));
        }
        if let Some(rest) = line.strip_prefix("--suite ") {
            let (name, depends) = split_depends(rest);
            return Ok(ExecutionItem::Suite(SuiteItem { name, depends, tests: Vec::new(), suites: Vec::new() }));
        }
        if let Some(rest) = line.strip_prefix("--test ") {
            let (name, depends) = split_depends(rest);
            return Ok(ExecutionItem::Test(TestItem { name, depends }));
        }
        Err(ItemsError::UnrecognizedLine(line.to_string()))
    }
}

fn split_depends(rest: &str) -> (String, Vec<String>) {
    const DEPENDS_KEYWORD: &str = "#DEPENDS";
    if let Some(idx) = rest.find(DEPENDS_KEYWORD) {
        let name = rest[..idx].trim().to_string();
        let deps = rest[idx + DEPENDS_KEYWORD.len()..]
            .split(DEPENDS_KEYWORD)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        (name, deps)
    } else {
        (rest.trim().to_string(), Vec::new())
    }
}

fn render_runnable_line(kind: &str, name: &str, depends: &[String]) -> String {
    let mut line = format!("--{} {}", kind, name);
    for dep in depends {
        line.push_str(" #DEPENDS ");
        line.push_str(dep);
    }
    line
}

fn escape_test_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '[' | '?' | '*' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

/// `SuiteItem.__eq__` tolerance from spec §9: two dotted names are equal
/// if one ends with `.` + the other. Load-bearing for preserve-order.
pub fn names_equal(a: &str, b: &str) -> bool {
    a == b || a.ends_with(&format!(".{}", b)) || b.ends_with(&format!(".{}", a))
}

/// A flat plan is a `Vec<ExecutionItem>` as read from or written to the
/// `.pabotsuitenames` payload. `fold_groups` collapses `{ … }` brackets
/// into `Group` nodes for downstream consumption, checking invariants 1–2
/// of spec §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    Single(ExecutionItem),
    Group(Vec<ExecutionItem>),
}

impl PlanNode {
    pub fn is_wait(&self) -> bool {
        matches!(self, PlanNode::Single(ExecutionItem::Wait))
    }

    pub fn display_name(&self) -> String {
        match self {
            PlanNode::Single(item) => item.name().map(str::to_string).unwrap_or_else(|| item.line()),
            PlanNode::Group(items) => {
                let mut name = String::from("Group_");
                for item in items {
                    if let Some(n) = item.name() {
                        name.push('_');
                        name.push_str(n);
                    }
                }
                name
            }
        }
    }
}

pub fn fold_groups(flat: &[ExecutionItem]) -> Result<Vec<PlanNode>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < flat.len() {
        match &flat[i] {
            ExecutionItem::GroupStart => {
                let mut inner = Vec::new();
                let mut kind: Option<&'static str> = None;
                i += 1;
                loop {
                    match flat.get(i) {
                        Some(ExecutionItem::GroupEnd) => {
                            i += 1;
                            break;
                        }
                        Some(ExecutionItem::Wait) => return Err(ItemsError::WaitInGroup),
                        Some(item) => {
                            if let Some(k) = item.kind() {
                                match kind {
                                    None => kind = Some(k),
                                    Some(existing) if existing != k => return Err(ItemsError::MixedGroupKind),
                                    _ => {}
                                }
                            }
                            inner.push(item.clone());
                            i += 1;
                        }
                        None => return Err(ItemsError::UnrecognizedLine("unterminated group".to_string())),
                    }
                }
                out.push(PlanNode::Group(inner));
            }
            ExecutionItem::GroupEnd => {
                return Err(ItemsError::UnrecognizedLine("unmatched }".to_string()));
            }
            other => {
                out.push(PlanNode::Single(other.clone()));
                i += 1;
            }
        }
    }
    Ok(collapse_consecutive_waits(out))
}

/// Invariant 3: no two consecutive Waits, no leading/trailing Wait.
fn collapse_consecutive_waits(nodes: Vec<PlanNode>) -> Vec<PlanNode> {
    let mut out: Vec<PlanNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.is_wait() {
            if out.is_empty() || out.last().map(|n| n.is_wait()).unwrap_or(false) {
                continue;
            }
        }
        out.push(node);
    }
    while out.last().map(|n| n.is_wait()).unwrap_or(false) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_line_round_trips() {
        let item = ExecutionItem::Suite(SuiteItem {
            name: "My.Suite".to_string(),
            depends: vec!["Other.Suite".to_string()],
            tests: vec![],
            suites: vec![],
        });
        let line = item.line();
        assert_eq!(line, "--suite My.Suite #DEPENDS Other.Suite");
        let parsed = ExecutionItem::parse_line(&line).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn dynamictest_line_round_trips() {
        let item = ExecutionItem::DynamicTest(DynamicTestItem {
            name: "Dyn Test".to_string(),
            parent_suite_name: "Parent.Suite".to_string(),
        });
        let line = item.line();
        let parsed = ExecutionItem::parse_line(&line).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn sleep_rejects_out_of_range() {
        assert!(ExecutionItem::parse_line("#SLEEP 3601").is_err());
        assert!(ExecutionItem::parse_line("#SLEEP 3600").is_ok());
    }

    #[test]
    fn group_must_be_single_kind() {
        let flat = vec![
            ExecutionItem::GroupStart,
            ExecutionItem::Suite(SuiteItem::new("A")),
            ExecutionItem::Test(TestItem::new("B")),
            ExecutionItem::GroupEnd,
        ];
        assert!(matches!(fold_groups(&flat), Err(ItemsError::MixedGroupKind)));
    }

    #[test]
    fn wait_cannot_appear_in_group() {
        let flat = vec![ExecutionItem::GroupStart, ExecutionItem::Wait, ExecutionItem::GroupEnd];
        assert!(matches!(fold_groups(&flat), Err(ItemsError::WaitInGroup)));
    }

    #[test]
    fn consecutive_and_boundary_waits_are_elided() {
        let flat = vec![
            ExecutionItem::Wait,
            ExecutionItem::Suite(SuiteItem::new("A")),
            ExecutionItem::Wait,
            ExecutionItem::Wait,
            ExecutionItem::Suite(SuiteItem::new("B")),
            ExecutionItem::Wait,
        ];
        let nodes = fold_groups(&flat).unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(!nodes[0].is_wait());
        assert!(nodes[1].is_wait());
        assert!(!nodes[2].is_wait());
    }

    #[test]
    fn dotted_name_tolerance() {
        assert!(names_equal("Parent.Child", "Child"));
        assert!(names_equal("Child", "Parent.Child"));
        assert!(!names_equal("Xhild", "Child"));
    }
}
