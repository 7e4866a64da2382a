//! `.pabotsuitenames` plan cache file: five header lines plus
//! line-serialized plan (§3, §6).

use crate::error::{ItemsError, Result};
use crate::hashing::{file_hash, xor_hash_lines};
use crate::types::ExecutionItem;
use std::io::Write;
use std::path::Path;

pub const CACHE_FILE_NAME: &str = ".pabotsuitenames";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanHeaders {
    pub datasources: String,
    pub commandlineoptions: String,
    pub suitesfrom: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFile {
    pub headers: PlanHeaders,
    pub items: Vec<ExecutionItem>,
}

impl PlanFile {
    pub fn new(datasources: String, commandlineoptions: String, suitesfrom: String, items: Vec<ExecutionItem>) -> Self {
        let lines: Vec<String> = items.iter().map(ExecutionItem::line).collect();
        let xor = xor_hash_lines(lines.iter().map(String::as_str));
        let file = file_hash(&datasources, &commandlineoptions, &suitesfrom, &xor);
        Self { headers: PlanHeaders { datasources, commandlineoptions, suitesfrom, file }, items }
    }

    /// Re-derive the `file:` hash for the current `items` and headers and
    /// compare against the stored one (§8 invariant 7).
    pub fn verify(&self) -> bool {
        let lines: Vec<String> = self.items.iter().map(ExecutionItem::line).collect();
        let xor = xor_hash_lines(lines.iter().map(String::as_str));
        let expected = file_hash(
            &self.headers.datasources,
            &self.headers.commandlineoptions,
            &self.headers.suitesfrom,
            &xor,
        );
        expected == self.headers.file
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("datasources:{}\n", self.headers.datasources));
        out.push_str(&format!("commandlineoptions:{}\n", self.headers.commandlineoptions));
        out.push_str(&format!("suitesfrom:{}\n", self.headers.suitesfrom));
        out.push_str(&format!("file:{}\n", self.headers.file));
        for item in &self.items {
            out.push_str(&item.line());
            out.push('\n');
        }
        out
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines();
        let datasources = take_header(&mut lines, "datasources:")?;
        let commandlineoptions = take_header(&mut lines, "commandlineoptions:")?;
        let suitesfrom = take_header(&mut lines, "suitesfrom:")?;
        let file = take_header(&mut lines, "file:")?;
        let mut items = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            items.push(ExecutionItem::parse_line(line)?);
        }
        let plan = PlanFile { headers: PlanHeaders { datasources, commandlineoptions, suitesfrom, file }, items };
        if !plan.verify() {
            return Err(ItemsError::HashMismatch);
        }
        Ok(plan)
    }

    /// Atomic write: write to a sibling temp file, then rename over the
    /// target (spec §4.2 step 4).
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        {
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(self.serialize().as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

fn take_header<'a>(lines: &mut std::str::Lines<'a>, prefix: &'static str) -> Result<String> {
    let name: &'static str = prefix.trim_end_matches(':');
    let line = lines.next().ok_or(ItemsError::MissingHeader(name))?;
    line.strip_prefix(prefix).map(str::to_string).ok_or(ItemsError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SuiteItem;

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let items = vec![
            ExecutionItem::Suite(SuiteItem::new("A")),
            ExecutionItem::Wait,
            ExecutionItem::Suite(SuiteItem::new("B")),
        ];
        let plan = PlanFile::new("ds".into(), "co".into(), "sf".into(), items.clone());
        let serialized = plan.serialize();
        let parsed = PlanFile::parse(&serialized).unwrap();
        assert_eq!(parsed.items, items);
        assert_eq!(parsed.headers, plan.headers);
    }

    #[test]
    fn tampered_payload_fails_hash_check() {
        let items = vec![ExecutionItem::Suite(SuiteItem::new("A"))];
        let plan = PlanFile::new("ds".into(), "co".into(), "sf".into(), items);
        let mut serialized = plan.serialize();
        serialized.push_str("--suite Injected\n");
        assert!(matches!(PlanFile::parse(&serialized), Err(ItemsError::HashMismatch)));
    }

    #[test]
    fn missing_header_is_an_error() {
        let content = "datasources:ds\ncommandlineoptions:co\n";
        assert!(matches!(PlanFile::parse(content), Err(ItemsError::MissingHeader(_))));
    }

    #[test]
    fn garbage_payload_line_is_an_error() {
        let items = vec![ExecutionItem::Suite(SuiteItem::new("A"))];
        let plan = PlanFile::new("ds".into(), "co".into(), "sf".into(), items);
        let mut serialized = plan.serialize();
        serialized.push_str("not a recognized line\n");
        assert!(PlanFile::parse(&serialized).is_err());
    }
}
