//! `QueueItem` (spec §3): the scheduler's unit of work, wrapping one
//! `PlanNode` with the bookkeeping the scheduler and subprocess driver
//! need.

use parabot_items::PlanNode;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Monotonically assigned, unique per run; used for ordering pooled
    /// values and completion signaling (spec §3).
    pub index: u64,
    pub node: PlanNode,
    pub outs_dir: PathBuf,
    /// `(slot-id, path)` when this item is re-run against multiple
    /// argument-file variants.
    pub argfile_slot: Option<(u32, PathBuf)>,
    pub runner_cmd_prefix: Vec<String>,
    pub timeout: Option<Duration>,
    pub sleep_before_start: Duration,
    pub skip: bool,
    pub last_level: Option<String>,
    /// Shown to the user and used to name the per-item output directory;
    /// carries an ` {<argfile>}` suffix when `argfile_slot` is set (spec
    /// §3, mirroring the original's per-argfile display form).
    pub display_name: String,
    /// The item's dotted name with no argfile suffix — what `depends`
    /// lists name and what failure-propagation matches against.
    pub base_name: String,
    pub depends: Vec<String>,
}

impl QueueItem {
    pub fn outs_dir_for(&self) -> PathBuf {
        match &self.argfile_slot {
            Some((slot, _)) => self.outs_dir.join(slot.to_string()).join(self.index.to_string()),
            None => self.outs_dir.join(self.index.to_string()),
        }
    }
}

/// Computes `last_level` for every item in `order` (the full, flattened
/// run order — not per-stage): the longest dotted-name prefix an item
/// shares with any *later-scheduled* runnable name, suffixed
/// `.PABOT_noend` when the item is a strict prefix of a later name (spec
/// §4.5). Exposed to the subprocess so its teardown hook knows whether it
/// owns the last execution at a given suite level.
pub fn compute_last_levels(names_in_order: &[String]) -> Vec<Option<String>> {
    let mut out = Vec::with_capacity(names_in_order.len());
    for (i, name) in names_in_order.iter().enumerate() {
        let later = &names_in_order[i + 1..];
        let mut best: Option<String> = None;
        let mut is_strict_prefix_of_later = false;
        for other in later {
            if let Some(prefix) = longest_shared_dotted_prefix(name, other) {
                if best.as_ref().map(|b| prefix.len() > b.len()).unwrap_or(true) {
                    best = Some(prefix);
                }
            }
            if other.starts_with(&format!("{}.", name)) {
                is_strict_prefix_of_later = true;
            }
        }
        out.push(best.map(|p| if is_strict_prefix_of_later { format!("{}.PABOT_noend", p) } else { p }));
    }
    out
}

fn longest_shared_dotted_prefix(a: &str, b: &str) -> Option<String> {
    let a_parts: Vec<&str> = a.split('.').collect();
    let b_parts: Vec<&str> = b.split('.').collect();
    let mut shared = Vec::new();
    for (x, y) in a_parts.iter().zip(b_parts.iter()) {
        if x == y {
            shared.push(*x);
        } else {
            break;
        }
    }
    if shared.is_empty() {
        None
    } else {
        Some(shared.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_prefix_with_sibling_and_marks_strict_prefix() {
        let names = vec!["Parent.A".to_string(), "Parent.B".to_string(), "Parent".to_string()];
        let levels = compute_last_levels(&names);
        assert_eq!(levels[0].as_deref(), Some("Parent"));
        assert_eq!(levels[1].as_deref(), Some("Parent.PABOT_noend"));
        assert_eq!(levels[2], None);
    }

    #[test]
    fn unrelated_names_share_no_prefix() {
        let names = vec!["Alpha.A".to_string(), "Beta.B".to_string()];
        let levels = compute_last_levels(&names);
        assert_eq!(levels, vec![None, None]);
    }
}
