//! `--chunk` support (spec §4.1/§6, §9 open question): groups the plan's
//! suite items into roughly `processes`-sized batches that the scheduler
//! then runs one batch per subprocess, instead of one suite per
//! subprocess. Test items and non-runnable tokens (`Wait`, group
//! brackets, `Sleep`, `Include`) are left untouched and also act as
//! chunk-group boundaries, so a chunk never straddles a `#WAIT` or a
//! `{ }` block.
//!
//! Chunk size follows the original's rounding rule exactly: `round(len /
//! processes)`, falling back to `1` when that rounds down to zero (spec
//! §9 "preserve that").

use parabot_items::{ExecutionItem, SuiteItem, SuiteItemsChunk};

/// Regroups contiguous runs of `Suite` items into `SuiteItems` chunks of
/// `processes`-derived size. `processes == 0` is treated as `1`.
pub fn chunk_suites(items: &[ExecutionItem], processes: usize) -> Vec<ExecutionItem> {
    let processes = processes.max(1);
    let mut out = Vec::with_capacity(items.len());
    let mut run: Vec<SuiteItem> = Vec::new();

    for item in items {
        match item {
            ExecutionItem::Suite(s) => run.push(s.clone()),
            other => {
                flush_run(&mut run, processes, &mut out);
                out.push(other.clone());
            }
        }
    }
    flush_run(&mut run, processes, &mut out);
    out
}

fn flush_run(run: &mut Vec<SuiteItem>, processes: usize, out: &mut Vec<ExecutionItem>) {
    if run.is_empty() {
        return;
    }
    let taken = std::mem::take(run);
    out.extend(chunk_one_run(taken, processes));
}

fn chunk_one_run(suites: Vec<SuiteItem>, processes: usize) -> Vec<ExecutionItem> {
    let len = suites.len();
    let chunk_size = if len > processes {
        let rounded = ((len as f64) / (processes as f64)).round() as usize;
        rounded.max(1)
    } else {
        1
    };

    suites
        .chunks(chunk_size)
        .map(|c| {
            if c.len() == 1 {
                ExecutionItem::Suite(c[0].clone())
            } else {
                ExecutionItem::SuiteItems(SuiteItemsChunk { suites: c.to_vec() })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suites(names: &[&str]) -> Vec<ExecutionItem> {
        names.iter().map(|n| ExecutionItem::Suite(SuiteItem::new(*n))).collect()
    }

    #[test]
    fn groups_suites_into_roughly_process_count_batches() {
        let items = suites(&["A", "B", "C", "D", "E", "F"]);
        let chunked = chunk_suites(&items, 2);
        // 6 suites / 2 processes -> chunk_size 3 -> 2 chunks.
        assert_eq!(chunked.len(), 2);
        for item in &chunked {
            assert!(matches!(item, ExecutionItem::SuiteItems(c) if c.suites.len() == 3));
        }
    }

    #[test]
    fn fewer_suites_than_processes_stays_one_suite_per_chunk() {
        let items = suites(&["A", "B"]);
        let chunked = chunk_suites(&items, 8);
        assert_eq!(chunked.len(), 2);
        assert!(chunked.iter().all(|i| matches!(i, ExecutionItem::Suite(_))));
    }

    #[test]
    fn rounding_down_to_zero_falls_back_to_one() {
        // len=3, processes=7 -> len <= processes, so size stays 1
        // unaffected by rounding; exercise the case where len > processes
        // but the ratio still rounds to zero only when using floor, not
        // round — verify round() gives a sane minimum via max(1) anyway.
        let items = suites(&["A", "B", "C"]);
        let chunked = chunk_suites(&items, 3);
        assert_eq!(chunked.len(), 3);
    }

    #[test]
    fn does_not_cross_wait_boundaries() {
        let mut items = suites(&["A", "B"]);
        items.push(ExecutionItem::Wait);
        items.extend(suites(&["C", "D"]));
        let chunked = chunk_suites(&items, 4);
        // Each side of the Wait has only 2 suites <= processes, so both
        // stay as individual Suite items with the Wait token preserved.
        assert_eq!(chunked.len(), 5);
        assert!(matches!(chunked[2], ExecutionItem::Wait));
    }
}
