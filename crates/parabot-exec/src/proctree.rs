//! Process-tree termination (spec §4.5, §9 "ProcessManager"): used by
//! both the timeout path and the cancellation path to kill a
//! subprocess's full descendant tree, children before parent.

use sysinfo::{Pid, System};

/// Terminates `root_pid` and every descendant, children first. Best
/// effort: a process that has already exited is silently skipped.
pub fn kill_tree(root_pid: u32) {
    let mut system = System::new_all();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let mut children_of: std::collections::HashMap<u32, Vec<u32>> = std::collections::HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children_of.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }

    let mut order = Vec::new();
    collect_postorder(root_pid, &children_of, &mut order);

    for pid in order {
        if let Some(process) = system.process(Pid::from_u32(pid)) {
            if !process.kill() {
                tracing::debug!("process {} already gone", pid);
            }
        }
    }
}

fn collect_postorder(pid: u32, children_of: &std::collections::HashMap<u32, Vec<u32>>, out: &mut Vec<u32>) {
    if let Some(children) = children_of.get(&pid) {
        for &child in children {
            collect_postorder(child, children_of, out);
        }
    }
    out.push(pid);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postorder_visits_children_before_parent() {
        let mut children_of = std::collections::HashMap::new();
        children_of.insert(1u32, vec![2, 3]);
        children_of.insert(2u32, vec![4]);
        let mut out = Vec::new();
        collect_postorder(1, &children_of, &mut out);
        assert_eq!(out, vec![4, 2, 3, 1]);
    }
}
