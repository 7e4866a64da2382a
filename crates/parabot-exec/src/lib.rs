//! Worker-pool scheduler and subprocess driver (C5/C6).

pub mod discovery;
pub mod driver;
pub mod error;
pub mod proctree;
pub mod queueitem;
pub mod scheduler;

pub use discovery::RunnerDryRunDiscoverer;
pub use driver::{build_command, build_runner_options, render_argfile, run_subprocess, NoopPruner, Outcome, OutputPruner, RunResult, RunnerInvocation, SubprocessContext};
pub use error::{ExecError, Result};
pub use proctree::kill_tree;
pub use queueitem::{compute_last_levels, QueueItem};
pub use scheduler::{FailurePolicy, Scheduler, SchedulerConfig};
