//! External collaborator interfaces for plan resolution. The underlying
//! test runner and any previous result file are opaque collaborators
//! (spec §1) — this crate only needs their *output shape*, not their
//! internals.

use crate::error::Result;
use parabot_items::SuiteItem;
use std::path::{Path, PathBuf};

/// Invokes the runner in dry-run mode to enumerate the suite tree (spec
/// §4.2 step 2). Implemented by the subprocess driver crate in terms of
/// the real runner executable; a fake implementation is used in tests.
pub trait DryRunDiscoverer {
    fn discover(&self, data_sources: &[PathBuf], passthrough_options: &[(String, String)]) -> Result<Vec<SuiteItem>>;
}

/// Extracts `SuiteItem`s from a previous run's result file, ordered
/// passed-before-failed, longer-elapsed-first within each group (spec
/// §4.2 step 2, `--suitesfrom`).
pub trait SuitesFromReader {
    fn read_suites_from(&self, path: &Path) -> Result<Vec<SuiteItem>>;
}
