//! Plan resolver (C2): turns data sources + options into an ordered
//! `Vec<ExecutionItem>`, using the `.pabotsuitenames` cache file when
//! inputs have not changed (spec §4.2).

use crate::discovery::{DryRunDiscoverer, SuitesFromReader};
use crate::error::{PlannerError, Result};
use crate::preserve::{fix_items, preserve_order};
use parabot_items::hashing::{hash_data_sources, hash_options, hash_suitesfrom};
use parabot_items::{ExecutionItem, PlanFile, SuiteItem, TestItem, CACHE_FILE_NAME};
use std::path::{Path, PathBuf};

pub struct ResolveInputs<'a> {
    pub data_sources: &'a [PathBuf],
    pub passthrough_options: &'a [(String, String)],
    pub testlevelsplit: bool,
    pub suitesfrom: Option<&'a Path>,
    pub work_dir: &'a Path,
    pub run_empty_suite: bool,
}

pub fn resolve_plan(
    inputs: &ResolveInputs,
    discoverer: &dyn DryRunDiscoverer,
    suitesfrom_reader: &dyn SuitesFromReader,
) -> Result<Vec<ExecutionItem>> {
    if inputs.data_sources.is_empty() {
        return Err(PlannerError::NoDataSources);
    }

    let datasources_hash = hash_data_sources(inputs.data_sources)?;
    let commandline_hash = hash_options(inputs.passthrough_options, inputs.testlevelsplit);
    let suitesfrom_hash = hash_suitesfrom(inputs.suitesfrom)?;
    let cache_path = inputs.work_dir.join(CACHE_FILE_NAME);

    let cached = PlanFile::read(&cache_path).ok();

    let items = match cached {
        None => {
            tracing::debug!("no plan cache found, generating fresh plan");
            generate_fresh(inputs, discoverer, suitesfrom_reader)?
        }
        Some(cached) if cached.headers.datasources == datasources_hash
            && cached.headers.commandlineoptions == commandline_hash
            && cached.headers.suitesfrom == suitesfrom_hash =>
        {
            tracing::debug!("plan cache hit, reusing cached order");
            cached.items
        }
        Some(cached)
            if cached.headers.commandlineoptions == commandline_hash
                && cached.headers.suitesfrom == suitesfrom_hash =>
        {
            tracing::info!("data sources changed, merging fresh discovery against cached order");
            let fresh = generate_fresh(inputs, discoverer, suitesfrom_reader)?;
            fix_items(preserve_order(&fresh, &cached.items))
        }
        Some(_) => {
            tracing::info!("options or suitesfrom changed, regenerating plan from scratch");
            generate_fresh(inputs, discoverer, suitesfrom_reader)?
        }
    };

    if items.is_empty() && !inputs.run_empty_suite {
        return Err(PlannerError::EmptyPlan);
    }

    let plan = PlanFile::new(datasources_hash, commandline_hash, suitesfrom_hash, items.clone());
    if let Err(e) = plan.write_atomic(&cache_path) {
        tracing::warn!("failed to write plan cache {}: {}", cache_path.display(), e);
    }

    Ok(items)
}

fn generate_fresh(
    inputs: &ResolveInputs,
    discoverer: &dyn DryRunDiscoverer,
    suitesfrom_reader: &dyn SuitesFromReader,
) -> Result<Vec<ExecutionItem>> {
    let suites = match inputs.suitesfrom {
        Some(path) if path.exists() => suitesfrom_reader.read_suites_from(path)?,
        _ => discoverer.discover(inputs.data_sources, inputs.passthrough_options)?,
    };

    if inputs.testlevelsplit {
        Ok(flatten_to_test_level(suites, inputs.run_empty_suite))
    } else {
        Ok(suites.into_iter().map(ExecutionItem::Suite).collect())
    }
}

/// Flatten suites to individual tests; a suite with no tests falls back
/// to running as a (possibly empty) suite when empty-suite execution is
/// enabled, otherwise it contributes nothing (spec §4.2 step 2, §9 open
/// question on chunking does not apply here — this is the testlevelsplit
/// fallback, a distinct ambiguity resolved the same direction).
fn flatten_to_test_level(suites: Vec<SuiteItem>, run_empty_suite: bool) -> Vec<ExecutionItem> {
    let mut out = Vec::new();
    for suite in suites {
        if suite.tests.is_empty() {
            if run_empty_suite {
                out.push(ExecutionItem::Suite(suite));
            }
        } else {
            for test in &suite.tests {
                out.push(ExecutionItem::Test(TestItem::new(test.clone())));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeDiscoverer {
        suites: Vec<SuiteItem>,
    }
    impl DryRunDiscoverer for FakeDiscoverer {
        fn discover(&self, _: &[PathBuf], _: &[(String, String)]) -> Result<Vec<SuiteItem>> {
            Ok(self.suites.clone())
        }
    }
    struct UnusedSuitesFrom;
    impl SuitesFromReader for UnusedSuitesFrom {
        fn read_suites_from(&self, _: &Path) -> Result<Vec<SuiteItem>> {
            unreachable!("not used in these tests")
        }
    }

    #[test]
    fn first_resolve_generates_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let discoverer = FakeDiscoverer { suites: vec![SuiteItem::new("A"), SuiteItem::new("B")] };
        let source = dir.path().join("suite.robot");
        std::fs::write(&source, "*** Test Cases ***").unwrap();
        let inputs = ResolveInputs {
            data_sources: &[source],
            passthrough_options: &[],
            testlevelsplit: false,
            suitesfrom: None,
            work_dir: dir.path(),
            run_empty_suite: false,
        };
        let items = resolve_plan(&inputs, &discoverer, &UnusedSuitesFrom).unwrap();
        assert_eq!(items.len(), 2);
        assert!(dir.path().join(CACHE_FILE_NAME).exists());
    }

    #[test]
    fn empty_plan_without_run_empty_suite_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let discoverer = FakeDiscoverer { suites: vec![] };
        let source = dir.path().join("suite.robot");
        std::fs::write(&source, "*** Test Cases ***").unwrap();
        let inputs = ResolveInputs {
            data_sources: &[source],
            passthrough_options: &[],
            testlevelsplit: false,
            suitesfrom: None,
            work_dir: dir.path(),
            run_empty_suite: false,
        };
        assert!(matches!(resolve_plan(&inputs, &discoverer, &UnusedSuitesFrom), Err(PlannerError::EmptyPlan)));
    }

    #[test]
    fn second_resolve_reuses_cache_without_calling_discoverer_again() {
        let dir = tempfile::tempdir().unwrap();
        let discoverer = RefCell::new(FakeDiscoverer { suites: vec![SuiteItem::new("A")] });
        let source = dir.path().join("suite.robot");
        std::fs::write(&source, "*** Test Cases ***").unwrap();
        let inputs = ResolveInputs {
            data_sources: &[source],
            passthrough_options: &[],
            testlevelsplit: false,
            suitesfrom: None,
            work_dir: dir.path(),
            run_empty_suite: false,
        };
        let first = resolve_plan(&inputs, &discoverer.borrow(), &UnusedSuitesFrom).unwrap();
        let second = resolve_plan(&inputs, &discoverer.borrow(), &UnusedSuitesFrom).unwrap();
        assert_eq!(first, second);
    }
}
