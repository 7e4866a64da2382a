//! In-process coordination state (spec §3 "Coordination state", §4.4).
//! All cross-process shared state for one run lives here, guarded by a
//! single lock so every RPC method invocation is serialized and none
//! blocks indefinitely (spec §4.4 "Scope and threading").

use crate::error::{CoordError, Result};
use crate::resourcefile::ValueSet;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
pub struct AddedSuite {
    pub name: String,
    pub variables: Vec<String>,
}

#[derive(Default)]
struct Inner {
    locks: HashMap<String, (String, u32)>,
    parallel_values: HashMap<String, String>,
    value_sets: HashMap<String, ValueSet>,
    owner_to_values: HashMap<String, String>,
    added_suites: VecDeque<AddedSuite>,
    ignored_executions: std::collections::HashSet<String>,
    min_queue_index_executing: Option<u64>,
    only_last_executing: bool,
    not_completed_indexes: std::collections::BTreeSet<u64>,
}

/// Owns all coordination state for one run. Cheap to clone (`Arc`-free
/// internal mutex), shared across the axum app via `Arc<CoordinationState>`.
pub struct CoordinationState {
    inner: Mutex<Inner>,
}

impl CoordinationState {
    pub fn new(value_sets: HashMap<String, ValueSet>) -> Self {
        Self { inner: Mutex::new(Inner { value_sets, ..Default::default() }) }
    }

    // --- parallel key/value store -----------------------------------

    pub fn set_parallel_value_for_key(&self, key: String, value: String) {
        self.inner.lock().parallel_values.insert(key, value);
    }

    pub fn get_parallel_value_for_key(&self, key: &str) -> String {
        self.inner.lock().parallel_values.get(key).cloned().unwrap_or_default()
    }

    // --- locks (reentrant per caller) --------------------------------

    pub fn acquire_lock(&self, name: &str, caller_id: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.locks.get_mut(name) {
            Some((owner, depth)) if owner == caller_id => {
                *depth += 1;
                true
            }
            Some(_) => false,
            None => {
                inner.locks.insert(name.to_string(), (caller_id.to_string(), 1));
                true
            }
        }
    }

    pub fn release_lock(&self, name: &str, caller_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.locks.get_mut(name) {
            Some((owner, depth)) if owner == caller_id => {
                *depth -= 1;
                if *depth == 0 {
                    inner.locks.remove(name);
                }
                Ok(())
            }
            Some((owner, _)) => Err(CoordError::NotLockOwner(caller_id.to_string(), owner.clone())),
            None => Err(CoordError::NotLockOwner(caller_id.to_string(), name.to_string())),
        }
    }

    pub fn release_locks(&self, caller_id: &str) {
        let mut inner = self.inner.lock();
        let owned: Vec<String> = inner
            .locks
            .iter()
            .filter(|(_, (owner, _))| owner == caller_id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in owned {
            if let Some((_, depth)) = inner.locks.get_mut(&name) {
                *depth -= 1;
                if *depth == 0 {
                    inner.locks.remove(&name);
                }
            }
        }
    }

    // --- value sets ----------------------------------------------------

    /// Returns `Ok(Some((name, fields)))` on success, `Ok(None)` when a
    /// matching set exists but all are leased (caller retries), and an
    /// error when no set exists or the caller already holds one (spec
    /// §4.4 `acquire_value_set`).
    pub fn acquire_value_set(
        &self,
        caller_id: &str,
        tags: &[String],
    ) -> Result<Option<(String, HashMap<String, String>)>> {
        let mut inner = self.inner.lock();
        if inner.value_sets.is_empty() {
            return Err(CoordError::NoValueSetsImported);
        }
        if inner.owner_to_values.contains_key(caller_id) {
            return Err(CoordError::AlreadyReservedValueSet(caller_id.to_string()));
        }
        let leased: std::collections::HashSet<String> = inner.owner_to_values.values().cloned().collect();
        let mut matching = false;
        let mut candidate = None;
        for (name, set) in inner.value_sets.iter() {
            if tags.iter().all(|t| set.tags.contains(t)) {
                matching = true;
                if !leased.contains(name) {
                    candidate = Some(name.clone());
                    break;
                }
            }
        }
        if !matching {
            return Err(CoordError::NoMatchingValueSet);
        }
        match candidate {
            Some(name) => {
                let fields = inner.value_sets[&name].fields.clone();
                inner.owner_to_values.insert(caller_id.to_string(), name.clone());
                Ok(Some((name, fields)))
            }
            None => Ok(None),
        }
    }

    pub fn release_value_set(&self, caller_id: &str) {
        self.inner.lock().owner_to_values.remove(caller_id);
    }

    pub fn disable_value_set(&self, set_name: &str, caller_id: &str) {
        let mut inner = self.inner.lock();
        inner.owner_to_values.remove(caller_id);
        inner.value_sets.remove(set_name);
    }

    pub fn get_value_from_set(&self, key: &str, caller_id: &str) -> Result<String> {
        let inner = self.inner.lock();
        let set_name = inner
            .owner_to_values
            .get(caller_id)
            .ok_or_else(|| CoordError::NoValueSetReserved(caller_id.to_string()))?;
        let set = inner
            .value_sets
            .get(set_name)
            .ok_or_else(|| CoordError::UnknownValueSet(set_name.clone()))?;
        set.fields.get(key).cloned().ok_or_else(|| CoordError::NoSuchValueSetKey(key.to_string()))
    }

    // --- dynamic suite injection ---------------------------------------

    pub fn add_suite_to_execution_queue(&self, name: String, variables: Vec<String>) {
        self.inner.lock().added_suites.push_back(AddedSuite { name, variables });
    }

    pub fn get_added_suites(&self) -> Vec<AddedSuite> {
        self.inner.lock().added_suites.drain(..).collect()
    }

    // --- ignored executions ---------------------------------------------

    pub fn ignore_execution(&self, caller_id: &str) {
        self.inner.lock().ignored_executions.insert(caller_id.to_string());
    }

    pub fn is_ignored_execution(&self, caller_id: &str) -> bool {
        self.inner.lock().ignored_executions.contains(caller_id)
    }

    // --- completion index / run-teardown-only-once signals --------------

    pub fn register_queue_index(&self, index: u64) {
        self.inner.lock().not_completed_indexes.insert(index);
    }

    /// `increase_completed(index)`: removes the index, and recomputes
    /// `pabot_min_queue_index_executing` / `pabot_only_last_executing`
    /// (spec §4.5).
    pub fn increase_completed(&self, index: u64) {
        let mut inner = self.inner.lock();
        inner.not_completed_indexes.remove(&index);
        inner.min_queue_index_executing = inner.not_completed_indexes.iter().next().copied();
        inner.only_last_executing = inner.not_completed_indexes.len() == 1;
    }

    pub fn min_queue_index_executing(&self) -> Option<u64> {
        self.inner.lock().min_queue_index_executing
    }

    pub fn only_last_executing(&self) -> bool {
        self.inner.lock().only_last_executing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_reentrant_for_the_same_caller_only() {
        let state = CoordinationState::new(HashMap::new());
        assert!(state.acquire_lock("L", "c1"));
        assert!(state.acquire_lock("L", "c1")); // reentrant
        assert!(!state.acquire_lock("L", "c2")); // blocked
        state.release_lock("L", "c1").unwrap();
        assert!(!state.acquire_lock("L", "c2")); // still held (depth 1)
        state.release_lock("L", "c1").unwrap();
        assert!(state.acquire_lock("L", "c2")); // now free
    }

    #[test]
    fn release_by_non_owner_is_an_error() {
        let state = CoordinationState::new(HashMap::new());
        state.acquire_lock("L", "c1");
        assert!(state.release_lock("L", "c2").is_err());
    }

    #[test]
    fn value_set_requires_import() {
        let state = CoordinationState::new(HashMap::new());
        assert!(matches!(state.acquire_value_set("c1", &[]), Err(CoordError::NoValueSetsImported)));
    }

    #[test]
    fn value_set_is_exclusively_leased() {
        let mut sets = HashMap::new();
        sets.insert("staging".to_string(), ValueSet { tags: vec!["env".into()], fields: HashMap::new() });
        let state = CoordinationState::new(sets);
        let leased = state.acquire_value_set("c1", &["env".to_string()]).unwrap();
        assert_eq!(leased.unwrap().0, "staging");
        // No other set matches -> caller must wait (None, None).
        let second = state.acquire_value_set("c2", &["env".to_string()]).unwrap();
        assert!(second.is_none());
        // c1 can't reserve a second set.
        assert!(matches!(state.acquire_value_set("c1", &[]), Err(CoordError::AlreadyReservedValueSet(_))));
        state.release_value_set("c1");
        let third = state.acquire_value_set("c2", &["env".to_string()]).unwrap();
        assert_eq!(third.unwrap().0, "staging");
    }

    #[test]
    fn completion_tracks_min_index_and_last_flag() {
        let state = CoordinationState::new(HashMap::new());
        state.register_queue_index(0);
        state.register_queue_index(1);
        state.register_queue_index(2);
        state.increase_completed(0);
        assert_eq!(state.min_queue_index_executing(), Some(1));
        assert!(!state.only_last_executing());
        state.increase_completed(1);
        assert_eq!(state.min_queue_index_executing(), Some(2));
        assert!(state.only_last_executing());
    }
}
