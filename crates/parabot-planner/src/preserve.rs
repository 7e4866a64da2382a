//! Order-preserving reconciliation between a freshly discovered item list
//! and a previously cached one (spec §4.2 "Order preservation"), plus the
//! `_fix_items` ancestor/descendant conflict resolution (spec §9, §3
//! invariant 4).

use parabot_items::{names_equal, ExecutionItem, SuiteItem, TestItem};

fn items_match(a: &ExecutionItem, b: &ExecutionItem) -> bool {
    match (a.kind(), b.kind()) {
        (Some(ka), Some(kb)) if ka == kb => match (a.name(), b.name()) {
            (Some(na), Some(nb)) => names_equal(na, nb),
            _ => false,
        },
        _ => false,
    }
}

fn contains_matching(items: &[ExecutionItem], target: &ExecutionItem) -> bool {
    items.iter().any(|it| items_match(it, target))
}

/// `preserve(new, old)`: items common to both keep their old positions;
/// items only in `new` append in their natural order; items only in `old`
/// are dropped. Structural tokens (`Wait`, group brackets, `Sleep`) in
/// `old` are always carried forward as-is (they are never produced by
/// discovery, so they can never be "new"); duplicate/boundary waits are
/// collapsed by the caller via [`parabot_items::fold_groups`] semantics
/// applied afterwards.
///
/// Idempotent: `preserve(new, preserve(new, old)) == preserve(new, old)`.
pub fn preserve_order(new_items: &[ExecutionItem], old_items: &[ExecutionItem]) -> Vec<ExecutionItem> {
    let mut result = Vec::with_capacity(old_items.len().max(new_items.len()));
    for item in old_items {
        if item.kind().is_none() {
            // structural token: always carried forward
            result.push(item.clone());
            continue;
        }
        if contains_matching(new_items, item) {
            result.push(item.clone());
        }
    }
    for item in new_items {
        if item.kind().is_some() && !contains_matching(old_items, item) {
            result.push(item.clone());
        }
    }
    result
}

/// Resolve ancestor/descendant overlaps: if suite `A` is an ancestor of
/// another item `B` present later in the same item list, `A` is rewritten
/// to the set-difference of its known children against every other name
/// present in the list (spec §9, §3 invariant 4). Runs to a fixed point;
/// bounded by `items.len()` passes since each pass strictly reduces the
/// number of conflicting ancestors.
pub fn fix_items(mut items: Vec<ExecutionItem>) -> Vec<ExecutionItem> {
    for _ in 0..items.len().max(1) {
        match fix_items_one_pass(&items) {
            Some(next) => items = next,
            None => return items,
        }
    }
    items
}

fn fix_items_one_pass(items: &[ExecutionItem]) -> Option<Vec<ExecutionItem>> {
    for (i, item) in items.iter().enumerate() {
        let ExecutionItem::Suite(suite) = item else { continue };
        let has_later_descendant = items[i + 1..].iter().any(|later| {
            later
                .name()
                .map(|n| suite.contains_name(n) && n != suite.name)
                .unwrap_or(false)
        });
        if !has_later_descendant {
            continue;
        }
        let others_by_name: Vec<&str> = items
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter_map(|(_, it)| it.name())
            .collect();
        let replacement = suite_difference(suite, &others_by_name);
        let mut next = items.to_vec();
        next.splice(i..i + 1, replacement);
        return Some(next);
    }
    None
}

fn suite_difference(suite: &SuiteItem, exclude_names: &[&str]) -> Vec<ExecutionItem> {
    if !suite.tests.is_empty() {
        suite
            .tests
            .iter()
            .filter(|t| !exclude_names.iter().any(|n| names_equal(n, t)))
            .map(|t| ExecutionItem::Test(TestItem::new(t.clone())))
            .collect()
    } else if !suite.suites.is_empty() {
        suite
            .suites
            .iter()
            .filter(|s| !exclude_names.iter().any(|n| names_equal(n, s)))
            .map(|s| ExecutionItem::Suite(SuiteItem::new(s.clone())))
            .collect()
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(name: &str) -> ExecutionItem {
        ExecutionItem::Suite(SuiteItem::new(name))
    }

    #[test]
    fn common_items_keep_old_positions_new_only_append() {
        let old = vec![suite("C"), suite("A"), suite("B")];
        let new = vec![suite("A"), suite("B"), suite("D")];
        let result = preserve_order(&new, &old);
        // A, B keep old relative order (A before B as in old); D appended.
        assert_eq!(result, vec![suite("A"), suite("B"), suite("D")]);
    }

    #[test]
    fn old_only_items_are_dropped() {
        let old = vec![suite("A"), suite("Gone")];
        let new = vec![suite("A")];
        let result = preserve_order(&new, &old);
        assert_eq!(result, vec![suite("A")]);
    }

    #[test]
    fn structural_tokens_survive_from_old() {
        let old = vec![suite("A"), ExecutionItem::Wait, suite("B")];
        let new = vec![suite("A"), suite("B")];
        let result = preserve_order(&new, &old);
        assert_eq!(result, vec![suite("A"), ExecutionItem::Wait, suite("B")]);
    }

    #[test]
    fn preserve_order_is_idempotent() {
        let old = vec![suite("C"), suite("A")];
        let new = vec![suite("A"), suite("B")];
        let once = preserve_order(&new, &old);
        let twice = preserve_order(&new, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn ancestor_is_expanded_to_difference_when_descendant_appears_later() {
        let mut parent = SuiteItem::new("Parent");
        parent.suites = vec!["Parent.Child".to_string(), "Parent.Other".to_string()];
        let items = vec![ExecutionItem::Suite(parent), suite("Parent.Child")];
        let fixed = fix_items(items);
        assert_eq!(fixed, vec![suite("Parent.Other"), suite("Parent.Child")]);
    }

    #[test]
    fn no_conflict_leaves_items_untouched() {
        let items = vec![suite("A"), suite("B")];
        let fixed = fix_items(items.clone());
        assert_eq!(fixed, items);
    }
}

#[cfg(test)]
mod idempotence_properties {
    use super::*;
    use proptest::prelude::*;

    fn suite_names() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[A-E]", 0..8)
    }

    fn to_items(names: &[String]) -> Vec<ExecutionItem> {
        names.iter().map(|n| ExecutionItem::Suite(SuiteItem::new(n.clone()))).collect()
    }

    proptest! {
        /// preserve_order(new, preserve_order(new, old)) == preserve_order(new, old)
        /// for arbitrary (possibly overlapping, possibly empty) name sets,
        /// not just the handful of hand-picked cases above.
        #[test]
        fn preserve_order_is_idempotent_for_arbitrary_inputs(old_names in suite_names(), new_names in suite_names()) {
            let old = to_items(&old_names);
            let new = to_items(&new_names);
            let once = preserve_order(&new, &old);
            let twice = preserve_order(&new, &once);
            prop_assert_eq!(once, twice);
        }

        /// fix_items never drops a suite that has no later descendant
        /// conflict, regardless of the input's shape.
        #[test]
        fn fix_items_reaches_a_fixed_point(names in suite_names()) {
            let items = to_items(&names);
            let once = fix_items(items);
            let twice = fix_items(once.clone());
            prop_assert_eq!(once, twice);
        }
    }
}
