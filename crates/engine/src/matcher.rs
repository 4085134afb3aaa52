//! Structural comparison of response bodies.
//!
//! `null` in the expected value is a wildcard. Mappings and lists recurse; scalars compare by
//! equality. The two modes differ in which side must be covered:
//!
//! - `Strict`: key sets are identical, list lengths are equal, and every actual element is
//!   paired with a distinct expected element.
//! - `Partial`: every expected key exists in the actual mapping, and every expected list element
//!   matches some actual element. Extras on the actual side are tolerated.

use serde_json::{Map, Value};
use spindle_types::MatchMode;

/// Returns whether `actual` satisfies `expected` under `mode`.
pub fn matches(actual: &Value, expected: &Value, mode: MatchMode) -> bool {
    match (actual, expected) {
        (_, Value::Null) => true,
        (Value::Object(actual), Value::Object(expected)) => objects_match(actual, expected, mode),
        (Value::Array(actual), Value::Array(expected)) => match mode {
            MatchMode::Strict => arrays_match_strict(actual, expected),
            MatchMode::Partial => arrays_match_partial(actual, expected),
        },
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        (actual, expected) => actual == expected,
    }
}

fn objects_match(actual: &Map<String, Value>, expected: &Map<String, Value>, mode: MatchMode) -> bool {
    if mode == MatchMode::Strict && actual.len() != expected.len() {
        return false;
    }
    expected.iter().all(|(key, expected_value)| {
        actual
            .get(key)
            .is_some_and(|actual_value| matches(actual_value, expected_value, mode))
    })
}

fn arrays_match_partial(actual: &[Value], expected: &[Value]) -> bool {
    expected
        .iter()
        .all(|expected_item| actual.iter().any(|actual_item| matches(actual_item, expected_item, MatchMode::Partial)))
}

/// Perfect matching between actual and expected elements (Kuhn's augmenting paths).
fn arrays_match_strict(actual: &[Value], expected: &[Value]) -> bool {
    if actual.len() != expected.len() {
        return false;
    }
    let candidates: Vec<Vec<usize>> = actual
        .iter()
        .map(|actual_item| {
            expected
                .iter()
                .enumerate()
                .filter(|(_, expected_item)| matches(actual_item, expected_item, MatchMode::Strict))
                .map(|(index, _)| index)
                .collect()
        })
        .collect();

    let mut owner: Vec<Option<usize>> = vec![None; expected.len()];
    for actual_index in 0..actual.len() {
        let mut visited = vec![false; expected.len()];
        if !augment(actual_index, &candidates, &mut owner, &mut visited) {
            return false;
        }
    }
    true
}

fn augment(actual_index: usize, candidates: &[Vec<usize>], owner: &mut [Option<usize>], visited: &mut [bool]) -> bool {
    for &expected_index in &candidates[actual_index] {
        if visited[expected_index] {
            continue;
        }
        visited[expected_index] = true;
        let free = match owner[expected_index] {
            None => true,
            Some(previous) => augment(previous, candidates, owner, visited),
        };
        if free {
            owner[expected_index] = Some(actual_index);
            return true;
        }
    }
    false
}
