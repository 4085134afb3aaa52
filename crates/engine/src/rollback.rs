//! Per-host compensation stack.
//!
//! Entries are pushed as steps are registered and never removed. A drain walks a cursor from
//! the newest entry down, so every drain replays all compensations registered so far.

use indexmap::IndexMap;
use serde_json::Value;
use spindle_types::{RollbackEntry, StepDefinition};
use tracing::debug;

use crate::errors::ScenarioError;

/// Named steps available to rollback back-references.
#[derive(Debug, Clone, Default)]
pub struct StepCatalog {
    named: IndexMap<String, StepDefinition>,
}

impl StepCatalog {
    /// Index `steps` by name and check every rollback list against the index.
    pub fn build(steps: &[StepDefinition]) -> Result<Self, ScenarioError> {
        let mut named = IndexMap::new();
        for step in steps {
            if let Some(name) = step.name()
                && named.insert(name.to_string(), step.clone()).is_some()
            {
                return Err(ScenarioError::DuplicateStepName(name.to_string()));
            }
        }
        let catalog = Self { named };
        for (index, step) in steps.iter().enumerate() {
            catalog.check_entries(index, step)?;
        }
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&StepDefinition> {
        self.named.get(name)
    }

    fn check_entries(&self, index: usize, step: &StepDefinition) -> Result<(), ScenarioError> {
        for entry in step.rollback_entries() {
            match entry {
                RollbackEntry::Reference(reference) if self.named.contains_key(&reference) => {}
                RollbackEntry::Reference(reference) => {
                    return Err(ScenarioError::UnresolvedRollbackReference {
                        step: step_label(index, step),
                        reference,
                    });
                }
                RollbackEntry::Inline(_) => {}
                RollbackEntry::Malformed(value) => {
                    return Err(ScenarioError::InvalidRollbackEntry {
                        step: step_label(index, step),
                        entry: describe_value(&value),
                    });
                }
            }
        }
        Ok(())
    }

    /// Compensating steps for `step`, in declaration order, with `ignore` forced on.
    fn compensations_for(&self, step: &StepDefinition) -> Result<Vec<StepDefinition>, ScenarioError> {
        step.rollback_entries()
            .into_iter()
            .map(|entry| match entry {
                RollbackEntry::Reference(reference) => self
                    .get(&reference)
                    .map(|named| named.clone().with_ignore(true))
                    .ok_or_else(|| ScenarioError::UnresolvedRollbackReference {
                        step: step.name().unwrap_or("<unnamed>").to_string(),
                        reference,
                    }),
                RollbackEntry::Inline(inline) => Ok(inline.with_ignore(true)),
                RollbackEntry::Malformed(value) => Err(ScenarioError::InvalidRollbackEntry {
                    step: step.name().unwrap_or("<unnamed>").to_string(),
                    entry: describe_value(&value),
                }),
            })
            .collect()
    }
}

fn step_label(index: usize, step: &StepDefinition) -> String {
    match step.name() {
        Some(name) => format!("'{name}'"),
        None => format!("#{}", index + 1),
    }
}

fn describe_value(value: &Value) -> String {
    value.to_string()
}

/// One compensation bound to the host it must run against.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub host: String,
    pub step: StepDefinition,
}

#[derive(Debug, Default)]
pub struct RollbackLedger {
    entries: Vec<LedgerEntry>,
}

impl RollbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the compensations declared on `step` for `host`.
    ///
    /// Returns how many entries were pushed. Nothing is pushed when any entry is invalid.
    pub fn register(&mut self, host: &str, step: &StepDefinition, catalog: &StepCatalog) -> Result<usize, ScenarioError> {
        let compensations = catalog.compensations_for(step)?;
        let count = compensations.len();
        self.entries.extend(compensations.into_iter().map(|step| LedgerEntry {
            host: host.to_string(),
            step,
        }));
        if count > 0 {
            debug!(host, step = step.name().unwrap_or("-"), count, "rollback entries registered");
        }
        Ok(count)
    }

    /// Newest entry strictly below `cursor`, restricted to `host` when given.
    ///
    /// Start a drain at [`RollbackLedger::len`] and continue from the returned index.
    pub fn previous(&self, cursor: usize, host: Option<&str>) -> Option<(usize, &LedgerEntry)> {
        let end = cursor.min(self.entries.len());
        self.entries[..end]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, entry)| host.is_none_or(|host| entry.host == host))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn pending(&self, host: Option<&str>) -> usize {
        self.entries
            .iter()
            .filter(|entry| host.is_none_or(|host| entry.host == host))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::step;

    fn scenario() -> Vec<StepDefinition> {
        vec![
            step(json!({"name": "a", "method": "POST", "route": "/a", "rollback": ["b", "c"]})),
            step(json!({"name": "b", "method": "DELETE", "route": "/b"})),
            step(json!({"name": "c", "method": "DELETE", "route": "/c", "ignore": false})),
        ]
    }

    #[test]
    fn catalog_rejects_unknown_references() {
        let steps = vec![step(json!({"method": "POST", "rollback": ["delete_test"]}))];
        let err = StepCatalog::build(&steps).unwrap_err();
        assert_eq!(err, ScenarioError::UnresolvedRollbackReference {
            step: "#1".into(),
            reference: "delete_test".into()
        });
    }

    #[test]
    fn catalog_rejects_malformed_entries() {
        let steps = vec![step(json!({"name": "x", "method": "POST", "rollback": [["toto"]]}))];
        assert!(matches!(
            StepCatalog::build(&steps),
            Err(ScenarioError::InvalidRollbackEntry { step, .. }) if step == "'x'"
        ));
    }

    #[test]
    fn catalog_rejects_duplicate_names() {
        let steps = vec![
            step(json!({"name": "x", "method": "GET"})),
            step(json!({"name": "x", "method": "POST"})),
        ];
        assert_eq!(StepCatalog::build(&steps).unwrap_err(), ScenarioError::DuplicateStepName("x".into()));
    }

    #[test]
    fn forward_references_resolve() {
        let steps = scenario();
        let catalog = StepCatalog::build(&steps).unwrap();
        assert!(catalog.get("c").is_some());
    }

    #[test]
    fn drain_runs_newest_first_with_ignore_forced() {
        let steps = scenario();
        let catalog = StepCatalog::build(&steps).unwrap();
        let mut ledger = RollbackLedger::new();
        assert_eq!(ledger.register("http://h", &steps[0], &catalog).unwrap(), 2);

        let (cursor, first) = ledger.previous(ledger.len(), None).unwrap();
        let (cursor, second) = ledger.previous(cursor, None).unwrap();
        assert_eq!(first.step.name(), Some("c"));
        assert_eq!(second.step.name(), Some("b"));
        assert!(first.step.is_ignored() && second.step.is_ignored());
        assert!(ledger.previous(cursor, None).is_none());
    }

    #[test]
    fn inline_entries_are_ignored_compensations() {
        let steps = vec![step(json!({
            "method": "POST",
            "rollback": [{"name": "rollback_test", "method": "DELETE", "route": "/test"}]
        }))];
        let catalog = StepCatalog::build(&steps).unwrap();
        let mut ledger = RollbackLedger::new();
        ledger.register("http://h", &steps[0], &catalog).unwrap();
        let (_, entry) = ledger.previous(ledger.len(), Some("http://h")).unwrap();
        assert_eq!(entry.step.name(), Some("rollback_test"));
        assert!(entry.step.is_ignored());
    }

    #[test]
    fn host_filter_skips_other_hosts() {
        let steps = scenario();
        let catalog = StepCatalog::build(&steps).unwrap();
        let mut ledger = RollbackLedger::new();
        ledger.register("http://foo", &steps[0], &catalog).unwrap();
        ledger.register("http://bar", &steps[0], &catalog).unwrap();

        let mut cursor = ledger.len();
        let mut walked = Vec::new();
        while let Some((index, entry)) = ledger.previous(cursor, Some("http://foo")) {
            walked.push(entry.host.clone());
            cursor = index;
        }
        assert_eq!(walked, ["http://foo", "http://foo"]);
        assert_eq!(ledger.pending(Some("http://bar")), 2);
        assert_eq!(ledger.pending(None), 4);
        assert!(!ledger.is_empty());
    }

    #[test]
    fn draining_does_not_consume_entries() {
        let steps = scenario();
        let catalog = StepCatalog::build(&steps).unwrap();
        let mut ledger = RollbackLedger::new();
        ledger.register("http://h", &steps[0], &catalog).unwrap();

        let mut cursor = ledger.len();
        while let Some((index, _)) = ledger.previous(cursor, None) {
            cursor = index;
        }
        assert_eq!(ledger.len(), 2);
        let (_, newest) = ledger.previous(ledger.len(), None).unwrap();
        assert_eq!(newest.step.name(), Some("c"));
    }

    #[test]
    fn catalog_keeps_the_original_ignore_flag() {
        let steps = scenario();
        let catalog = StepCatalog::build(&steps).unwrap();
        assert!(!catalog.get("c").unwrap().is_ignored());
    }
}
