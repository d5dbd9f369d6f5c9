//! Optimizer output and the store that holds the live suggestion set.
//!
//! A suggestion set is created wholesale by an optimizer run, shrinks one
//! entry at a time as commits succeed, and is discarded wholesale when it
//! empties or a newer run replaces it. Entries are never edited in place.

use std::fmt;

use chrono::Utc;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smartbed_id::{BedId, PatientId};
use tracing::debug;

use crate::error::ConsoleError;

/// One advisory pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Suggestion {
    pub patient_id: PatientId,
    pub bed_id: BedId,
}

impl Suggestion {
    pub fn new(patient_id: PatientId, bed_id: BedId) -> Self {
        Self { patient_id, bed_id }
    }
}

/// Derived metrics reported with a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationMetrics {
    #[serde(default)]
    pub wait_time_reduction_mins: f64,
    #[serde(default)]
    pub survival_prob_increase: f64,
}

/// The result of one optimizer run.
///
/// Keys are unique and kept in generation order, which is the order the
/// optimizer emitted them on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSet {
    #[serde(
        rename = "assignments",
        serialize_with = "serialize_ordered",
        deserialize_with = "deserialize_ordered"
    )]
    entries: Vec<Suggestion>,

    #[serde(default)]
    objective_value: Option<f64>,

    #[serde(default)]
    metrics: AllocationMetrics,
}

impl SuggestionSet {
    /// Build a set, rejecting duplicate patient keys.
    pub fn new(
        entries: Vec<Suggestion>,
        objective_value: Option<f64>,
        metrics: AllocationMetrics,
    ) -> Result<Self, ConsoleError> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.patient_id == entry.patient_id) {
                return Err(ConsoleError::Invalid(format!(
                    "duplicate suggestion for patient {}",
                    entry.patient_id
                )));
            }
        }

        Ok(Self {
            entries,
            objective_value,
            metrics,
        })
    }

    pub fn entries(&self) -> &[Suggestion] {
        &self.entries
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    pub fn metrics(&self) -> &AllocationMetrics {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, patient_id: &PatientId) -> Option<&Suggestion> {
        self.entries.iter().find(|e| &e.patient_id == patient_id)
    }

    fn remove(&mut self, patient_id: &PatientId) -> Option<Suggestion> {
        let idx = self.entries.iter().position(|e| &e.patient_id == patient_id)?;
        Some(self.entries.remove(idx))
    }
}

fn serialize_ordered<S>(entries: &[Suggestion], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for entry in entries {
        map.serialize_entry(&entry.patient_id, &entry.bed_id)?;
    }
    map.end()
}

fn deserialize_ordered<'de, D>(deserializer: D) -> Result<Vec<Suggestion>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedVisitor;

    impl<'de> Visitor<'de> for OrderedVisitor {
        type Value = Vec<Suggestion>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of patient id to bed id")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries: Vec<Suggestion> = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((patient_id, bed_id)) = access.next_entry::<PatientId, BedId>()? {
                if entries.iter().any(|e| e.patient_id == patient_id) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate suggestion for patient {patient_id}"
                    )));
                }
                entries.push(Suggestion { patient_id, bed_id });
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor)
}

/// Identifies one installed optimizer run, across processes as well as
/// within one: the store generation plus the install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanId {
    generation: u64,
    installed_at_us: i64,
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}-{}", self.generation, self.installed_at_us)
    }
}

/// Holds at most one live suggestion set.
#[derive(Debug, Default)]
pub struct SuggestionStore {
    live: Option<SuggestionSet>,
    generation: u64,
    plan: Option<PlanId>,
}

impl SuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new set, discarding the previous one unconditionally.
    ///
    /// Returns the generation number of the installed set. An empty set is
    /// discarded immediately.
    pub fn replace(&mut self, set: SuggestionSet) -> u64 {
        self.generation += 1;
        debug!(
            generation = self.generation,
            entries = set.len(),
            replaced = self.live.is_some(),
            "Installing suggestion set"
        );
        self.live = if set.is_empty() { None } else { Some(set) };
        self.plan = self.live.as_ref().map(|_| PlanId {
            generation: self.generation,
            installed_at_us: Utc::now().timestamp_micros(),
        });
        self.generation
    }

    /// Remove one entry. No-op if absent. The set is discarded once empty.
    pub fn remove(&mut self, patient_id: &PatientId) -> Option<Suggestion> {
        let set = self.live.as_mut()?;
        let removed = set.remove(patient_id);
        if set.is_empty() {
            self.live = None;
        }
        removed
    }

    /// Discard the live set.
    pub fn clear(&mut self) {
        self.live = None;
    }

    /// The run the live set came from. Survives partial commits.
    pub fn plan_id(&self) -> Option<PlanId> {
        self.live.as_ref().and(self.plan)
    }

    pub fn current(&self) -> Option<&SuggestionSet> {
        self.live.as_ref()
    }

    pub fn get(&self, patient_id: &PatientId) -> Option<&Suggestion> {
        self.live.as_ref().and_then(|s| s.get(patient_id))
    }

    /// Snapshot of the live entries in generation order.
    pub fn entries(&self) -> Vec<Suggestion> {
        self.live
            .as_ref()
            .map(|s| s.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.live.as_ref().map_or(0, SuggestionSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_none()
    }

    /// Number of sets installed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PatientId {
        s.parse().unwrap()
    }

    fn set(pairs: &[(&str, &str)]) -> SuggestionSet {
        let entries = pairs
            .iter()
            .map(|(p, b)| Suggestion::new(p.parse().unwrap(), b.parse().unwrap()))
            .collect();
        SuggestionSet::new(entries, Some(10.0), AllocationMetrics::default()).unwrap()
    }

    #[test]
    fn test_optimizer_response_keeps_wire_order() {
        let json = r#"{
            "status": "success",
            "assignments": {"P-9": "B-1", "P-2": "B-7", "P-5": "B-3"},
            "objective_value": 412.5,
            "metrics": {"wait_time_reduction_mins": 6, "survival_prob_increase": 4.5}
        }"#;

        let parsed: SuggestionSet = serde_json::from_str(json).unwrap();
        let order: Vec<&str> = parsed.entries().iter().map(|e| e.patient_id.as_str()).collect();
        assert_eq!(order, vec!["P-9", "P-2", "P-5"]);
        assert_eq!(parsed.objective_value(), Some(412.5));
        assert_eq!(parsed.metrics().wait_time_reduction_mins, 6.0);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let json = r#"{"assignments": {"P-1": "B-1", "P-1": "B-2"}}"#;
        assert!(serde_json::from_str::<SuggestionSet>(json).is_err());

        let dup = SuggestionSet::new(
            vec![
                Suggestion::new(pid("P-1"), "B-1".parse().unwrap()),
                Suggestion::new(pid("P-1"), "B-2".parse().unwrap()),
            ],
            None,
            AllocationMetrics::default(),
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_serializes_back_in_order() {
        let s = set(&[("P-3", "B-1"), ("P-1", "B-2")]);
        let json = serde_json::to_string(&s).unwrap();
        let p3 = json.find("P-3").unwrap();
        let p1 = json.find("P-1").unwrap();
        assert!(p3 < p1);
    }

    #[test]
    fn test_replace_discards_previous() {
        let mut store = SuggestionStore::new();
        store.replace(set(&[("P-1", "B-1"), ("P-2", "B-2")]));
        let generation = store.replace(set(&[("P-3", "B-3")]));

        assert_eq!(generation, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(&pid("P-1")).is_none());
        assert!(store.get(&pid("P-3")).is_some());
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut store = SuggestionStore::new();
        assert!(store.remove(&pid("P-1")).is_none());

        store.replace(set(&[("P-1", "B-1"), ("P-2", "B-2")]));
        assert!(store.remove(&pid("P-9")).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_set_discarded_when_emptied() {
        let mut store = SuggestionStore::new();
        store.replace(set(&[("P-1", "B-1"), ("P-2", "B-2")]));

        store.remove(&pid("P-2"));
        assert_eq!(store.entries(), vec![Suggestion::new(pid("P-1"), "B-1".parse().unwrap())]);

        store.remove(&pid("P-1"));
        assert!(store.is_empty());
        assert!(store.current().is_none());
    }

    #[test]
    fn test_empty_run_installs_nothing() {
        let mut store = SuggestionStore::new();
        store.replace(set(&[("P-1", "B-1")]));
        store.replace(set(&[]));
        assert!(store.is_empty());
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn test_plan_id_tracks_the_live_run() {
        let mut store = SuggestionStore::new();
        assert!(store.plan_id().is_none());

        store.replace(set(&[("P-1", "B-1"), ("P-2", "B-2")]));
        let first = store.plan_id().unwrap();
        store.remove(&pid("P-1"));
        assert_eq!(store.plan_id(), Some(first));

        store.replace(set(&[("P-2", "B-2")]));
        let second = store.plan_id().unwrap();
        assert_ne!(first, second);

        store.clear();
        assert!(store.plan_id().is_none());
    }
}
