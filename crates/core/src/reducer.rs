//! Latest-record reduction.
//!
//! Collapses raw log rows to one current record per hospital number.

use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;

use crate::patient::PatientRecord;

/// One current record per hospital number, ordered by hospital number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReducedSnapshot {
    records: BTreeMap<String, PatientRecord>,
}

impl ReducedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hn: &str) -> Option<&PatientRecord> {
        self.records.get(hn)
    }

    pub fn contains(&self, hn: &str) -> bool {
        self.records.contains_key(hn)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PatientRecord> {
        self.records.iter()
    }

    /// The current records in hospital-number order.
    pub fn to_records(&self) -> Vec<PatientRecord> {
        self.records.values().cloned().collect()
    }
}

impl FromIterator<PatientRecord> for ReducedSnapshot {
    fn from_iter<I: IntoIterator<Item = PatientRecord>>(iter: I) -> Self {
        reduce_latest(iter)
    }
}

/// Keep, for every hospital number, the row with the greatest status-update timestamp.
///
/// Ties on the timestamp go to the highest source row id, so the result does not depend on the
/// order the source returned rows in.
pub fn reduce_latest(rows: impl IntoIterator<Item = PatientRecord>) -> ReducedSnapshot {
    let mut records: BTreeMap<String, PatientRecord> = BTreeMap::new();

    for row in rows {
        match records.entry(row.hn.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                if row.recency_key() > slot.get().recency_key() {
                    slot.insert(row);
                }
            }
        }
    }

    ReducedSnapshot { records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::fixtures::{at, record};

    #[test]
    fn test_latest_row_wins() {
        let snapshot = reduce_latest(vec![
            record(1, "P1", "waiting", at(0, 0, 10)),
            record(2, "P1", "examining", at(0, 0, 20)),
        ]);

        assert_eq!(snapshot.len(), 1);
        let current = snapshot.get("P1").unwrap();
        assert_eq!(current.id, 2);
        assert_eq!(current.status_updated_at, Some(at(0, 0, 20)));
    }

    #[test]
    fn test_result_independent_of_row_order() {
        let rows = vec![
            record(1, "P1", "waiting", at(9, 0, 0)),
            record(5, "P1", "discharged", at(11, 0, 0)),
            record(3, "P1", "examining", at(10, 0, 0)),
            record(4, "P2", "waiting", at(9, 30, 0)),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        assert_eq!(reduce_latest(rows), reduce_latest(reversed));
    }

    #[test]
    fn test_timestamp_tie_goes_to_highest_row_id() {
        let snapshot = reduce_latest(vec![
            record(8, "P1", "examining", at(9, 0, 0)),
            record(3, "P1", "waiting", at(9, 0, 0)),
        ]);
        assert_eq!(snapshot.get("P1").unwrap().id, 8);
    }

    #[test]
    fn test_records_ordered_by_hn() {
        let snapshot: ReducedSnapshot = vec![
            record(1, "HN3", "waiting", at(9, 0, 0)),
            record(2, "HN1", "waiting", at(9, 0, 0)),
            record(3, "HN2", "waiting", at(9, 0, 0)),
        ]
        .into_iter()
        .collect();

        let hns: Vec<_> = snapshot.to_records().into_iter().map(|r| r.hn).collect();
        assert_eq!(hns, vec!["HN1", "HN2", "HN3"]);
    }

    #[test]
    fn test_empty_input_gives_empty_snapshot() {
        assert!(reduce_latest(Vec::new()).is_empty());
    }
}
