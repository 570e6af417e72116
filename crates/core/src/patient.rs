//! ER patient log rows as read from the snapshot source.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// One row of the ER patient log.
///
/// The hospital number (`hn`) identifies the patient but is not unique across rows: every
/// status change is written as a new row, so several historical rows can share an `hn`. Rows are
/// never mutated once read; a later row with the same `hn` supersedes an earlier one.
///
/// `status_updated_at` is the site's wall-clock time, as stored by the ER system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Source row id.
    pub id: i32,
    /// Hospital number. A missing value in the source is read as the empty string.
    #[serde(default)]
    pub hn: String,
    #[serde(default)]
    pub fname: String,
    #[serde(default)]
    pub lname: String,
    /// Name prefix (title).
    #[serde(default)]
    pub pname: String,
    #[serde(default)]
    pub enter_er_time: Option<NaiveTime>,
    #[serde(default)]
    pub emergency_type: String,
    #[serde(default)]
    pub current_status: String,
    #[serde(default)]
    pub status_updated_at: Option<NaiveDateTime>,
}

impl PatientRecord {
    /// Ordering key used to pick the current row for an `hn`.
    ///
    /// Rows without a timestamp rank below any timestamped row; equal timestamps fall back to
    /// the higher source row id.
    pub fn recency_key(&self) -> (Option<NaiveDateTime>, i32) {
        (self.status_updated_at, self.id)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{at, record};
    use super::*;

    #[test]
    fn test_recency_key_prefers_timestamp_then_id() {
        let older = record(9, "HN1", "waiting", at(10, 0, 0));
        let newer = record(1, "HN1", "examining", at(10, 0, 1));
        assert!(newer.recency_key() > older.recency_key());

        let tie_low = record(3, "HN1", "waiting", at(10, 0, 0));
        let tie_high = record(4, "HN1", "waiting", at(10, 0, 0));
        assert!(tie_high.recency_key() > tie_low.recency_key());
    }

    #[test]
    fn test_missing_timestamp_ranks_lowest() {
        let mut undated = record(100, "HN1", "waiting", at(0, 0, 0));
        undated.status_updated_at = None;
        let dated = record(1, "HN1", "waiting", at(0, 0, 0));
        assert!(dated.recency_key() > undated.recency_key());
    }

    #[test]
    fn test_deserialize_defaults_missing_strings() {
        let json = r#"{"id": 7, "status_updated_at": "2024-03-15T09:00:00"}"#;
        let rec: PatientRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.hn, "");
        assert_eq!(rec.current_status, "");
        assert_eq!(rec.enter_er_time, None);
        assert_eq!(rec.status_updated_at, Some(at(9, 0, 0)));
    }
}
