//! Change classification between two reduced snapshots.

use crate::patient::PatientRecord;
use crate::reducer::ReducedSnapshot;

/// Kind of change carried by a live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// An event delivered to patient-stream subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Full materialised view sent once when a subscriber attaches.
    InitialBatch(Vec<PatientRecord>),
    Inserted(PatientRecord),
    Updated(PatientRecord),
    /// The last record seen for a hospital number that left the window.
    Deleted(PatientRecord),
}

impl ChangeEvent {
    /// The change kind, or `None` for the initial batch.
    pub fn kind(&self) -> Option<ChangeKind> {
        match self {
            Self::InitialBatch(_) => None,
            Self::Inserted(_) => Some(ChangeKind::Inserted),
            Self::Updated(_) => Some(ChangeKind::Updated),
            Self::Deleted(_) => Some(ChangeKind::Deleted),
        }
    }

    /// Hospital number of a single-patient event.
    pub fn hn(&self) -> Option<&str> {
        match self {
            Self::InitialBatch(_) => None,
            Self::Inserted(r) | Self::Updated(r) | Self::Deleted(r) => Some(&r.hn),
        }
    }
}

/// Compare `baseline` with `current` and list the changes.
///
/// Deletions come first, then insertions and updates, each in hospital-number order. A record
/// present in both is updated only when its timestamp moved strictly forward.
pub fn diff_snapshots(baseline: &ReducedSnapshot, current: &ReducedSnapshot) -> Vec<ChangeEvent> {
    let mut events: Vec<ChangeEvent> = baseline
        .iter()
        .filter(|(hn, _)| !current.contains(hn))
        .map(|(_, gone)| ChangeEvent::Deleted(gone.clone()))
        .collect();

    for (hn, record) in current.iter() {
        match baseline.get(hn) {
            None => events.push(ChangeEvent::Inserted(record.clone())),
            Some(previous) if record.status_updated_at > previous.status_updated_at => {
                events.push(ChangeEvent::Updated(record.clone()));
            }
            Some(_) => {}
        }
    }

    events
}
