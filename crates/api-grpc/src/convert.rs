//! Core values to protobuf messages.

use api_shared::pb::{ErPatient, ErPatientUpdate, StatusCountsRes, UpdateType};
use chrono::FixedOffset;
use er_core::render::{format_time_of_day, format_timestamp};
use er_core::{ChangeEvent, PatientRecord, StatusCounts};

pub fn patient_to_pb(record: &PatientRecord, offset: FixedOffset) -> ErPatient {
    ErPatient {
        id: record.id,
        hn: record.hn.clone(),
        fname: record.fname.clone(),
        lname: record.lname.clone(),
        pname: record.pname.clone(),
        enter_er_time: format_time_of_day(record.enter_er_time),
        emergency_type: record.emergency_type.clone(),
        current_status: record.current_status.clone(),
        status_updated_at: format_timestamp(record.status_updated_at, offset),
    }
}

/// One stream message per event. The initial batch carries the full list and `Unknown`.
pub fn event_to_update(event: &ChangeEvent, offset: FixedOffset) -> ErPatientUpdate {
    let single = |record: &PatientRecord, kind: UpdateType| ErPatientUpdate {
        initial_patients: Vec::new(),
        updated_patient: Some(patient_to_pb(record, offset)),
        update_type: kind as i32,
    };

    match event {
        ChangeEvent::InitialBatch(records) => ErPatientUpdate {
            initial_patients: records.iter().map(|r| patient_to_pb(r, offset)).collect(),
            updated_patient: None,
            update_type: UpdateType::Unknown as i32,
        },
        ChangeEvent::Inserted(record) => single(record, UpdateType::Inserted),
        ChangeEvent::Updated(record) => single(record, UpdateType::Updated),
        ChangeEvent::Deleted(record) => single(record, UpdateType::Deleted),
    }
}

pub fn counts_to_pb(counts: &StatusCounts) -> StatusCountsRes {
    StatusCountsRes {
        category_counts: counts
            .categories()
            .iter()
            .map(|(label, n)| (label.clone(), i32::try_from(*n).unwrap_or(i32::MAX)))
            .collect(),
    }
}
