//! Constants used throughout the ER core crate.
//!
//! Timing defaults, the snapshot window shape and the status category table live here so the
//! poll loop, the aggregator and the SQL adapter agree on them.

/// Default interval between two poll ticks, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default per-subscriber queue length, in tick batches.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Hour of the previous day at which the snapshot window opens.
pub const WINDOW_START_HOUR: u32 = 21;

/// Time-of-day rendering used when a record has no ER-entry time.
pub const DEFAULT_TIME_OF_DAY: &str = "00:00:00";

/// Category label for patients not yet seen by a doctor.
pub const CATEGORY_WAITING: &str = "waiting";

/// Category label for patients under examination or treatment.
pub const CATEGORY_IN_TREATMENT: &str = "in_treatment";

/// Category label for patients who have left the ER workflow.
pub const CATEGORY_COMPLETED: &str = "completed";

/// Bucket for blank or unrecognised statuses. Computed but never emitted.
pub const CATEGORY_UNKNOWN: &str = "unknown";

/// Raw statuses per emitted category, compared lowercase and trimmed.
pub const STATUS_CATEGORIES: &[(&str, &[&str])] = &[
    (
        CATEGORY_WAITING,
        &["waiting", "registered", "triage", "waiting for doctor"],
    ),
    (
        CATEGORY_IN_TREATMENT,
        &[
            "examining",
            "in treatment",
            "observation",
            "waiting for result",
            "consult",
        ],
    ),
    (
        CATEGORY_COMPLETED,
        &["admitted", "discharged", "transferred", "referred", "deceased"],
    ),
];

/// Table read by the PostgreSQL snapshot source.
pub const PATIENT_LOG_TABLE: &str = "er_patient_logs";
