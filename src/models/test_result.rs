use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ResultStatus;
use super::patient::PatientRef;

/// Clinically normal interval for one result field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub min: f64,
    pub max: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: Uuid,
    /// Externally visible specimen code, `LAB-YYYYMMDD-NNN`.
    pub sample_code: String,
    /// Resolved independently of the parent appointment; the two may differ
    /// in representation if the appointment was later re-linked.
    pub patient: PatientRef,
    pub appointment_id: Option<Uuid>,
    pub service_id: Uuid,
    pub test_type: String,
    /// Raw field values as entered at the bench. Strings on purpose: panels
    /// mix numeric and categorical results, and the evaluator owns parsing.
    pub results: BTreeMap<String, String>,
    /// Fields without a range entry are never flagged.
    pub reference_ranges: BTreeMap<String, ReferenceRange>,
    pub status: ResultStatus,
    /// Recomputed from `results` + `reference_ranges` on every save,
    /// never hand-set.
    pub is_abnormal: bool,
    pub is_critical: bool,
    pub completed_at: Option<NaiveDateTime>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<NaiveDateTime>,
    pub rejection_count: u32,
    pub released_at: Option<NaiveDateTime>,
    /// Patient-visible "new result" flag, set at release.
    pub notified_patient: bool,
    /// Soft-delete marker; deleted rows keep the audit trail but are
    /// invisible to queries.
    pub deleted: bool,
    /// Optimistic concurrency counter. 0 at insert, incremented by every
    /// subsequent save.
    pub version: i64,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub last_modified_by: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTestResultRequest {
    /// Opaque subject reference handed to the identity resolver: an account
    /// id, an email, or anything else (which then requires `appointment_id`).
    pub subject_ref: String,
    pub appointment_id: Option<Uuid>,
    pub service_id: Uuid,
    pub test_type: String,
    /// Optional externally assigned specimen code; generated when absent.
    pub sample_code: Option<String>,
    pub results: BTreeMap<String, String>,
    pub reference_ranges: BTreeMap<String, ReferenceRange>,
}

/// Reviewer and bench actions dispatched through `transition_test_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResultAction {
    /// Technician entry progression: pending → in_progress → completed,
    /// and rejected → in_progress on resubmission.
    Advance,
    Approve,
    Reject { reason: String },
    Release,
}

impl ResultAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Approve => "approve",
            Self::Reject { .. } => "reject",
            Self::Release => "release",
        }
    }
}
