use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AppointmentStatus;
use super::patient::{PatientRef, WalkInSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    /// Externally visible booking code, `APT-YYYYMMDD-NNN`.
    pub code: String,
    pub patient: PatientRef,
    /// Ordered, non-empty, unique service references.
    pub service_ids: Vec<Uuid>,
    pub scheduled_date: NaiveDate,
    /// Optional time-of-day, `HH:MM`.
    pub scheduled_time: Option<String>,
    pub status: AppointmentStatus,
    /// Sum of service prices unless overridden at booking.
    pub total: f64,
    pub notes: Option<String>,
    pub med_tech_id: Option<String>,
    pub pathologist_id: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub last_modified_by: String,
    pub updated_at: NaiveDateTime,
    pub checked_in_by: Option<String>,
    pub checked_in_at: Option<NaiveDateTime>,
    pub checked_out_by: Option<String>,
    pub checked_out_at: Option<NaiveDateTime>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
}

/// How a booking request names its subject.
///
/// A scheduled booking carries an opaque subject reference (account id or
/// email) that the identity resolver turns into a typed `PatientRef`. A
/// same-day walk-in has no account to resolve, so the desk captures the
/// snapshot directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientInput {
    Subject { subject_ref: String },
    WalkIn(WalkInSnapshot),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient: PatientInput,
    pub service_ids: Vec<Uuid>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<String>,
    pub notes: Option<String>,
    /// Front-desk price override; `None` derives the total from the catalog.
    pub total_override: Option<f64>,
    /// Same-day unscheduled visit: starts in the `walk_in` state and is
    /// exempt from the duplicate-booking check.
    pub walk_in_visit: bool,
}

/// Structural edits, permitted only while `status.can_be_modified()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub service_ids: Option<Vec<Uuid>>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub total_override: Option<f64>,
}

/// Staff lifecycle actions dispatched through `transition_appointment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AppointmentAction {
    /// Receptionist accepts a scheduled booking (payment confirmed by the
    /// billing collaborator).
    Confirm,
    CheckIn,
    /// Specimen collection has started.
    Start,
    /// Service finished; doubles as check-out.
    Complete,
    NoShow,
    Cancel { reason: String },
    AssignStaff {
        med_tech_id: Option<String>,
        pathologist_id: Option<String>,
    },
}

impl AppointmentAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::CheckIn => "check_in",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::NoShow => "no_show",
            Self::Cancel { .. } => "cancel",
            Self::AssignStaff { .. } => "assign_staff",
        }
    }
}
