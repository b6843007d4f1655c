use chrono::NaiveDate;
use uuid::Uuid;

use super::enums::{AppointmentStatus, ResultStatus};

#[derive(Debug, Default)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub patient_account_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Default)]
pub struct TestResultFilter {
    pub status: Option<ResultStatus>,
    pub appointment_id: Option<Uuid>,
    pub abnormal_only: bool,
    pub critical_only: bool,
}
