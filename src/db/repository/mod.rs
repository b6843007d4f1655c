//! Per-entity query modules plus the column plumbing they share.

pub mod appointment;
pub mod audit;
pub mod patient;
pub mod service;
pub mod test_result;

use std::str::FromStr;

use chrono::{Local, NaiveDateTime};

use crate::db::DatabaseError;
use crate::models::enums::{PatientKind, Sex};
use crate::models::patient::{PatientRef, WalkInSnapshot};

pub(crate) const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock timestamp, truncated to the storage format's resolution.
pub(crate) fn now_stamp() -> NaiveDateTime {
    let now = Local::now().naive_local().format(STAMP_FORMAT).to_string();
    parse_stamp(&now)
}

pub(crate) fn stamp_string(stamp: &NaiveDateTime) -> String {
    stamp.format(STAMP_FORMAT).to_string()
}

pub(crate) fn parse_stamp(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, STAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}

pub(crate) fn parse_opt_stamp(s: Option<String>) -> Option<NaiveDateTime> {
    s.map(|s| parse_stamp(&s))
}

/// Flattened subject columns shared by appointments and test_results.
pub(crate) struct SubjectColumns {
    pub kind: &'static str,
    pub account_id: Option<String>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub sex: Option<&'static str>,
    pub contact: Option<String>,
    pub address: Option<String>,
}

pub(crate) fn subject_to_columns(patient: &PatientRef) -> SubjectColumns {
    match patient {
        PatientRef::Registered { account_id } => SubjectColumns {
            kind: PatientKind::Registered.as_str(),
            account_id: Some(account_id.to_string()),
            name: None,
            age: None,
            sex: None,
            contact: None,
            address: None,
        },
        PatientRef::WalkIn(snapshot) => SubjectColumns {
            kind: PatientKind::WalkIn.as_str(),
            account_id: None,
            name: Some(snapshot.display_name.clone()),
            age: snapshot.age,
            sex: snapshot.sex.map(|s| s.as_str()),
            contact: snapshot.contact_number.clone(),
            address: snapshot.address.clone(),
        },
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn subject_from_columns(
    kind: &str,
    account_id: Option<String>,
    name: Option<String>,
    age: Option<u32>,
    sex: Option<String>,
    contact: Option<String>,
    address: Option<String>,
) -> Result<PatientRef, DatabaseError> {
    match PatientKind::from_str(kind)? {
        PatientKind::Registered => {
            let raw = account_id.ok_or_else(|| {
                DatabaseError::ConstraintViolation(
                    "registered subject row is missing patient_account_id".into(),
                )
            })?;
            let account_id = uuid::Uuid::parse_str(&raw)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
            Ok(PatientRef::Registered { account_id })
        }
        PatientKind::WalkIn => Ok(PatientRef::WalkIn(WalkInSnapshot {
            display_name: name.unwrap_or_default(),
            age,
            sex: sex.as_deref().map(Sex::from_str).transpose()?,
            contact_number: contact,
            address,
        })),
    }
}
