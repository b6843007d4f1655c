//! Patient identity resolution.
//!
//! Turns an opaque subject reference into a typed [`PatientRef`] at the
//! moment an appointment or test result is created. Resolution runs exactly
//! once; the typed value is persisted and never re-interpreted. The rules
//! are deterministic — when nothing matches and no appointment fallback is
//! available, resolution fails rather than guessing.

use std::sync::OnceLock;

use regex::Regex;
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::db::repository;
use crate::error::WorkflowError;
use crate::models::enums::AccountRole;
use crate::models::patient::PatientRef;

/// Optional context accompanying a subject reference.
#[derive(Debug, Clone, Default)]
pub struct IdentityHints {
    /// Appointment whose captured patient is the walk-in fallback.
    pub appointment_id: Option<Uuid>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

/// Resolve `subject_ref` to a typed patient reference.
///
/// 1. An account-id-shaped reference resolves by id lookup (role `patient`).
/// 2. An email-shaped reference resolves by exact email match (role `patient`).
/// 3. Anything else requires `hints.appointment_id`; the appointment's
///    captured patient becomes the result.
pub fn resolve(
    conn: &Connection,
    subject_ref: &str,
    hints: &IdentityHints,
) -> Result<PatientRef, WorkflowError> {
    let subject_ref = subject_ref.trim();
    if subject_ref.is_empty() {
        return Err(WorkflowError::Validation("subject reference is empty".into()));
    }

    if let Ok(account_id) = Uuid::parse_str(subject_ref) {
        if let Some(account) = repository::patient::get_account(conn, &account_id)? {
            if account.role == AccountRole::Patient {
                debug!("resolved subject by account id {account_id}");
                return Ok(PatientRef::Registered { account_id });
            }
        }
    } else if email_pattern().is_match(subject_ref) {
        if let Some(account) = repository::patient::get_account_by_email(conn, subject_ref)? {
            if account.role == AccountRole::Patient {
                debug!("resolved subject by email match to account {}", account.id);
                return Ok(PatientRef::Registered { account_id: account.id });
            }
        }
    }

    let appointment_id = hints.appointment_id.ok_or_else(|| {
        WorkflowError::IdentityResolution(
            "walk-in subject requires an appointment reference".into(),
        )
    })?;

    let appointment = repository::appointment::get_appointment(conn, &appointment_id)?
        .ok_or_else(|| WorkflowError::not_found("appointment", appointment_id))?;

    // The appointment's patient is already a resolved, typed value: a walk-in
    // snapshot is taken verbatim, and a registered ref is reused rather than
    // degraded back into free text.
    debug!(
        "resolved subject via appointment {} snapshot",
        appointment.code
    );
    Ok(appointment.patient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::patient::{insert_account, new_account};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::Sex;
    use crate::models::patient::WalkInSnapshot;

    fn test_db() -> Connection {
        open_memory_database().expect("in-memory DB")
    }

    fn seed_patient(conn: &Connection, email: &str) -> Uuid {
        let account = new_account(email, "Maria Santos", AccountRole::Patient);
        insert_account(conn, &account).unwrap();
        account.id
    }

    fn seed_staff(conn: &Connection, email: &str) -> Uuid {
        let account = new_account(email, "Desk Staff", AccountRole::Staff);
        insert_account(conn, &account).unwrap();
        account.id
    }

    #[test]
    fn resolves_by_account_id() {
        let conn = test_db();
        let id = seed_patient(&conn, "maria@example.com");

        let resolved = resolve(&conn, &id.to_string(), &IdentityHints::default()).unwrap();
        assert_eq!(resolved, PatientRef::Registered { account_id: id });
    }

    #[test]
    fn resolves_by_email() {
        let conn = test_db();
        let id = seed_patient(&conn, "maria@example.com");

        let resolved = resolve(&conn, "maria@example.com", &IdentityHints::default()).unwrap();
        assert_eq!(resolved, PatientRef::Registered { account_id: id });
    }

    #[test]
    fn staff_account_never_resolves_as_subject() {
        let conn = test_db();
        let id = seed_staff(&conn, "desk@lab.example");

        // Neither the staff id nor the staff email is a valid subject, and
        // with no appointment fallback the resolution must fail.
        let err = resolve(&conn, &id.to_string(), &IdentityHints::default()).unwrap_err();
        assert!(matches!(err, WorkflowError::IdentityResolution(_)));

        let err = resolve(&conn, "desk@lab.example", &IdentityHints::default()).unwrap_err();
        assert!(matches!(err, WorkflowError::IdentityResolution(_)));
    }

    #[test]
    fn unknown_subject_without_appointment_fails() {
        let conn = test_db();
        let err = resolve(&conn, "Juan Dela Cruz", &IdentityHints::default()).unwrap_err();
        assert!(matches!(err, WorkflowError::IdentityResolution(_)));
    }

    #[test]
    fn unknown_email_without_appointment_fails() {
        let conn = test_db();
        let err = resolve(&conn, "nobody@example.com", &IdentityHints::default()).unwrap_err();
        assert!(matches!(err, WorkflowError::IdentityResolution(_)));
    }

    #[test]
    fn missing_appointment_hint_is_not_found() {
        let conn = test_db();
        let hints = IdentityHints {
            appointment_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let err = resolve(&conn, "Juan Dela Cruz", &hints).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[test]
    fn empty_subject_is_validation_error() {
        let conn = test_db();
        let err = resolve(&conn, "   ", &IdentityHints::default()).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn walk_in_resolves_from_appointment_snapshot() {
        use crate::appointments;
        use crate::models::appointment::{BookAppointmentRequest, PatientInput};
        use crate::models::enums::ActorRole;
        use crate::models::Actor;

        let conn = test_db();
        let service = crate::db::repository::service::new_service("CBC", 350.0);
        crate::db::repository::service::insert_service(&conn, &service).unwrap();

        let snapshot = WalkInSnapshot {
            display_name: "Juan Dela Cruz".into(),
            age: Some(38),
            sex: Some(Sex::Male),
            contact_number: Some("0917-555-0101".into()),
            address: None,
        };
        let actor = Actor::new("desk-1", ActorRole::Receptionist);
        let appointment = appointments::create_appointment(
            &conn,
            BookAppointmentRequest {
                patient: PatientInput::WalkIn(snapshot.clone()),
                service_ids: vec![service.id],
                scheduled_date: chrono::Local::now().date_naive(),
                scheduled_time: None,
                notes: None,
                total_override: None,
                walk_in_visit: true,
            },
            &actor,
        )
        .unwrap();

        let hints = IdentityHints {
            appointment_id: Some(appointment.id),
            ..Default::default()
        };
        let resolved = resolve(&conn, "Juan Dela Cruz", &hints).unwrap();
        assert_eq!(resolved, PatientRef::WalkIn(snapshot));
    }
}
