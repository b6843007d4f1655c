//! Appointment lifecycle — booking, conflict detection, staff transitions.
//!
//! Booking resolves the subject once through the identity resolver and
//! persists a typed reference. The duplicate-booking rule is enforced twice:
//! an application-level pre-check for a friendly error, and the
//! `booking_guard` unique index that actually closes the race between the
//! check and the insert under concurrent booking attempts.

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::db::repository::{self, now_stamp};
use crate::db::DatabaseError;
use crate::error::WorkflowError;
use crate::identity::{self, IdentityHints};
use crate::models::appointment::{
    Appointment, AppointmentAction, BookAppointmentRequest, PatientInput, UpdateAppointmentRequest,
};
use crate::models::enums::AppointmentStatus;
use crate::models::filters::AppointmentFilter;
use crate::models::patient::PatientRef;
use crate::models::{Actor, Service};

const ENTITY: &str = "appointment";

/// How often a per-day booking code is regenerated when concurrent bookings
/// race for the same sequence number.
const CODE_RETRIES: usize = 3;

pub fn create_appointment(
    conn: &Connection,
    request: BookAppointmentRequest,
    actor: &Actor,
) -> Result<Appointment, WorkflowError> {
    let services = validate_services(conn, &request.service_ids)?;

    let patient = match &request.patient {
        PatientInput::Subject { subject_ref } => {
            identity::resolve(conn, subject_ref, &IdentityHints::default())?
        }
        PatientInput::WalkIn(snapshot) => {
            if snapshot.display_name.trim().is_empty() {
                return Err(WorkflowError::Validation(
                    "walk-in snapshot requires a display name".into(),
                ));
            }
            PatientRef::WalkIn(snapshot.clone())
        }
    };

    let status = if request.walk_in_visit {
        AppointmentStatus::WalkIn
    } else {
        AppointmentStatus::Pending
    };

    let total = request
        .total_override
        .unwrap_or_else(|| services.iter().map(|s| s.price).sum());

    let guard = if request.walk_in_visit {
        None
    } else {
        booking_guard(&patient, &request.service_ids, &request.scheduled_date)
    };

    if let Some(guard) = &guard {
        if let Some(code) = repository::appointment::find_guard_holder(conn, guard)? {
            return Err(WorkflowError::Conflict(format!(
                "service already booked for this patient on {} under {code}",
                request.scheduled_date
            )));
        }
    }

    let now = now_stamp();
    let mut appointment = Appointment {
        id: Uuid::new_v4(),
        code: String::new(),
        patient,
        service_ids: request.service_ids,
        scheduled_date: request.scheduled_date,
        scheduled_time: request.scheduled_time,
        status,
        total,
        notes: request.notes,
        med_tech_id: None,
        pathologist_id: None,
        created_by: actor.id.clone(),
        created_at: now,
        last_modified_by: actor.id.clone(),
        updated_at: now,
        checked_in_by: None,
        checked_in_at: None,
        checked_out_by: None,
        checked_out_at: None,
        cancel_reason: None,
        cancelled_by: None,
        cancelled_at: None,
    };

    for attempt in 0.. {
        appointment.code =
            repository::appointment::next_code_for_date(conn, &appointment.scheduled_date)?;
        match repository::appointment::insert_appointment(conn, &appointment, guard.as_deref()) {
            Ok(()) => break,
            Err(e) if is_constraint_on(&e, "booking_guard") => {
                return Err(WorkflowError::Conflict(format!(
                    "service already booked for this patient on {}",
                    appointment.scheduled_date
                )));
            }
            // Concurrent booking took the same sequence number.
            Err(e) if is_constraint_on(&e, "appointments.code") && attempt < CODE_RETRIES => {
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    audit::record(conn, actor, "book", ENTITY, &appointment.code, None);
    info!("booked appointment {} ({})", appointment.code, appointment.status.as_str());
    Ok(appointment)
}

pub fn transition_appointment(
    conn: &Connection,
    id: &Uuid,
    action: AppointmentAction,
    actor: &Actor,
) -> Result<Appointment, WorkflowError> {
    if !actor.is_staff() {
        return Err(WorkflowError::Forbidden {
            action: action.name(),
            role: actor.role.as_str(),
        });
    }

    let mut appointment = repository::appointment::get_appointment(conn, id)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, id))?;
    let from = appointment.status;
    let now = now_stamp();

    match &action {
        AppointmentAction::Confirm => {
            require_transition(from, from == AppointmentStatus::Pending, "confirmed")?;
            appointment.status = AppointmentStatus::Confirmed;
        }
        AppointmentAction::CheckIn => {
            require_transition(from, from.can_check_in(), "checked_in")?;
            appointment.status = AppointmentStatus::CheckedIn;
            appointment.checked_in_by = Some(actor.id.clone());
            appointment.checked_in_at = Some(now);
        }
        AppointmentAction::Start => {
            require_transition(from, from == AppointmentStatus::CheckedIn, "in_progress")?;
            appointment.status = AppointmentStatus::InProgress;
        }
        AppointmentAction::Complete => {
            require_transition(from, from == AppointmentStatus::InProgress, "completed")?;
            appointment.status = AppointmentStatus::Completed;
            appointment.checked_out_by = Some(actor.id.clone());
            appointment.checked_out_at = Some(now);
        }
        AppointmentAction::NoShow => {
            require_transition(
                from,
                matches!(from, AppointmentStatus::CheckedIn | AppointmentStatus::InProgress),
                "no_show",
            )?;
            appointment.status = AppointmentStatus::NoShow;
        }
        AppointmentAction::Cancel { reason } => {
            require_transition(from, !from.is_terminal(), "cancelled")?;
            if reason.trim().is_empty() {
                return Err(WorkflowError::Validation(
                    "cancellation requires a reason".into(),
                ));
            }
            appointment.status = AppointmentStatus::Cancelled;
            appointment.cancel_reason = Some(reason.clone());
            appointment.cancelled_by = Some(actor.id.clone());
            appointment.cancelled_at = Some(now);
        }
        AppointmentAction::AssignStaff {
            med_tech_id,
            pathologist_id,
        } => {
            require_transition(from, !from.is_terminal(), "assign_staff")?;
            if let Some(id) = med_tech_id {
                appointment.med_tech_id = Some(id.clone());
            }
            if let Some(id) = pathologist_id {
                appointment.pathologist_id = Some(id.clone());
            }
        }
    }

    appointment.last_modified_by = actor.id.clone();
    appointment.updated_at = now;
    repository::appointment::persist(conn, &appointment)?;

    audit::record(
        conn,
        actor,
        action.name(),
        ENTITY,
        &appointment.code,
        appointment.cancel_reason.clone(),
    );
    info!(
        "appointment {} {} ({} -> {})",
        appointment.code,
        action.name(),
        from.as_str(),
        appointment.status.as_str()
    );
    Ok(appointment)
}

/// Structural edits: services and schedule. Only open before check-in.
pub fn update_appointment(
    conn: &Connection,
    id: &Uuid,
    request: UpdateAppointmentRequest,
    actor: &Actor,
) -> Result<Appointment, WorkflowError> {
    if !actor.is_staff() {
        return Err(WorkflowError::Forbidden {
            action: "update",
            role: actor.role.as_str(),
        });
    }

    let mut appointment = repository::appointment::get_appointment(conn, id)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, id))?;
    if !appointment.status.can_be_modified() {
        return Err(WorkflowError::Validation(format!(
            "appointment {} can no longer be modified in state {}",
            appointment.code,
            appointment.status.as_str()
        )));
    }

    let services_changed = request.service_ids.is_some();
    if let Some(service_ids) = request.service_ids {
        let services = validate_services(conn, &service_ids)?;
        appointment.service_ids = service_ids;
        appointment.total = request
            .total_override
            .unwrap_or_else(|| services.iter().map(|s| s.price).sum());
    } else if let Some(total) = request.total_override {
        appointment.total = total;
    }
    if let Some(date) = request.scheduled_date {
        appointment.scheduled_date = date;
    }
    if let Some(time) = request.scheduled_time {
        appointment.scheduled_time = time;
    }
    if let Some(notes) = request.notes {
        appointment.notes = notes;
    }

    let guard = booking_guard(
        &appointment.patient,
        &appointment.service_ids,
        &appointment.scheduled_date,
    );
    if let Some(guard) = &guard {
        match repository::appointment::find_guard_holder(conn, guard)? {
            Some(code) if code != appointment.code => {
                return Err(WorkflowError::Conflict(format!(
                    "service already booked for this patient on {} under {code}",
                    appointment.scheduled_date
                )));
            }
            _ => {}
        }
    }

    appointment.last_modified_by = actor.id.clone();
    appointment.updated_at = now_stamp();

    match repository::appointment::update_structure(conn, &appointment, guard.as_deref()) {
        Ok(()) => {}
        Err(e) if is_constraint_on(&e, "booking_guard") => {
            return Err(WorkflowError::Conflict(format!(
                "service already booked for this patient on {}",
                appointment.scheduled_date
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let detail = services_changed.then(|| "services changed".to_string());
    audit::record(conn, actor, "update", ENTITY, &appointment.code, detail);
    Ok(appointment)
}

/// Hard delete, barred for completed records: those are cancelled instead so
/// the test-result trail keeps a valid back-reference.
pub fn delete_appointment(
    conn: &Connection,
    id: &Uuid,
    actor: &Actor,
) -> Result<(), WorkflowError> {
    if !actor.is_staff() {
        return Err(WorkflowError::Forbidden {
            action: "delete",
            role: actor.role.as_str(),
        });
    }

    let appointment = repository::appointment::get_appointment(conn, id)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, id))?;
    if appointment.status == AppointmentStatus::Completed {
        return Err(WorkflowError::Validation(format!(
            "completed appointment {} cannot be deleted, cancel it instead",
            appointment.code
        )));
    }

    repository::appointment::delete_appointment(conn, id)?;
    audit::record(conn, actor, "delete", ENTITY, &appointment.code, None);
    info!("deleted appointment {}", appointment.code);
    Ok(())
}

pub fn get_appointment(
    conn: &Connection,
    id: &Uuid,
) -> Result<Appointment, WorkflowError> {
    repository::appointment::get_appointment(conn, id)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, id))
}

pub fn get_appointment_by_code(
    conn: &Connection,
    code: &str,
) -> Result<Appointment, WorkflowError> {
    repository::appointment::get_appointment_by_code(conn, code)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, code))
}

pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, WorkflowError> {
    Ok(repository::appointment::list_appointments(conn, filter)?)
}

fn validate_services(
    conn: &Connection,
    service_ids: &[Uuid],
) -> Result<Vec<Service>, WorkflowError> {
    if service_ids.is_empty() {
        return Err(WorkflowError::Validation(
            "an appointment requires at least one service".into(),
        ));
    }
    for (i, id) in service_ids.iter().enumerate() {
        if service_ids[..i].contains(id) {
            return Err(WorkflowError::Validation(format!(
                "duplicate service {id} in booking"
            )));
        }
    }

    let mut services = Vec::with_capacity(service_ids.len());
    for id in service_ids {
        let service = repository::service::get_service(conn, id)?
            .ok_or_else(|| WorkflowError::not_found("service", id))?;
        if !service.active {
            return Err(WorkflowError::Validation(format!(
                "service {} is not bookable",
                service.name
            )));
        }
        services.push(service);
    }
    Ok(services)
}

/// Guard key for the store-level duplicate-booking constraint. Armed only
/// for single-service bookings of a registered account; multi-service
/// bookings and walk-ins are exempt.
fn booking_guard(
    patient: &PatientRef,
    service_ids: &[Uuid],
    date: &NaiveDate,
) -> Option<String> {
    match (patient.account_id(), service_ids) {
        (Some(account_id), [service_id]) => {
            Some(format!("{account_id}|{service_id}|{date}"))
        }
        _ => None,
    }
}

fn require_transition(
    from: AppointmentStatus,
    allowed: bool,
    to: &'static str,
) -> Result<(), WorkflowError> {
    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            from: from.as_str(),
            to,
        })
    }
}

fn is_constraint_on(error: &DatabaseError, needle: &str) -> bool {
    match error {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, Some(msg))) => {
            err.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains(needle)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::patient::{insert_account, new_account};
    use crate::db::repository::service::{insert_service, new_service};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{AccountRole, ActorRole};
    use crate::models::patient::WalkInSnapshot;

    fn test_db() -> Connection {
        open_memory_database().expect("in-memory DB")
    }

    fn desk() -> Actor {
        Actor::new("desk-1", ActorRole::Receptionist)
    }

    fn seed_patient(conn: &Connection) -> Uuid {
        let account = new_account("ana@example.com", "Ana Reyes", AccountRole::Patient);
        insert_account(conn, &account).unwrap();
        account.id
    }

    fn seed_service(conn: &Connection, name: &str, price: f64) -> Uuid {
        let service = new_service(name, price);
        insert_service(conn, &service).unwrap();
        service.id
    }

    fn book(
        conn: &Connection,
        account: Uuid,
        services: Vec<Uuid>,
        date: &str,
    ) -> Result<Appointment, WorkflowError> {
        create_appointment(
            conn,
            BookAppointmentRequest {
                patient: PatientInput::Subject {
                    subject_ref: account.to_string(),
                },
                service_ids: services,
                scheduled_date: date.parse().unwrap(),
                scheduled_time: None,
                notes: None,
                total_override: None,
                walk_in_visit: false,
            },
            &desk(),
        )
    }

    // ───────────────────────────────────────
    // booking
    // ───────────────────────────────────────

    #[test]
    fn booking_resolves_registered_patient_and_derives_total() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);
        let lipid = seed_service(&conn, "Lipid Panel", 900.0);

        let appointment = book(&conn, account, vec![cbc, lipid], "2025-03-10").unwrap();
        assert_eq!(appointment.patient, PatientRef::Registered { account_id: account });
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.total, 1250.0);
        assert!(appointment.code.starts_with("APT-20250310-"));
    }

    #[test]
    fn booking_codes_sequence_per_day() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);
        let lipid = seed_service(&conn, "Lipid Panel", 900.0);

        let first = book(&conn, account, vec![cbc], "2025-03-10").unwrap();
        let second = book(&conn, account, vec![lipid], "2025-03-10").unwrap();
        let other_day = book(&conn, account, vec![cbc], "2025-03-11").unwrap();
        assert_eq!(first.code, "APT-20250310-001");
        assert_eq!(second.code, "APT-20250310-002");
        assert_eq!(other_day.code, "APT-20250311-001");
    }

    #[test]
    fn duplicate_single_service_booking_conflicts() {
        // Scenario A: same account, same service, same date.
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);

        book(&conn, account, vec![cbc], "2025-03-10").unwrap();
        let err = book(&conn, account, vec![cbc], "2025-03-10").unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[test]
    fn different_services_same_day_both_succeed() {
        // Scenario B.
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);
        let lipid = seed_service(&conn, "Lipid Panel", 900.0);

        book(&conn, account, vec![cbc], "2025-03-10").unwrap();
        assert!(book(&conn, account, vec![lipid], "2025-03-10").is_ok());
    }

    #[test]
    fn multi_service_booking_is_exempt_from_conflict_check() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);
        let lipid = seed_service(&conn, "Lipid Panel", 900.0);

        book(&conn, account, vec![cbc], "2025-03-10").unwrap();
        assert!(book(&conn, account, vec![cbc, lipid], "2025-03-10").is_ok());
    }

    #[test]
    fn cancelling_frees_the_booking_slot() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);

        let first = book(&conn, account, vec![cbc], "2025-03-10").unwrap();
        transition_appointment(
            &conn,
            &first.id,
            AppointmentAction::Cancel {
                reason: "patient request".into(),
            },
            &desk(),
        )
        .unwrap();

        assert!(book(&conn, account, vec![cbc], "2025-03-10").is_ok());
    }

    #[test]
    fn walk_in_booking_starts_in_walk_in_state() {
        let conn = test_db();
        let cbc = seed_service(&conn, "CBC", 350.0);

        let appointment = create_appointment(
            &conn,
            BookAppointmentRequest {
                patient: PatientInput::WalkIn(WalkInSnapshot {
                    display_name: "Juan Dela Cruz".into(),
                    age: Some(38),
                    sex: None,
                    contact_number: None,
                    address: None,
                }),
                service_ids: vec![cbc],
                scheduled_date: "2025-03-10".parse().unwrap(),
                scheduled_time: None,
                notes: None,
                total_override: None,
                walk_in_visit: true,
            },
            &desk(),
        )
        .unwrap();
        assert_eq!(appointment.status, AppointmentStatus::WalkIn);
        assert!(!appointment.patient.is_registered());
    }

    #[test]
    fn booking_unknown_subject_fails_resolution() {
        let conn = test_db();
        let cbc = seed_service(&conn, "CBC", 350.0);

        let err = create_appointment(
            &conn,
            BookAppointmentRequest {
                patient: PatientInput::Subject {
                    subject_ref: "somebody new".into(),
                },
                service_ids: vec![cbc],
                scheduled_date: "2025-03-10".parse().unwrap(),
                scheduled_time: None,
                notes: None,
                total_override: None,
                walk_in_visit: false,
            },
            &desk(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::IdentityResolution(_)));
    }

    #[test]
    fn booking_requires_services() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let err = book(&conn, account, vec![], "2025-03-10").unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn booking_rejects_duplicate_service_entries() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);
        let err = book(&conn, account, vec![cbc, cbc], "2025-03-10").unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn booking_rejects_inactive_service() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let mut retired = new_service("Old Panel", 100.0);
        retired.active = false;
        insert_service(&conn, &retired).unwrap();

        let err = book(&conn, account, vec![retired.id], "2025-03-10").unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    // ───────────────────────────────────────
    // transitions
    // ───────────────────────────────────────

    fn booked(conn: &Connection) -> Appointment {
        let account = seed_patient(conn);
        let cbc = seed_service(conn, "CBC", 350.0);
        book(conn, account, vec![cbc], "2025-03-10").unwrap()
    }

    #[test]
    fn full_desk_flow_reaches_completed() {
        let conn = test_db();
        let appointment = booked(&conn);

        let a = transition_appointment(&conn, &appointment.id, AppointmentAction::CheckIn, &desk())
            .unwrap();
        assert_eq!(a.status, AppointmentStatus::CheckedIn);
        assert!(a.checked_in_at.is_some());

        let a = transition_appointment(&conn, &a.id, AppointmentAction::Start, &desk()).unwrap();
        assert_eq!(a.status, AppointmentStatus::InProgress);

        let a = transition_appointment(&conn, &a.id, AppointmentAction::Complete, &desk()).unwrap();
        assert_eq!(a.status, AppointmentStatus::Completed);
        assert!(a.checked_out_at.is_some());
    }

    #[test]
    fn confirmed_cannot_jump_to_completed() {
        let conn = test_db();
        let appointment = booked(&conn);
        transition_appointment(&conn, &appointment.id, AppointmentAction::Confirm, &desk())
            .unwrap();

        let err = transition_appointment(&conn, &appointment.id, AppointmentAction::Complete, &desk())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        let conn = test_db();
        let appointment = booked(&conn);
        transition_appointment(
            &conn,
            &appointment.id,
            AppointmentAction::Cancel {
                reason: "duplicate entry".into(),
            },
            &desk(),
        )
        .unwrap();

        for action in [
            AppointmentAction::Confirm,
            AppointmentAction::CheckIn,
            AppointmentAction::Start,
            AppointmentAction::Complete,
            AppointmentAction::NoShow,
            AppointmentAction::Cancel {
                reason: "again".into(),
            },
        ] {
            let err = transition_appointment(&conn, &appointment.id, action, &desk()).unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn no_show_requires_check_in_first() {
        let conn = test_db();
        let appointment = booked(&conn);

        let err =
            transition_appointment(&conn, &appointment.id, AppointmentAction::NoShow, &desk())
                .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

        transition_appointment(&conn, &appointment.id, AppointmentAction::CheckIn, &desk())
            .unwrap();
        let a = transition_appointment(&conn, &appointment.id, AppointmentAction::NoShow, &desk())
            .unwrap();
        assert_eq!(a.status, AppointmentStatus::NoShow);
    }

    #[test]
    fn cancel_requires_reason() {
        let conn = test_db();
        let appointment = booked(&conn);
        let err = transition_appointment(
            &conn,
            &appointment.id,
            AppointmentAction::Cancel { reason: "  ".into() },
            &desk(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn patient_actor_cannot_drive_transitions() {
        let conn = test_db();
        let appointment = booked(&conn);
        let patient = Actor::new("p-1", ActorRole::Patient);

        let err = transition_appointment(&conn, &appointment.id, AppointmentAction::CheckIn, &patient)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden { .. }));
    }

    #[test]
    fn assign_staff_allowed_until_terminal() {
        let conn = test_db();
        let appointment = booked(&conn);

        let a = transition_appointment(
            &conn,
            &appointment.id,
            AppointmentAction::AssignStaff {
                med_tech_id: Some("mt-7".into()),
                pathologist_id: None,
            },
            &desk(),
        )
        .unwrap();
        assert_eq!(a.med_tech_id.as_deref(), Some("mt-7"));
    }

    // ───────────────────────────────────────
    // modification and deletion guards
    // ───────────────────────────────────────

    #[test]
    fn structural_edit_allowed_while_pending() {
        let conn = test_db();
        let appointment = booked(&conn);
        let lipid = seed_service(&conn, "Lipid Panel", 900.0);

        let updated = update_appointment(
            &conn,
            &appointment.id,
            UpdateAppointmentRequest {
                service_ids: Some(vec![lipid]),
                ..Default::default()
            },
            &desk(),
        )
        .unwrap();
        assert_eq!(updated.service_ids, vec![lipid]);
        assert_eq!(updated.total, 900.0);
    }

    #[test]
    fn structural_edit_frozen_after_check_in() {
        let conn = test_db();
        let appointment = booked(&conn);
        transition_appointment(&conn, &appointment.id, AppointmentAction::CheckIn, &desk())
            .unwrap();

        let err = update_appointment(
            &conn,
            &appointment.id,
            UpdateAppointmentRequest {
                scheduled_date: Some("2025-03-12".parse().unwrap()),
                ..Default::default()
            },
            &desk(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn rescheduling_into_an_occupied_slot_conflicts() {
        let conn = test_db();
        let account = seed_patient(&conn);
        let cbc = seed_service(&conn, "CBC", 350.0);

        book(&conn, account, vec![cbc], "2025-03-10").unwrap();
        let second = book(&conn, account, vec![cbc], "2025-03-11").unwrap();

        let err = update_appointment(
            &conn,
            &second.id,
            UpdateAppointmentRequest {
                scheduled_date: Some("2025-03-10".parse().unwrap()),
                ..Default::default()
            },
            &desk(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[test]
    fn completed_appointment_cannot_be_deleted() {
        let conn = test_db();
        let appointment = booked(&conn);
        for action in [
            AppointmentAction::CheckIn,
            AppointmentAction::Start,
            AppointmentAction::Complete,
        ] {
            transition_appointment(&conn, &appointment.id, action, &desk()).unwrap();
        }

        let err = delete_appointment(&conn, &appointment.id, &desk()).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn pending_appointment_can_be_deleted() {
        let conn = test_db();
        let appointment = booked(&conn);
        delete_appointment(&conn, &appointment.id, &desk()).unwrap();

        let err = get_appointment(&conn, &appointment.id).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }
}
