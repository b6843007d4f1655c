//! Test result lifecycle — entry, flagging, review, release.
//!
//! Identity is resolved exactly once, at creation; every later transition is
//! a pure guard over already-typed data. Field saves always re-run the
//! reference range evaluator in full. All mutations are optimistic: the
//! caller supplies the version it read, and a stale version surfaces as
//! `ConcurrentModification` so two reviewers can never silently overwrite
//! each other's verdicts.

use std::collections::BTreeMap;

use chrono::Local;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::db::repository::{self, now_stamp};
use crate::db::DatabaseError;
use crate::error::WorkflowError;
use crate::identity::{self, IdentityHints};
use crate::models::enums::{ActorRole, ResultStatus};
use crate::models::filters::TestResultFilter;
use crate::models::test_result::{
    CreateTestResultRequest, ReferenceRange, ResultAction, TestResult,
};
use crate::models::Actor;
use crate::ranges;

const ENTITY: &str = "test_result";

/// How often a per-day sample code is regenerated when concurrent creations
/// race for the same sequence number.
const CODE_RETRIES: usize = 3;

pub fn create_test_result(
    conn: &Connection,
    request: CreateTestResultRequest,
    actor: &Actor,
) -> Result<TestResult, WorkflowError> {
    if !actor.is_staff() {
        return Err(WorkflowError::Forbidden {
            action: "create",
            role: actor.role.as_str(),
        });
    }
    if request.test_type.trim().is_empty() {
        return Err(WorkflowError::Validation("test type is required".into()));
    }

    let service = repository::service::get_service(conn, &request.service_id)?
        .ok_or_else(|| WorkflowError::not_found("service", request.service_id))?;

    if let Some(appointment_id) = &request.appointment_id {
        repository::appointment::get_appointment(conn, appointment_id)?
            .ok_or_else(|| WorkflowError::not_found("appointment", appointment_id))?;
    }

    let hints = IdentityHints {
        appointment_id: request.appointment_id,
        ..Default::default()
    };
    let patient = identity::resolve(conn, &request.subject_ref, &hints)?;

    let evaluation = ranges::evaluate(&request.test_type, &request.results, &request.reference_ranges);

    let now = now_stamp();
    let mut result = TestResult {
        id: Uuid::new_v4(),
        sample_code: String::new(),
        patient,
        appointment_id: request.appointment_id,
        service_id: service.id,
        test_type: request.test_type,
        results: request.results,
        reference_ranges: request.reference_ranges,
        status: ResultStatus::Pending,
        is_abnormal: evaluation.is_abnormal,
        is_critical: evaluation.is_critical,
        completed_at: None,
        reviewed_by: None,
        reviewed_at: None,
        rejection_reason: None,
        rejected_at: None,
        rejection_count: 0,
        released_at: None,
        notified_patient: false,
        deleted: false,
        version: 0,
        created_by: actor.id.clone(),
        created_at: now,
        last_modified_by: actor.id.clone(),
        updated_at: now,
    };

    match request.sample_code {
        Some(code) => {
            if code.trim().is_empty() {
                return Err(WorkflowError::Validation("sample code is empty".into()));
            }
            result.sample_code = code;
            match insert_mapping_conflicts(conn, &result) {
                Ok(()) => {}
                Err(WorkflowError::Database(ref e))
                    if is_constraint_on(e, "test_results.sample_code") =>
                {
                    return Err(WorkflowError::Conflict(format!(
                        "sample code {} is already in use",
                        result.sample_code
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        None => {
            let today = Local::now().date_naive();
            for attempt in 0.. {
                result.sample_code = repository::test_result::next_sample_code(conn, &today)?;
                match insert_mapping_conflicts(conn, &result) {
                    Ok(()) => break,
                    // Concurrent creation took the same sequence number.
                    Err(WorkflowError::Database(ref e))
                        if is_constraint_on(e, "test_results.sample_code")
                            && attempt < CODE_RETRIES =>
                    {
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    audit::record(conn, actor, "create", ENTITY, &result.sample_code, None);
    info!("created test result {} ({})", result.sample_code, result.test_type);
    Ok(result)
}

fn insert_mapping_conflicts(conn: &Connection, result: &TestResult) -> Result<(), WorkflowError> {
    match repository::test_result::insert_result(conn, result) {
        Ok(()) => Ok(()),
        // UNIQUE violations name the columns, so the specimen index surfaces
        // as appointment_id + service_id.
        Err(e) if is_constraint_on(&e, "test_results.appointment_id") => {
            Err(WorkflowError::Conflict(
                "a result already exists for this appointment and service".into(),
            ))
        }
        Err(e) if is_constraint_on(&e, "test_results.sample_code") => {
            Err(WorkflowError::Database(e))
        }
        Err(e) => Err(e.into()),
    }
}

/// Technician entry: merge field values (and optionally replace the range
/// set), then re-run the evaluator. Only open in `pending`/`in_progress`.
pub fn update_result_fields(
    conn: &Connection,
    id: &Uuid,
    version: i64,
    fields: BTreeMap<String, String>,
    reference_ranges: Option<BTreeMap<String, ReferenceRange>>,
    actor: &Actor,
) -> Result<TestResult, WorkflowError> {
    if !actor.can_enter_results() {
        return Err(WorkflowError::Forbidden {
            action: "enter results",
            role: actor.role.as_str(),
        });
    }

    let mut result = load_at_version(conn, id, version)?;
    if !result.status.accepts_entry() {
        return Err(WorkflowError::InvalidTransition {
            from: result.status.as_str(),
            to: ResultStatus::InProgress.as_str(),
        });
    }

    result.results.extend(fields);
    if let Some(ranges) = reference_ranges {
        result.reference_ranges = ranges;
    }

    let evaluation =
        ranges::evaluate(&result.test_type, &result.results, &result.reference_ranges);
    result.is_abnormal = evaluation.is_abnormal;
    result.is_critical = evaluation.is_critical;

    save(conn, result, version, actor, "enter_fields", None)
}

pub fn transition_test_result(
    conn: &Connection,
    id: &Uuid,
    version: i64,
    action: ResultAction,
    actor: &Actor,
) -> Result<TestResult, WorkflowError> {
    let mut result = load_at_version(conn, id, version)?;
    let from = result.status;
    let now = now_stamp();

    match &action {
        ResultAction::Advance => {
            if !actor.can_enter_results() {
                return Err(WorkflowError::Forbidden {
                    action: "advance",
                    role: actor.role.as_str(),
                });
            }
            result.status = match from {
                ResultStatus::Pending => ResultStatus::InProgress,
                ResultStatus::InProgress => {
                    // Completion re-runs the evaluator and stamps completed_at
                    // exactly once; a later resubmission keeps the original
                    // completion time.
                    let evaluation = ranges::evaluate(
                        &result.test_type,
                        &result.results,
                        &result.reference_ranges,
                    );
                    result.is_abnormal = evaluation.is_abnormal;
                    result.is_critical = evaluation.is_critical;
                    if result.completed_at.is_none() {
                        result.completed_at = Some(now);
                    }
                    ResultStatus::Completed
                }
                ResultStatus::Rejected => ResultStatus::InProgress,
                other => {
                    return Err(WorkflowError::InvalidTransition {
                        from: other.as_str(),
                        to: ResultStatus::InProgress.as_str(),
                    })
                }
            };
        }
        ResultAction::Approve => {
            require_reviewer(actor, "approve")?;
            require_result_transition(from, ResultStatus::Completed, ResultStatus::Reviewed)?;
            result.status = ResultStatus::Reviewed;
            result.reviewed_by = Some(actor.id.clone());
            result.reviewed_at = Some(now);
        }
        ResultAction::Reject { reason } => {
            require_reviewer(actor, "reject")?;
            require_result_transition(from, ResultStatus::Completed, ResultStatus::Rejected)?;
            if reason.trim().is_empty() {
                return Err(WorkflowError::Validation(
                    "rejection requires a reason".into(),
                ));
            }
            result.status = ResultStatus::Rejected;
            result.rejection_reason = Some(reason.clone());
            result.rejected_at = Some(now);
            result.rejection_count += 1;
        }
        ResultAction::Release => {
            require_reviewer(actor, "release")?;
            require_result_transition(from, ResultStatus::Reviewed, ResultStatus::Released)?;
            result.status = ResultStatus::Released;
            result.released_at = Some(now);
            result.notified_patient = true;
        }
    }

    let detail = result.rejection_reason.clone().filter(|_| matches!(action, ResultAction::Reject { .. }));
    let saved = save(conn, result, version, actor, action.name(), detail)?;
    info!(
        "test result {} {} ({} -> {})",
        saved.sample_code,
        action.name(),
        from.as_str(),
        saved.status.as_str()
    );
    Ok(saved)
}

/// Soft delete: the row is flagged, not removed, so the audit history and
/// the specimen trail stay intact.
pub fn delete_test_result(
    conn: &Connection,
    id: &Uuid,
    version: i64,
    actor: &Actor,
) -> Result<(), WorkflowError> {
    if actor.role != ActorRole::Admin {
        return Err(WorkflowError::Forbidden {
            action: "delete",
            role: actor.role.as_str(),
        });
    }

    let mut result = load_at_version(conn, id, version)?;
    result.deleted = true;
    let sample_code = result.sample_code.clone();
    save(conn, result, version, actor, "delete", None)?;
    info!("soft-deleted test result {sample_code}");
    Ok(())
}

pub fn get_test_result(conn: &Connection, id: &Uuid) -> Result<TestResult, WorkflowError> {
    repository::test_result::get_result(conn, id)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, id))
}

pub fn get_by_sample_code(conn: &Connection, code: &str) -> Result<TestResult, WorkflowError> {
    repository::test_result::get_result_by_sample_code(conn, code)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, code))
}

pub fn list_test_results(
    conn: &Connection,
    filter: &TestResultFilter,
) -> Result<Vec<TestResult>, WorkflowError> {
    Ok(repository::test_result::list_results(conn, filter)?)
}

/// The pathologist worklist: completed results awaiting a verdict.
pub fn review_queue(conn: &Connection) -> Result<Vec<TestResult>, WorkflowError> {
    Ok(repository::test_result::review_queue(conn)?)
}

/// Released results for a registered patient's self-service lookup. Walk-in
/// results are never visible here, whatever their status.
pub fn patient_visible_results(
    conn: &Connection,
    account_id: &Uuid,
) -> Result<Vec<TestResult>, WorkflowError> {
    Ok(repository::test_result::patient_visible(conn, account_id)?)
}

fn load_at_version(
    conn: &Connection,
    id: &Uuid,
    version: i64,
) -> Result<TestResult, WorkflowError> {
    let result = repository::test_result::get_result(conn, id)?
        .ok_or_else(|| WorkflowError::not_found(ENTITY, id))?;
    if result.version != version {
        return Err(WorkflowError::ConcurrentModification {
            entity: ENTITY,
            id: *id,
        });
    }
    Ok(result)
}

/// Versioned write-back. The WHERE-clause guard re-checks the version inside
/// the store, so a racing writer that slipped between our read and this
/// write still loses cleanly.
fn save(
    conn: &Connection,
    mut result: TestResult,
    expected_version: i64,
    actor: &Actor,
    action: &str,
    detail: Option<String>,
) -> Result<TestResult, WorkflowError> {
    result.last_modified_by = actor.id.clone();
    result.updated_at = now_stamp();

    let updated = repository::test_result::persist_versioned(conn, &result, expected_version)?;
    if !updated {
        return if repository::test_result::get_result(conn, &result.id)?.is_some() {
            Err(WorkflowError::ConcurrentModification {
                entity: ENTITY,
                id: result.id,
            })
        } else {
            Err(WorkflowError::not_found(ENTITY, result.id))
        };
    }
    result.version = expected_version + 1;

    audit::record(conn, actor, action, ENTITY, &result.sample_code, detail);
    Ok(result)
}

fn require_reviewer(actor: &Actor, action: &'static str) -> Result<(), WorkflowError> {
    if actor.can_review() {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            action,
            role: actor.role.as_str(),
        })
    }
}

fn require_result_transition(
    from: ResultStatus,
    expected: ResultStatus,
    to: ResultStatus,
) -> Result<(), WorkflowError> {
    if from == expected {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            from: from.as_str(),
            to: to.as_str(),
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
