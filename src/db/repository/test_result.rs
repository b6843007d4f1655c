use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, ToSql};
use uuid::Uuid;

use super::{parse_opt_stamp, parse_stamp, stamp_string, subject_from_columns, subject_to_columns};
use crate::db::DatabaseError;
use crate::models::enums::ResultStatus;
use crate::models::filters::TestResultFilter;
use crate::models::test_result::{ReferenceRange, TestResult};

const SELECT_COLUMNS: &str = "id, sample_code, patient_kind, patient_account_id, walk_in_name,
     walk_in_age, walk_in_sex, walk_in_contact, walk_in_address, appointment_id, service_id,
     test_type, results, reference_ranges, status, is_abnormal, is_critical, completed_at,
     reviewed_by, reviewed_at, rejection_reason, rejected_at, rejection_count, released_at,
     notified_patient, deleted, version, created_by, created_at, last_modified_by, updated_at";

pub fn insert_result(conn: &Connection, result: &TestResult) -> Result<(), DatabaseError> {
    let subject = subject_to_columns(&result.patient);
    let results_json = serde_json::to_string(&result.results)
        .map_err(|e| DatabaseError::JsonColumn(e.to_string()))?;
    let ranges_json = serde_json::to_string(&result.reference_ranges)
        .map_err(|e| DatabaseError::JsonColumn(e.to_string()))?;

    conn.execute(
        "INSERT INTO test_results (id, sample_code, patient_kind, patient_account_id,
         walk_in_name, walk_in_age, walk_in_sex, walk_in_contact, walk_in_address,
         appointment_id, service_id, test_type, results, reference_ranges, status,
         is_abnormal, is_critical, rejection_count, notified_patient, deleted, version,
         created_by, created_at, last_modified_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
         ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
        params![
            result.id.to_string(),
            result.sample_code,
            subject.kind,
            subject.account_id,
            subject.name,
            subject.age,
            subject.sex,
            subject.contact,
            subject.address,
            result.appointment_id.map(|id| id.to_string()),
            result.service_id.to_string(),
            result.test_type,
            results_json,
            ranges_json,
            result.status.as_str(),
            result.is_abnormal as i32,
            result.is_critical as i32,
            result.rejection_count,
            result.notified_patient as i32,
            result.deleted as i32,
            result.version,
            result.created_by,
            stamp_string(&result.created_at),
            result.last_modified_by,
            stamp_string(&result.updated_at),
        ],
    )?;
    Ok(())
}

/// Fetch a live (non-deleted) result.
pub fn get_result(conn: &Connection, id: &Uuid) -> Result<Option<TestResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM test_results WHERE id = ?1 AND deleted = 0"
    ))?;
    let result = stmt.query_row(params![id.to_string()], row_to_raw);

    match result {
        Ok(raw) => Ok(Some(result_from_row(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_result_by_sample_code(
    conn: &Connection,
    sample_code: &str,
) -> Result<Option<TestResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM test_results WHERE sample_code = ?1 AND deleted = 0"
    ))?;
    let result = stmt.query_row(params![sample_code], row_to_raw);

    match result {
        Ok(raw) => Ok(Some(result_from_row(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write every mutable column, guarded by the optimistic version the caller
/// read. Returns `false` when no row matched — either the version is stale
/// or the row vanished; the caller distinguishes the two.
///
/// The stored version becomes `expected_version + 1`; the passed entity's
/// `version` field is ignored on write.
pub fn persist_versioned(
    conn: &Connection,
    result: &TestResult,
    expected_version: i64,
) -> Result<bool, DatabaseError> {
    let results_json = serde_json::to_string(&result.results)
        .map_err(|e| DatabaseError::JsonColumn(e.to_string()))?;
    let ranges_json = serde_json::to_string(&result.reference_ranges)
        .map_err(|e| DatabaseError::JsonColumn(e.to_string()))?;

    let updated = conn.execute(
        "UPDATE test_results SET results = ?3, reference_ranges = ?4, status = ?5,
         is_abnormal = ?6, is_critical = ?7, completed_at = ?8, reviewed_by = ?9,
         reviewed_at = ?10, rejection_reason = ?11, rejected_at = ?12, rejection_count = ?13,
         released_at = ?14, notified_patient = ?15, deleted = ?16,
         last_modified_by = ?17, updated_at = ?18, version = ?2 + 1
         WHERE id = ?1 AND version = ?2 AND deleted = 0",
        params![
            result.id.to_string(),
            expected_version,
            results_json,
            ranges_json,
            result.status.as_str(),
            result.is_abnormal as i32,
            result.is_critical as i32,
            result.completed_at.as_ref().map(stamp_string),
            result.reviewed_by,
            result.reviewed_at.as_ref().map(stamp_string),
            result.rejection_reason,
            result.rejected_at.as_ref().map(stamp_string),
            result.rejection_count,
            result.released_at.as_ref().map(stamp_string),
            result.notified_patient as i32,
            result.deleted as i32,
            result.last_modified_by,
            stamp_string(&result.updated_at),
        ],
    )?;
    Ok(updated > 0)
}

/// Next `LAB-YYYYMMDD-NNN` specimen code for the given day.
pub fn next_sample_code(conn: &Connection, date: &NaiveDate) -> Result<String, DatabaseError> {
    let prefix = format!("LAB-{}", date.format("%Y%m%d"));
    let last: Option<String> = conn
        .query_row(
            "SELECT sample_code FROM test_results WHERE sample_code LIKE ?1
             ORDER BY sample_code DESC LIMIT 1",
            params![format!("{prefix}-%")],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;

    let next = last
        .and_then(|code| code.rsplit('-').next().and_then(|n| n.parse::<u32>().ok()))
        .map_or(1, |n| n + 1);
    Ok(format!("{prefix}-{next:03}"))
}

pub fn list_results(
    conn: &Connection,
    filter: &TestResultFilter,
) -> Result<Vec<TestResult>, DatabaseError> {
    let status = filter.status.map(|s| s.as_str().to_string());
    let appointment = filter.appointment_id.map(|id| id.to_string());

    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM test_results WHERE deleted = 0");
    let mut bind: Vec<&dyn ToSql> = Vec::new();
    if let Some(s) = &status {
        sql.push_str(" AND status = ?");
        bind.push(s);
    }
    if let Some(a) = &appointment {
        sql.push_str(" AND appointment_id = ?");
        bind.push(a);
    }
    if filter.abnormal_only {
        sql.push_str(" AND is_abnormal = 1");
    }
    if filter.critical_only {
        sql.push_str(" AND is_critical = 1");
    }
    sql.push_str(" ORDER BY created_at DESC, sample_code DESC");

    collect_results(conn, &sql, &bind)
}

/// Released results visible to a registered patient, newest first. Walk-in
/// results never match: visibility requires a registered subject.
pub fn patient_visible(
    conn: &Connection,
    account_id: &Uuid,
) -> Result<Vec<TestResult>, DatabaseError> {
    let account = account_id.to_string();
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM test_results
         WHERE deleted = 0 AND status = 'released' AND patient_kind = 'registered'
           AND patient_account_id = ?
         ORDER BY released_at DESC, sample_code DESC"
    );
    let bind: Vec<&dyn ToSql> = vec![&account];
    collect_results(conn, &sql, &bind)
}

/// The pathologist worklist: completed results awaiting a verdict, oldest
/// first.
pub fn review_queue(conn: &Connection) -> Result<Vec<TestResult>, DatabaseError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM test_results
         WHERE deleted = 0 AND status = 'completed'
         ORDER BY completed_at ASC, sample_code ASC"
    );
    collect_results(conn, &sql, &[])
}

fn collect_results(
    conn: &Connection,
    sql: &str,
    bind: &[&dyn ToSql],
) -> Result<Vec<TestResult>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(bind, row_to_raw)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(result_from_row(row?)?);
    }
    Ok(results)
}

// Internal row type for TestResult mapping
struct ResultRow {
    id: String,
    sample_code: String,
    patient_kind: String,
    patient_account_id: Option<String>,
    walk_in_name: Option<String>,
    walk_in_age: Option<u32>,
    walk_in_sex: Option<String>,
    walk_in_contact: Option<String>,
    walk_in_address: Option<String>,
    appointment_id: Option<String>,
    service_id: String,
    test_type: String,
    results: String,
    reference_ranges: String,
    status: String,
    is_abnormal: i32,
    is_critical: i32,
    completed_at: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<String>,
    rejection_reason: Option<String>,
    rejected_at: Option<String>,
    rejection_count: u32,
    released_at: Option<String>,
    notified_patient: i32,
    deleted: i32,
    version: i64,
    created_by: String,
    created_at: String,
    last_modified_by: String,
    updated_at: String,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResultRow> {
    Ok(ResultRow {
        id: row.get(0)?,
        sample_code: row.get(1)?,
        patient_kind: row.get(2)?,
        patient_account_id: row.get(3)?,
        walk_in_name: row.get(4)?,
        walk_in_age: row.get(5)?,
        walk_in_sex: row.get(6)?,
        walk_in_contact: row.get(7)?,
        walk_in_address: row.get(8)?,
        appointment_id: row.get(9)?,
        service_id: row.get(10)?,
        test_type: row.get(11)?,
        results: row.get(12)?,
        reference_ranges: row.get(13)?,
        status: row.get(14)?,
        is_abnormal: row.get(15)?,
        is_critical: row.get(16)?,
        completed_at: row.get(17)?,
        reviewed_by: row.get(18)?,
        reviewed_at: row.get(19)?,
        rejection_reason: row.get(20)?,
        rejected_at: row.get(21)?,
        rejection_count: row.get(22)?,
        released_at: row.get(23)?,
        notified_patient: row.get(24)?,
        deleted: row.get(25)?,
        version: row.get(26)?,
        created_by: row.get(27)?,
        created_at: row.get(28)?,
        last_modified_by: row.get(29)?,
        updated_at: row.get(30)?,
    })
}

fn result_from_row(row: ResultRow) -> Result<TestResult, DatabaseError> {
    let results: BTreeMap<String, String> = serde_json::from_str(&row.results)
        .map_err(|e| DatabaseError::JsonColumn(e.to_string()))?;
    let reference_ranges: BTreeMap<String, ReferenceRange> =
        serde_json::from_str(&row.reference_ranges)
            .map_err(|e| DatabaseError::JsonColumn(e.to_string()))?;

    Ok(TestResult {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        sample_code: row.sample_code,
        patient: subject_from_columns(
            &row.patient_kind,
            row.patient_account_id,
            row.walk_in_name,
            row.walk_in_age,
            row.walk_in_sex,
            row.walk_in_contact,
            row.walk_in_address,
        )?,
        appointment_id: row
            .appointment_id
            .map(|s| {
                Uuid::parse_str(&s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
            })
            .transpose()?,
        service_id: Uuid::parse_str(&row.service_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        test_type: row.test_type,
        results,
        reference_ranges,
        status: ResultStatus::from_str(&row.status)?,
        is_abnormal: row.is_abnormal != 0,
        is_critical: row.is_critical != 0,
        completed_at: parse_opt_stamp(row.completed_at),
        reviewed_by: row.reviewed_by,
        reviewed_at: parse_opt_stamp(row.reviewed_at),
        rejection_reason: row.rejection_reason,
        rejected_at: parse_opt_stamp(row.rejected_at),
        rejection_count: row.rejection_count,
        released_at: parse_opt_stamp(row.released_at),
        notified_patient: row.notified_patient != 0,
        deleted: row.deleted != 0,
        version: row.version,
        created_by: row.created_by,
        created_at: parse_stamp(&row.created_at),
        last_modified_by: row.last_modified_by,
        updated_at: parse_stamp(&row.updated_at),
    })
}
