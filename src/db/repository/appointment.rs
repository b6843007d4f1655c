use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, ToSql};
use uuid::Uuid;

use super::{parse_opt_stamp, parse_stamp, stamp_string, subject_from_columns, subject_to_columns};
use crate::db::DatabaseError;
use crate::models::appointment::Appointment;
use crate::models::enums::AppointmentStatus;
use crate::models::filters::AppointmentFilter;

const SELECT_COLUMNS: &str = "id, code, patient_kind, patient_account_id, walk_in_name,
     walk_in_age, walk_in_sex, walk_in_contact, walk_in_address, scheduled_date,
     scheduled_time, status, total, notes, med_tech_id, pathologist_id, created_by,
     created_at, last_modified_by, updated_at, checked_in_by, checked_in_at,
     checked_out_by, checked_out_at, cancel_reason, cancelled_by, cancelled_at";

/// Insert the appointment and its ordered service list as one transaction.
/// A `booking_guard` value arms the store-level duplicate-booking constraint.
pub fn insert_appointment(
    conn: &Connection,
    appointment: &Appointment,
    booking_guard: Option<&str>,
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let subject = subject_to_columns(&appointment.patient);

    tx.execute(
        "INSERT INTO appointments (id, code, patient_kind, patient_account_id, walk_in_name,
         walk_in_age, walk_in_sex, walk_in_contact, walk_in_address, scheduled_date,
         scheduled_time, status, total, notes, med_tech_id, pathologist_id, booking_guard,
         created_by, created_at, last_modified_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
         ?18, ?19, ?20, ?21)",
        params![
            appointment.id.to_string(),
            appointment.code,
            subject.kind,
            subject.account_id,
            subject.name,
            subject.age,
            subject.sex,
            subject.contact,
            subject.address,
            appointment.scheduled_date.to_string(),
            appointment.scheduled_time,
            appointment.status.as_str(),
            appointment.total,
            appointment.notes,
            appointment.med_tech_id,
            appointment.pathologist_id,
            booking_guard,
            appointment.created_by,
            stamp_string(&appointment.created_at),
            appointment.last_modified_by,
            stamp_string(&appointment.updated_at),
        ],
    )?;

    insert_service_rows(&tx, &appointment.id, &appointment.service_ids)?;
    tx.commit()?;
    Ok(())
}

fn insert_service_rows(
    conn: &Connection,
    appointment_id: &Uuid,
    service_ids: &[Uuid],
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO appointment_services (appointment_id, service_id, position)
         VALUES (?1, ?2, ?3)",
    )?;
    for (position, service_id) in service_ids.iter().enumerate() {
        stmt.execute(params![
            appointment_id.to_string(),
            service_id.to_string(),
            position as i64,
        ])?;
    }
    Ok(())
}

pub fn get_appointment(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Appointment>, DatabaseError> {
    query_one(
        conn,
        &format!("SELECT {SELECT_COLUMNS} FROM appointments WHERE id = ?1"),
        &id.to_string(),
    )
}

pub fn get_appointment_by_code(
    conn: &Connection,
    code: &str,
) -> Result<Option<Appointment>, DatabaseError> {
    query_one(
        conn,
        &format!("SELECT {SELECT_COLUMNS} FROM appointments WHERE code = ?1"),
        code,
    )
}

fn query_one(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Option<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let result = stmt.query_row(params![key], row_to_raw);

    match result {
        Ok(raw) => Ok(Some(appointment_from_row(conn, raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Persist status-adjacent fields. The booking guard is released the moment
/// the appointment reaches a terminal state so the slot frees up for a new
/// booking on the same day.
pub fn persist(conn: &Connection, appointment: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE appointments SET status = ?2, notes = ?3, med_tech_id = ?4, pathologist_id = ?5,
         last_modified_by = ?6, updated_at = ?7, checked_in_by = ?8, checked_in_at = ?9,
         checked_out_by = ?10, checked_out_at = ?11, cancel_reason = ?12, cancelled_by = ?13,
         cancelled_at = ?14,
         booking_guard = CASE WHEN ?15 THEN NULL ELSE booking_guard END
         WHERE id = ?1",
        params![
            appointment.id.to_string(),
            appointment.status.as_str(),
            appointment.notes,
            appointment.med_tech_id,
            appointment.pathologist_id,
            appointment.last_modified_by,
            stamp_string(&appointment.updated_at),
            appointment.checked_in_by,
            appointment.checked_in_at.as_ref().map(stamp_string),
            appointment.checked_out_by,
            appointment.checked_out_at.as_ref().map(stamp_string),
            appointment.cancel_reason,
            appointment.cancelled_by,
            appointment.cancelled_at.as_ref().map(stamp_string),
            appointment.status.is_terminal(),
        ],
    )?;
    Ok(())
}

/// Replace structural fields (services, date, total) and re-arm the booking
/// guard. Only reachable while the modification gate is open.
pub fn update_structure(
    conn: &Connection,
    appointment: &Appointment,
    booking_guard: Option<&str>,
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "UPDATE appointments SET scheduled_date = ?2, scheduled_time = ?3, total = ?4,
         notes = ?5, last_modified_by = ?6, updated_at = ?7, booking_guard = ?8
         WHERE id = ?1",
        params![
            appointment.id.to_string(),
            appointment.scheduled_date.to_string(),
            appointment.scheduled_time,
            appointment.total,
            appointment.notes,
            appointment.last_modified_by,
            stamp_string(&appointment.updated_at),
            booking_guard,
        ],
    )?;

    tx.execute(
        "DELETE FROM appointment_services WHERE appointment_id = ?1",
        params![appointment.id.to_string()],
    )?;
    insert_service_rows(&tx, &appointment.id, &appointment.service_ids)?;

    tx.commit()?;
    Ok(())
}

/// Hard delete. The caller enforces the completed-records guard.
pub fn delete_appointment(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM appointments WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(deleted > 0)
}

/// Code of the live appointment currently holding the given booking guard.
pub fn find_guard_holder(
    conn: &Connection,
    guard: &str,
) -> Result<Option<String>, DatabaseError> {
    let result = conn.query_row(
        "SELECT code FROM appointments WHERE booking_guard = ?1",
        params![guard],
        |row| row.get::<_, String>(0),
    );
    match result {
        Ok(code) => Ok(Some(code)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Next `APT-YYYYMMDD-NNN` code for the given day.
pub fn next_code_for_date(conn: &Connection, date: &NaiveDate) -> Result<String, DatabaseError> {
    let prefix = format!("APT-{}", date.format("%Y%m%d"));
    let last: Option<String> = conn
        .query_row(
            "SELECT code FROM appointments WHERE code LIKE ?1 ORDER BY code DESC LIMIT 1",
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

pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, DatabaseError> {
    let status = filter.status.map(|s| s.as_str().to_string());
    let account = filter.patient_account_id.map(|id| id.to_string());
    let date_from = filter.date_from.map(|d| d.to_string());
    let date_to = filter.date_to.map(|d| d.to_string());

    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM appointments WHERE 1=1");
    let mut bind: Vec<&dyn ToSql> = Vec::new();
    if let Some(s) = &status {
        sql.push_str(" AND status = ?");
        bind.push(s);
    }
    if let Some(a) = &account {
        sql.push_str(" AND patient_account_id = ?");
        bind.push(a);
    }
    if let Some(d) = &date_from {
        sql.push_str(" AND scheduled_date >= ?");
        bind.push(d);
    }
    if let Some(d) = &date_to {
        sql.push_str(" AND scheduled_date <= ?");
        bind.push(d);
    }
    sql.push_str(" ORDER BY scheduled_date, code");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(&bind[..], row_to_raw)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(conn, row?)?);
    }
    Ok(appointments)
}

fn load_service_ids(conn: &Connection, appointment_id: &str) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT service_id FROM appointment_services WHERE appointment_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![appointment_id], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(
            Uuid::parse_str(&row?)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        );
    }
    Ok(ids)
}

// Internal row type for Appointment mapping
struct AppointmentRow {
    id: String,
    code: String,
    patient_kind: String,
    patient_account_id: Option<String>,
    walk_in_name: Option<String>,
    walk_in_age: Option<u32>,
    walk_in_sex: Option<String>,
    walk_in_contact: Option<String>,
    walk_in_address: Option<String>,
    scheduled_date: String,
    scheduled_time: Option<String>,
    status: String,
    total: f64,
    notes: Option<String>,
    med_tech_id: Option<String>,
    pathologist_id: Option<String>,
    created_by: String,
    created_at: String,
    last_modified_by: String,
    updated_at: String,
    checked_in_by: Option<String>,
    checked_in_at: Option<String>,
    checked_out_by: Option<String>,
    checked_out_at: Option<String>,
    cancel_reason: Option<String>,
    cancelled_by: Option<String>,
    cancelled_at: Option<String>,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        code: row.get(1)?,
        patient_kind: row.get(2)?,
        patient_account_id: row.get(3)?,
        walk_in_name: row.get(4)?,
        walk_in_age: row.get(5)?,
        walk_in_sex: row.get(6)?,
        walk_in_contact: row.get(7)?,
        walk_in_address: row.get(8)?,
        scheduled_date: row.get(9)?,
        scheduled_time: row.get(10)?,
        status: row.get(11)?,
        total: row.get(12)?,
        notes: row.get(13)?,
        med_tech_id: row.get(14)?,
        pathologist_id: row.get(15)?,
        created_by: row.get(16)?,
        created_at: row.get(17)?,
        last_modified_by: row.get(18)?,
        updated_at: row.get(19)?,
        checked_in_by: row.get(20)?,
        checked_in_at: row.get(21)?,
        checked_out_by: row.get(22)?,
        checked_out_at: row.get(23)?,
        cancel_reason: row.get(24)?,
        cancelled_by: row.get(25)?,
        cancelled_at: row.get(26)?,
    })
}

fn appointment_from_row(
    conn: &Connection,
    row: AppointmentRow,
) -> Result<Appointment, DatabaseError> {
    let service_ids = load_service_ids(conn, &row.id)?;
    Ok(Appointment {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        code: row.code,
        patient: subject_from_columns(
            &row.patient_kind,
            row.patient_account_id,
            row.walk_in_name,
            row.walk_in_age,
            row.walk_in_sex,
            row.walk_in_contact,
            row.walk_in_address,
        )?,
        service_ids,
        scheduled_date: NaiveDate::parse_from_str(&row.scheduled_date, "%Y-%m-%d")
            .unwrap_or_default(),
        scheduled_time: row.scheduled_time,
        status: AppointmentStatus::from_str(&row.status)?,
        total: row.total,
        notes: row.notes,
        med_tech_id: row.med_tech_id,
        pathologist_id: row.pathologist_id,
        created_by: row.created_by,
        created_at: parse_stamp(&row.created_at),
        last_modified_by: row.last_modified_by,
        updated_at: parse_stamp(&row.updated_at),
        checked_in_by: row.checked_in_by,
        checked_in_at: parse_opt_stamp(row.checked_in_at),
        checked_out_by: row.checked_out_by,
        checked_out_at: parse_opt_stamp(row.checked_out_at),
        cancel_reason: row.cancel_reason,
        cancelled_by: row.cancelled_by,
        cancelled_at: parse_opt_stamp(row.cancelled_at),
    })
}
