use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{now_stamp, parse_stamp, stamp_string};
use crate::db::DatabaseError;
use crate::models::enums::{AccountRole, Sex};
use crate::models::patient::PatientAccount;

pub fn insert_account(conn: &Connection, account: &PatientAccount) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patient_accounts (id, email, full_name, role, age, sex, contact_number, address, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            account.id.to_string(),
            account.email,
            account.full_name,
            account.role.as_str(),
            account.age,
            account.sex.map(|s| s.as_str()),
            account.contact_number,
            account.address,
            stamp_string(&account.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_account(conn: &Connection, id: &Uuid) -> Result<Option<PatientAccount>, DatabaseError> {
    query_account(
        conn,
        "SELECT id, email, full_name, role, age, sex, contact_number, address, created_at
         FROM patient_accounts WHERE id = ?1",
        &id.to_string(),
    )
}

pub fn get_account_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<PatientAccount>, DatabaseError> {
    query_account(
        conn,
        "SELECT id, email, full_name, role, age, sex, contact_number, address, created_at
         FROM patient_accounts WHERE email = ?1 COLLATE NOCASE",
        email,
    )
}

fn query_account(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Option<PatientAccount>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;

    let result = stmt.query_row(params![key], |row| {
        Ok(AccountRow {
            id: row.get::<_, String>(0)?,
            email: row.get::<_, String>(1)?,
            full_name: row.get::<_, String>(2)?,
            role: row.get::<_, String>(3)?,
            age: row.get::<_, Option<u32>>(4)?,
            sex: row.get::<_, Option<String>>(5)?,
            contact_number: row.get::<_, Option<String>>(6)?,
            address: row.get::<_, Option<String>>(7)?,
            created_at: row.get::<_, String>(8)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(account_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// Internal row type for PatientAccount mapping
struct AccountRow {
    id: String,
    email: String,
    full_name: String,
    role: String,
    age: Option<u32>,
    sex: Option<String>,
    contact_number: Option<String>,
    address: Option<String>,
    created_at: String,
}

fn account_from_row(row: AccountRow) -> Result<PatientAccount, DatabaseError> {
    Ok(PatientAccount {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        email: row.email,
        full_name: row.full_name,
        role: AccountRole::from_str(&row.role)?,
        age: row.age,
        sex: row.sex.as_deref().map(Sex::from_str).transpose()?,
        contact_number: row.contact_number,
        address: row.address,
        created_at: parse_stamp(&row.created_at),
    })
}

/// Convenience constructor used by tests and seeding.
pub fn new_account(email: &str, full_name: &str, role: AccountRole) -> PatientAccount {
    PatientAccount {
        id: Uuid::new_v4(),
        email: email.into(),
        full_name: full_name.into(),
        role,
        age: None,
        sex: None,
        contact_number: None,
        address: None,
        created_at: now_stamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_get_account() {
        let conn = open_memory_database().unwrap();
        let account = new_account("ana@example.com", "Ana Reyes", AccountRole::Patient);
        insert_account(&conn, &account).unwrap();

        let fetched = get_account(&conn, &account.id).unwrap().unwrap();
        assert_eq!(fetched.email, "ana@example.com");
        assert_eq!(fetched.role, AccountRole::Patient);
    }

    #[test]
    fn email_lookup_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        let account = new_account("Ana@Example.com", "Ana Reyes", AccountRole::Patient);
        insert_account(&conn, &account).unwrap();

        let fetched = get_account_by_email(&conn, "ana@example.com").unwrap();
        assert!(fetched.is_some());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let conn = open_memory_database().unwrap();
        insert_account(&conn, &new_account("a@b.com", "First", AccountRole::Patient)).unwrap();
        let result = insert_account(&conn, &new_account("a@b.com", "Second", AccountRole::Patient));
        assert!(result.is_err());
    }
}
