use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::service::Service;

pub fn insert_service(conn: &Connection, service: &Service) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO services (id, name, category, price, active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            service.id.to_string(),
            service.name,
            service.category,
            service.price,
            service.active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &Uuid) -> Result<Option<Service>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, price, active FROM services WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, i32>(4)?,
        ))
    });

    match result {
        Ok((id, name, category, price, active)) => Ok(Some(Service {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            name,
            category,
            price,
            active: active != 0,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_active_services(conn: &Connection) -> Result<Vec<Service>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, price, active FROM services WHERE active = 1 ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, i32>(4)?,
        ))
    })?;

    let mut services = Vec::new();
    for row in rows {
        let (id, name, category, price, active) = row?;
        services.push(Service {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            name,
            category,
            price,
            active: active != 0,
        });
    }
    Ok(services)
}

/// Convenience constructor used by tests and seeding.
pub fn new_service(name: &str, price: f64) -> Service {
    Service {
        id: Uuid::new_v4(),
        name: name.into(),
        category: None,
        price,
        active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_list_active() {
        let conn = open_memory_database().unwrap();
        insert_service(&conn, &new_service("CBC", 350.0)).unwrap();
        let mut inactive = new_service("Retired Panel", 100.0);
        inactive.active = false;
        insert_service(&conn, &inactive).unwrap();

        let active = list_active_services(&conn).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "CBC");
    }
}
