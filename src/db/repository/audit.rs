use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// One immutable audit row. Timestamps are storage-format strings; the
/// emitter stamps them at write time.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: String,
    pub actor_id: String,
    pub actor_role: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: Option<String>,
}

pub fn insert_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (timestamp, actor_id, actor_role, action, entity, entity_id, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.timestamp,
            entry.actor_id,
            entry.actor_role,
            entry.action,
            entry.entity,
            entry.entity_id,
            entry.detail,
        ],
    )?;
    Ok(())
}

/// Audit trail for one entity, newest first.
pub fn query_audit_by_entity(
    conn: &Connection,
    entity: &str,
    entity_id: &str,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, actor_id, actor_role, action, entity, entity_id, detail
         FROM audit_log WHERE entity = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![entity, entity_id], |row| {
            Ok(AuditEntry {
                timestamp: row.get(0)?,
                actor_id: row.get(1)?,
                actor_role: row.get(2)?,
                action: row.get(3)?,
                entity: row.get(4)?,
                entity_id: row.get(5)?,
                detail: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Prune audit entries older than the given number of days.
pub fn prune_audit_log(conn: &Connection, retention_days: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < datetime('now', ?1)",
        params![format!("-{retention_days} days")],
    )?;
    Ok(deleted)
}
