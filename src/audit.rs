//! Workflow audit events.
//!
//! Every lifecycle transition emits one immutable event. Emission is
//! fire-and-forget: a failed write is reported through tracing and never
//! rolls back or blocks the transition that produced it.

use rusqlite::Connection;
use tracing::warn;

use crate::db::repository::audit::{insert_audit_entry, AuditEntry};
use crate::db::repository::{now_stamp, stamp_string};
use crate::models::Actor;

pub fn record(
    conn: &Connection,
    actor: &Actor,
    action: &str,
    entity: &'static str,
    entity_id: &str,
    detail: Option<String>,
) {
    let entry = AuditEntry {
        timestamp: stamp_string(&now_stamp()),
        actor_id: actor.id.clone(),
        actor_role: actor.role.as_str().into(),
        action: action.into(),
        entity: entity.into(),
        entity_id: entity_id.into(),
        detail,
    };

    if let Err(e) = insert_audit_entry(conn, &entry) {
        warn!("audit write failed for {entity} {entity_id} ({action}): {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::audit::query_audit_by_entity;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::ActorRole;

    #[test]
    fn record_writes_one_entry() {
        let conn = open_memory_database().unwrap();
        let actor = Actor::new("staff-1", ActorRole::Receptionist);
        record(&conn, &actor, "check_in", "appointment", "apt-1", None);

        let trail = query_audit_by_entity(&conn, "appointment", "apt-1").unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "check_in");
        assert_eq!(trail[0].actor_role, "receptionist");
    }
}
