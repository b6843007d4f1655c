use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AccountRole, Sex};

/// Typed reference to the subject of an appointment or test result.
///
/// Resolved exactly once, at creation time, and persisted as-is. No code path
/// re-interprets a stored reference: a registered subject is always an account
/// id, a walk-in subject is always the snapshot captured at the encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatientRef {
    Registered { account_id: Uuid },
    WalkIn(WalkInSnapshot),
}

impl PatientRef {
    /// Account id when the subject is registered.
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            Self::Registered { account_id } => Some(*account_id),
            Self::WalkIn(_) => None,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }
}

/// Point-in-time identity captured at the desk for a patient without an
/// account. Denormalized on purpose: the snapshot must stay meaningful even
/// if the person later registers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkInSnapshot {
    pub display_name: String,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
}

/// A registered account row. Only rows with role `patient` resolve to a
/// `PatientRef::Registered`; staff accounts live in the same table for
/// actor lookups but never resolve as subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAccount {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: AccountRole,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
}
