use serde::{Deserialize, Serialize};

use super::enums::ActorRole;

/// The authenticated caller, supplied by the authentication collaborator on
/// every operation. The core trusts the role; it never authenticates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: id.into(), role }
    }

    /// Anyone working the lab floor — everything except a patient session.
    pub fn is_staff(&self) -> bool {
        !matches!(self.role, ActorRole::Patient)
    }

    /// Verdicts (approve, reject, release) are restricted to pathologists
    /// and admins.
    pub fn can_review(&self) -> bool {
        matches!(self.role, ActorRole::Pathologist | ActorRole::Admin)
    }

    /// Result entry is restricted to bench roles.
    pub fn can_enter_results(&self) -> bool {
        matches!(
            self.role,
            ActorRole::MedTech | ActorRole::Pathologist | ActorRole::Admin
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_is_not_staff() {
        assert!(!Actor::new("p-1", ActorRole::Patient).is_staff());
        assert!(Actor::new("r-1", ActorRole::Receptionist).is_staff());
    }

    #[test]
    fn review_restricted_to_pathologist_and_admin() {
        assert!(Actor::new("pa-1", ActorRole::Pathologist).can_review());
        assert!(Actor::new("ad-1", ActorRole::Admin).can_review());
        assert!(!Actor::new("mt-1", ActorRole::MedTech).can_review());
        assert!(!Actor::new("r-1", ActorRole::Receptionist).can_review());
    }

    #[test]
    fn entry_allows_bench_roles_only() {
        assert!(Actor::new("mt-1", ActorRole::MedTech).can_enter_results());
        assert!(!Actor::new("r-1", ActorRole::Receptionist).can_enter_results());
    }
}
