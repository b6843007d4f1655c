use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(PatientKind {
    Registered => "registered",
    WalkIn => "walk_in",
});

str_enum!(Sex {
    Male => "male",
    Female => "female",
    Other => "other",
});

str_enum!(AccountRole {
    Patient => "patient",
    Staff => "staff",
});

str_enum!(ActorRole {
    Patient => "patient",
    Receptionist => "receptionist",
    MedTech => "med_tech",
    Pathologist => "pathologist",
    Admin => "admin",
});

str_enum!(AppointmentStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    CheckedIn => "checked_in",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
    WalkIn => "walk_in",
});

impl AppointmentStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Structural fields (services, date) may only change before intake.
    pub fn can_be_modified(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// States from which the front desk may check a patient in.
    pub fn can_check_in(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::WalkIn)
    }
}

str_enum!(ResultStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Reviewed => "reviewed",
    Rejected => "rejected",
    Released => "released",
});

impl ResultStatus {
    /// Technicians may enter or correct field values in these states.
    pub fn accepts_entry(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

str_enum!(FieldFlag {
    Normal => "normal",
    Abnormal => "abnormal",
    Unknown => "unknown",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::CheckedIn,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
            AppointmentStatus::WalkIn,
        ] {
            assert_eq!(AppointmentStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = ResultStatus::from_str("archived").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn terminal_appointment_states() {
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(AppointmentStatus::NoShow.is_terminal());
        assert!(!AppointmentStatus::CheckedIn.is_terminal());
        assert!(!AppointmentStatus::WalkIn.is_terminal());
    }

    #[test]
    fn modification_gate_closes_at_check_in() {
        assert!(AppointmentStatus::Pending.can_be_modified());
        assert!(AppointmentStatus::Confirmed.can_be_modified());
        assert!(!AppointmentStatus::CheckedIn.can_be_modified());
        assert!(!AppointmentStatus::WalkIn.can_be_modified());
    }
}
