pub mod actor;
pub mod appointment;
pub mod enums;
pub mod filters;
pub mod patient;
pub mod service;
pub mod test_result;

pub use actor::Actor;
pub use appointment::{
    Appointment, AppointmentAction, BookAppointmentRequest, PatientInput, UpdateAppointmentRequest,
};
pub use enums::*;
pub use filters::{AppointmentFilter, TestResultFilter};
pub use patient::{PatientAccount, PatientRef, WalkInSnapshot};
pub use service::Service;
pub use test_result::{
    CreateTestResultRequest, ReferenceRange, ResultAction, TestResult,
};
