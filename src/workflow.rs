//! The workflow facade: one handle owning the durable store.
//!
//! The embedding process constructs a [`LabCore`] at startup and threads it
//! through its request handlers; every operation below is request-scoped and
//! stateless between calls. The store handle is an explicit dependency, not
//! a process-wide global, and `close` is the matching shutdown step.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::appointments;
use crate::config;
use crate::db::sqlite::{open_database, open_memory_database};
use crate::db::DatabaseError;
use crate::error::WorkflowError;
use crate::models::appointment::{
    Appointment, AppointmentAction, BookAppointmentRequest, UpdateAppointmentRequest,
};
use crate::models::filters::{AppointmentFilter, TestResultFilter};
use crate::models::test_result::{
    CreateTestResultRequest, ReferenceRange, ResultAction, TestResult,
};
use crate::models::Actor;
use crate::results;

pub struct LabCore {
    conn: Connection,
}

impl LabCore {
    /// Open (or create) the workflow database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = open_database(path)?;
        info!("{} v{} store ready at {}", config::APP_NAME, config::APP_VERSION, path.display());
        Ok(Self { conn })
    }

    /// In-memory store, used by tests and throwaway tooling.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: open_memory_database()?,
        })
    }

    /// Explicit shutdown; flushes and closes the underlying store.
    pub fn close(self) -> Result<(), DatabaseError> {
        self.conn.close().map_err(|(_, e)| DatabaseError::Sqlite(e))
    }

    /// Raw store handle for collaborators (seeding, reporting).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ─── Appointments ─────────────────────────────────────────────────────

    pub fn create_appointment(
        &self,
        request: BookAppointmentRequest,
        actor: &Actor,
    ) -> Result<Appointment, WorkflowError> {
        appointments::create_appointment(&self.conn, request, actor)
    }

    pub fn transition_appointment(
        &self,
        id: &Uuid,
        action: AppointmentAction,
        actor: &Actor,
    ) -> Result<Appointment, WorkflowError> {
        appointments::transition_appointment(&self.conn, id, action, actor)
    }

    pub fn update_appointment(
        &self,
        id: &Uuid,
        request: UpdateAppointmentRequest,
        actor: &Actor,
    ) -> Result<Appointment, WorkflowError> {
        appointments::update_appointment(&self.conn, id, request, actor)
    }

    pub fn delete_appointment(&self, id: &Uuid, actor: &Actor) -> Result<(), WorkflowError> {
        appointments::delete_appointment(&self.conn, id, actor)
    }

    pub fn get_appointment(&self, id: &Uuid) -> Result<Appointment, WorkflowError> {
        appointments::get_appointment(&self.conn, id)
    }

    pub fn get_appointment_by_code(&self, code: &str) -> Result<Appointment, WorkflowError> {
        appointments::get_appointment_by_code(&self.conn, code)
    }

    pub fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, WorkflowError> {
        appointments::list_appointments(&self.conn, filter)
    }

    // ─── Test results ─────────────────────────────────────────────────────

    pub fn create_test_result(
        &self,
        request: CreateTestResultRequest,
        actor: &Actor,
    ) -> Result<TestResult, WorkflowError> {
        results::create_test_result(&self.conn, request, actor)
    }

    pub fn update_test_result_fields(
        &self,
        id: &Uuid,
        version: i64,
        fields: BTreeMap<String, String>,
        reference_ranges: Option<BTreeMap<String, ReferenceRange>>,
        actor: &Actor,
    ) -> Result<TestResult, WorkflowError> {
        results::update_result_fields(&self.conn, id, version, fields, reference_ranges, actor)
    }

    pub fn transition_test_result(
        &self,
        id: &Uuid,
        version: i64,
        action: ResultAction,
        actor: &Actor,
    ) -> Result<TestResult, WorkflowError> {
        results::transition_test_result(&self.conn, id, version, action, actor)
    }

    pub fn delete_test_result(
        &self,
        id: &Uuid,
        version: i64,
        actor: &Actor,
    ) -> Result<(), WorkflowError> {
        results::delete_test_result(&self.conn, id, version, actor)
    }

    pub fn get_test_result(&self, id: &Uuid) -> Result<TestResult, WorkflowError> {
        results::get_test_result(&self.conn, id)
    }

    pub fn list_test_results(
        &self,
        filter: &TestResultFilter,
    ) -> Result<Vec<TestResult>, WorkflowError> {
        results::list_test_results(&self.conn, filter)
    }

    pub fn review_queue(&self) -> Result<Vec<TestResult>, WorkflowError> {
        results::review_queue(&self.conn)
    }

    pub fn patient_visible_results(
        &self,
        account_id: &Uuid,
    ) -> Result<Vec<TestResult>, WorkflowError> {
        results::patient_visible_results(&self.conn, account_id)
    }
}
