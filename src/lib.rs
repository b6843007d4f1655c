//! Labtrail — clinical laboratory workflow core.
//!
//! Coordinates the lifecycle of lab work: an appointment moves through
//! booking, check-in, specimen collection and completion while its test
//! results move through entry, automatic reference-range flagging,
//! pathologist review and patient-visible release. Subject identity is
//! resolved once, at creation, into a typed [`models::PatientRef`].
//!
//! **No transport concerns**: HTTP routing, authentication and billing live
//! in the surrounding system; they talk to this crate through [`LabCore`].

pub mod appointments;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod ranges;
pub mod results;
pub mod workflow;

pub use error::WorkflowError;
pub use workflow::LabCore;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the embedding process. Call once at startup.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
