use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable lab service (CBC, lipid panel, urinalysis, ...). Read-mostly
/// catalog data; bookings reference services by id and copy the price into
/// the appointment total at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub price: f64,
    pub active: bool,
}
