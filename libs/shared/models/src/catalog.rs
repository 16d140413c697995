use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Area {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
}

/// Join row between a service and a treatment area. `None` overrides fall back
/// to the service defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceArea {
    pub id: Uuid,
    pub service_id: Uuid,
    pub area_id: Uuid,
    pub area_name: String,
    pub duration_minutes: Option<i32>,
    pub price: Option<f64>,
    pub pre_session_instructions: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ServiceArea {
    pub fn effective_duration(&self, service: &Service) -> i32 {
        self.duration_minutes.unwrap_or(service.duration_minutes)
    }

    pub fn effective_price(&self, service: &Service) -> f64 {
        self.price.unwrap_or(service.price)
    }
}

/// One bookable item: a service, optionally narrowed to one area.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ServiceSelection {
    pub service_id: Uuid,
    pub area_id: Option<Uuid>,
}

impl ServiceSelection {
    pub fn service(service_id: Uuid) -> Self {
        Self { service_id, area_id: None }
    }

    pub fn with_area(service_id: Uuid, area_id: Uuid) -> Self {
        Self { service_id, area_id: Some(area_id) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaqEntry {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub position: i32,
}

fn default_true() -> bool {
    true
}
